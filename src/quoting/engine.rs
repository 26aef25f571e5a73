//! Best-execution routing across exchanges.

use std::cmp::Ordering;

use futures_util::future::try_join_all;

use crate::exchange::{ExchangeRegistry, OrderBook};
use crate::quoting::types::{
    OrderKind, OrderRequest, Quote, QuoteSide, RouteError, RouteResult, SideRouteResult,
    SwapRouteResult, Trade,
};

/// Computes fills for orders against every registered exchange.
#[derive(Debug, Clone)]
pub struct RouteEngine {
    registry: ExchangeRegistry,
}

impl RouteEngine {
    pub fn new(registry: ExchangeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    /// Quotes on the side `order` consumes, from every exchange concurrently.
    pub async fn aggregate_quotes(&self, order: &OrderRequest) -> Result<Vec<Quote>, RouteError> {
        let (receive, pay) = order.assets();
        let side = side_for(order.kind());

        let books = try_join_all(self.registry.clients().map(|client| async move {
            client
                .order_book(receive, pay)
                .await
                .map(|book| (client.name().to_string(), book))
                .map_err(|source| RouteError::Exchange {
                    exchange: client.name().to_string(),
                    source,
                })
        }))
        .await?;

        Ok(books
            .into_iter()
            .flat_map(|(exchange, book)| quotes_from_book(&exchange, book, side))
            .collect())
    }

    /// Fill `order` at the best available prices.
    pub async fn compute_route(&self, order: &OrderRequest) -> Result<RouteResult, RouteError> {
        let target = order.target_volume();
        if !(target.is_finite() && target > 0.0) {
            return Err(RouteError::InvalidOrder(format!(
                "volume must be a positive number, got {target}"
            )));
        }

        let quotes = self.aggregate_quotes(order).await?;
        let result = route_from_quotes(order, quotes)?;

        tracing::debug!(
            kind = order.kind().as_str(),
            trades = result.trades().len(),
            average_price = result.average_price(),
            "Route computed"
        );
        Ok(result)
    }
}

fn side_for(kind: OrderKind) -> QuoteSide {
    match kind {
        OrderKind::Sell => QuoteSide::Bid,
        OrderKind::Buy | OrderKind::Swap => QuoteSide::Ask,
    }
}

fn quotes_from_book(exchange: &str, book: OrderBook, side: QuoteSide) -> Vec<Quote> {
    let levels = match side {
        QuoteSide::Bid => book.bids,
        QuoteSide::Ask => book.asks,
    };
    levels
        .into_iter()
        .map(|level| Quote {
            side,
            price: level.price,
            volume: level.volume,
            exchange: exchange.to_string(),
        })
        .collect()
}

/// Fill `order` from already-aggregated quotes.
pub fn route_from_quotes(order: &OrderRequest, quotes: Vec<Quote>) -> Result<RouteResult, RouteError> {
    let target = order.target_volume();

    match order.kind() {
        OrderKind::Buy | OrderKind::Sell => {
            let (trades, remaining) = if order.kind() == OrderKind::Buy {
                fill_trades(quotes, target, |a, b| a.price.total_cmp(&b.price))
            } else {
                fill_trades(quotes, target, |a, b| b.price.total_cmp(&a.price))
            };
            if remaining > 0.0 {
                return Err(RouteError::InsufficientLiquidity);
            }
            let totals = compute_totals(&trades, true);
            let result = SideRouteResult {
                trades,
                total_receive_volume: totals.receive,
                total_pay_cost: totals.pay,
                average_price: totals.average_price,
            };
            Ok(if order.kind() == OrderKind::Buy {
                RouteResult::Buy(result)
            } else {
                RouteResult::Sell(result)
            })
        }
        OrderKind::Swap => {
            let (trades, remaining) =
                fill_trades(quotes, target, |a, b| a.price.total_cmp(&b.price));
            if remaining > 0.0 {
                return Err(RouteError::InsufficientLiquidity);
            }
            let totals = compute_totals(&trades, false);
            Ok(RouteResult::Swap(SwapRouteResult {
                trades,
                total_pay_volume: totals.pay,
                total_receive_volume: totals.receive,
                average_price: totals.average_price,
            }))
        }
    }
}

/// Greedily consume `quotes` in `order` until `target` volume is taken.
///
/// Returns the trades and the volume left unfilled.
pub fn fill_trades<F>(mut quotes: Vec<Quote>, target: f64, order: F) -> (Vec<Trade>, f64)
where
    F: FnMut(&Quote, &Quote) -> Ordering,
{
    quotes.sort_by(order);

    let mut trades = Vec::new();
    let mut remaining = target;
    for quote in quotes {
        if remaining <= 0.0 {
            break;
        }
        let volume = remaining.min(quote.volume);
        trades.push(Trade {
            exchange: quote.exchange,
            volume,
            price: quote.price,
            cost: volume * quote.price,
        });
        remaining -= volume;
    }
    (trades, remaining)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub receive: f64,
    pub pay: f64,
    pub average_price: f64,
}

/// Sum a fill. With `receive_is_volume` the order receives the traded
/// asset and pays its cost; otherwise the reverse.
pub fn compute_totals(trades: &[Trade], receive_is_volume: bool) -> Totals {
    let volume: f64 = trades.iter().map(|t| t.volume).sum();
    let cost: f64 = trades.iter().map(|t| t.cost).sum();
    let (receive, pay) = if receive_is_volume {
        (volume, cost)
    } else {
        (cost, volume)
    };
    let average_price = if receive > 0.0 { pay / receive } else { 0.0 };

    Totals {
        receive,
        pay,
        average_price,
    }
}
