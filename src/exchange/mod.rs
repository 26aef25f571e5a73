//! Exchange clients.
//!
//! # Data Flow
//! ```text
//! route engine
//!     → ExchangeRegistry (every registered client, concurrently)
//!     → ExchangeClient::order_book(receive, pay)
//!     → binance.rs (symbol normalisation, TTL cache, request pipeline)
//!     → OrderBook (numeric levels)
//! ```

pub mod binance;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use binance::{normalize_symbol, BinanceClient};
pub use types::{DepthSnapshot, ExchangeError, OrderBook, PriceLevel};

/// A venue that can quote an order book for an asset pair.
pub trait ExchangeClient: Send + Sync {
    /// Stable identifier used in trades, e.g. `binance`.
    fn name(&self) -> &str;

    /// Order book for buying `receive` with `pay`.
    fn order_book<'a>(
        &'a self,
        receive: &'a str,
        pay: &'a str,
    ) -> BoxFuture<'a, Result<OrderBook, ExchangeError>>;
}

/// Registered exchange clients, keyed by name.
#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    clients: BTreeMap<String, Arc<dyn ExchangeClient>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client`, replacing any client with the same name.
    pub fn register(&mut self, client: Arc<dyn ExchangeClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn with(mut self, client: Arc<dyn ExchangeClient>) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExchangeClient>> {
        self.clients.get(name).cloned()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<dyn ExchangeClient>> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.clients.keys()).finish()
    }
}
