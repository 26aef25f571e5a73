//! Route engine types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::ExchangeError;

macro_rules! asset_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $code)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

asset_enum! {
    /// Supported crypto assets, including network-specific variants.
    CryptoAsset {
        Btc => "BTC",
        Eth => "ETH",
        EthArbitrum => "ETH_ARBITRUM",
        EthBase => "ETH_BASE",
        EthPolygon => "ETH_POLYGON",
        Usdc => "USDC",
        UsdcSol => "USDC_SOL",
        UsdcPolygon => "USDC_POLYGON",
        UsdcArbitrum => "USDC_ARBITRUM",
        Usdt => "USDT",
        UsdtTrx => "USDT_TRX",
        UsdtSol => "USDT_SOL",
        UsdtBsc => "USDT_BSC",
        Sol => "SOL",
        Ada => "ADA",
        Xrp => "XRP",
        Doge => "DOGE",
        Shib => "SHIB",
        Dai => "DAI",
        BnbBsc => "BNB_BSC",
        Ton => "TON",
    }
}

asset_enum! {
    /// Supported fiat currencies.
    FiatAsset {
        Aud => "AUD",
        Bgn => "BGN",
        Brl => "BRL",
        Cad => "CAD",
        Chf => "CHF",
        Cop => "COP",
        Czk => "CZK",
        Dkk => "DKK",
        Dop => "DOP",
        Egp => "EGP",
        Eur => "EUR",
        Gbp => "GBP",
        Hkd => "HKD",
        Idr => "IDR",
        Ils => "ILS",
        Jod => "JOD",
        Kes => "KES",
        Kwd => "KWD",
        Lkr => "LKR",
        Mxn => "MXN",
        Ngn => "NGN",
        Nok => "NOK",
        Nzd => "NZD",
        Omr => "OMR",
        Pen => "PEN",
        Pln => "PLN",
        Ron => "RON",
        Sek => "SEK",
        Thb => "THB",
        Try => "TRY",
        Twd => "TWD",
        Usd => "USD",
        Vnd => "VND",
        Zar => "ZAR",
    }
}

/// Supported order kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Receive crypto, pay fiat.
    Buy,
    /// Receive fiat, pay crypto.
    Sell,
    /// Receive crypto, pay crypto.
    Swap,
}

impl OrderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Swap => "swap",
        }
    }
}

impl FromStr for OrderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            "swap" => Ok(Self::Swap),
            _ => Err(()),
        }
    }
}

/// A validated order. The asset pair is typed per kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderRequest {
    Buy {
        receive: CryptoAsset,
        pay: FiatAsset,
        receive_volume: f64,
    },
    Sell {
        receive: FiatAsset,
        pay: CryptoAsset,
        receive_volume: f64,
    },
    Swap {
        receive: CryptoAsset,
        pay: CryptoAsset,
        pay_volume: f64,
    },
}

impl OrderRequest {
    pub fn kind(&self) -> OrderKind {
        match self {
            Self::Buy { .. } => OrderKind::Buy,
            Self::Sell { .. } => OrderKind::Sell,
            Self::Swap { .. } => OrderKind::Swap,
        }
    }

    /// `(receive, pay)` asset codes.
    pub fn assets(&self) -> (&'static str, &'static str) {
        match self {
            Self::Buy { receive, pay, .. } => (receive.as_str(), pay.as_str()),
            Self::Sell { receive, pay, .. } => (receive.as_str(), pay.as_str()),
            Self::Swap { receive, pay, .. } => (receive.as_str(), pay.as_str()),
        }
    }

    /// Volume the fill must reach: receive volume for buy/sell, pay volume for swap.
    pub fn target_volume(&self) -> f64 {
        match self {
            Self::Buy { receive_volume, .. } | Self::Sell { receive_volume, .. } => {
                *receive_volume
            }
            Self::Swap { pay_volume, .. } => *pay_volume,
        }
    }
}

/// Which side of the book an order consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSide {
    Bid,
    Ask,
}

/// One price level offered by one exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub side: QuoteSide,
    pub price: f64,
    pub volume: f64,
    pub exchange: String,
}

/// A partial fill against one quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub exchange: String,
    pub volume: f64,
    pub price: f64,
    pub cost: f64,
}

/// Filled buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideRouteResult {
    pub trades: Vec<Trade>,
    pub total_receive_volume: f64,
    pub total_pay_cost: f64,
    pub average_price: f64,
}

/// Filled swap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRouteResult {
    pub trades: Vec<Trade>,
    pub total_pay_volume: f64,
    pub total_receive_volume: f64,
    pub average_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RouteResult {
    Buy(SideRouteResult),
    Sell(SideRouteResult),
    Swap(SwapRouteResult),
}

impl RouteResult {
    pub fn trades(&self) -> &[Trade] {
        match self {
            Self::Buy(r) | Self::Sell(r) => &r.trades,
            Self::Swap(r) => &r.trades,
        }
    }

    pub fn average_price(&self) -> f64 {
        match self {
            Self::Buy(r) | Self::Sell(r) => r.average_price,
            Self::Swap(r) => r.average_price,
        }
    }
}

/// Errors from route computation.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("insufficient liquidity to fulfill order")]
    InsufficientLiquidity,

    #[error("exchange {exchange} failed: {source}")]
    Exchange {
        exchange: String,
        #[source]
        source: ExchangeError,
    },
}
