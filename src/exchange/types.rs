//! Exchange data types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::FetchError;

/// One price level: `volume` units available at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
}

/// Decoded order book, both sides in exchange order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Binance `/api/v3/depth` payload. Prices and volumes arrive as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

impl TryFrom<DepthSnapshot> for OrderBook {
    type Error = ExchangeError;

    fn try_from(snapshot: DepthSnapshot) -> Result<Self, Self::Error> {
        Ok(Self {
            bids: parse_levels(&snapshot.bids)?,
            asks: parse_levels(&snapshot.asks)?,
        })
    }
}

fn parse_levels(levels: &[(String, String)]) -> Result<Vec<PriceLevel>, ExchangeError> {
    levels
        .iter()
        .map(|(price, volume)| {
            let parse = |raw: &str| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ExchangeError::InvalidLevel(format!("[{price}, {volume}]")))
            };
            Ok(PriceLevel {
                price: parse(price)?,
                volume: parse(volume)?,
            })
        })
        .collect()
}

/// Errors from an exchange client.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to decode order book: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid price level {0}")]
    InvalidLevel(String),

    #[error("invalid exchange URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ExchangeError {
    /// The pipeline failure underneath, if any.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Fetch(e) => Some(e),
            _ => None,
        }
    }
}
