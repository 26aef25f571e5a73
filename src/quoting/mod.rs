//! Order routing over aggregated exchange quotes.

pub mod engine;
pub mod order;
pub mod types;

pub use engine::RouteEngine;
pub use order::{FieldError, RouteQuery};
pub use types::{
    CryptoAsset, FiatAsset, OrderKind, OrderRequest, Quote, RouteError, RouteResult, Trade,
};
