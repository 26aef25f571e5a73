//! Best-execution order router over exchange order books.

pub mod cache;
pub mod config;
pub mod exchange;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod quoting;
pub mod resilience;

pub use config::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
