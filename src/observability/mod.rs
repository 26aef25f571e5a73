//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages, cache and route handlers produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are no-ops until an exporter is installed
//! - Request IDs are attached to request spans by the HTTP layer

pub mod logging;
pub mod metrics;
