//! # hpcwatch-adapters
//!
//! Source adapters for the two external systems hpcwatch polls.
//!
//! ## Supported Sources
//!
//! - **Metrics backend** (`metrics` feature) - Prometheus or VictoriaMetrics
//!   instant and range queries over the HTTP API
//! - **Warehouse** (`warehouse` feature) - XDMoD job accounting reports over MySQL
//!
//! Every failure, whether a refused connection, a timeout, a non-success
//! response or an undecodable body, is returned as a [`FetchError`] tagged
//! with a [`FetchCause`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpcwatch_adapters::metrics::MetricsAdapter;
//! use hpcwatch_adapters::MetricsSource;
//! use hpcwatch_types::TimeRange;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = MetricsAdapter::builder()
//!         .endpoint("http://localhost:9090")
//!         .build()?;
//!
//!     let window = TimeRange::Day.spec().window_at(chrono::Utc::now());
//!     let rows = adapter.range("sum(pbs_node_gpus_used)", &window).await?;
//!
//!     println!("Fetched {} series", rows.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod source;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "warehouse")]
pub mod warehouse;

pub use error::{FetchCause, FetchError};
pub use source::{MetricsSource, WarehouseSource};

// Re-export types for convenience
pub use hpcwatch_types::{RangeWindow, RowSet, Series};
