//! # hpcwatch-types
//!
//! Core types shared by every hpcwatch crate. This crate defines the data model
//! that flows from the source adapters, through the transformer and history
//! merger, into the snapshot store.
//!
//! ## Overview
//!
//! - [`HealthStatus`]: the hardware health enum with its fixed severity order
//! - [`Sample`]: one observation for one entity at one refresh cycle
//! - [`EntityUniverse`]: the fixed, ordered set of monitored nodes
//! - [`Series`]: the canonical row set every metrics query returns
//! - [`TimeRange`] / [`PowerRange`]: the symbolic range vocabulary for range queries
//! - [`CacheEntry`]: a timestamped payload as held by the snapshot store
//! - [`report`]: the payload records written under each cache key
//!
//! ## Example
//!
//! ```rust
//! use hpcwatch_types::{EntityUniverse, HealthStatus, TimeRange};
//!
//! let universe = EntityUniverse::numbered("hopper-", 46, 2);
//! assert_eq!(universe.len(), 46);
//! assert_eq!(universe.names()[6], "hopper-07");
//!
//! assert!(HealthStatus::Critical.outranks(HealthStatus::NonRecoverable));
//!
//! let spec = TimeRange::Day.spec();
//! assert_eq!(spec.lookback_secs, 86_400);
//! assert_eq!(spec.step, "5m");
//! ```

mod entity;
mod entry;
mod format;
mod range;
pub mod report;
mod sample;
mod series;
mod status;

pub use entity::*;
pub use entry::*;
pub use format::*;
pub use range::*;
pub use sample::*;
pub use series::*;
pub use status::*;
