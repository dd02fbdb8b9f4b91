//! # hpcwatch-cache
//!
//! The refresh side of hpcwatch: turns raw source rows into stable
//! per-node values and keeps the snapshot store up to date.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use hpcwatch_cache::{transform_power, PowerMerger};
//! use hpcwatch_types::{EntityUniverse, Series};
//!
//! let universe = EntityUniverse::numbered("hopper-", 2, 2);
//! let mut merger = PowerMerger::new(universe.clone(), 3);
//!
//! // A scrape that saw hopper-01, then one that saw nothing
//! let rows = vec![Series::new().label("source", "hopper-01").point(0.0, "1200")];
//! merger.ingest(transform_power(&rows, &universe, Utc::now()));
//! merger.ingest(transform_power(&[], &universe, Utc::now()));
//!
//! let report = merger.report().unwrap();
//! assert_eq!(report.nodes[0].watts, 1200);
//! assert_eq!(report.nodes[1].watts, 0);
//! ```
//!
//! ## Components
//!
//! - **Transformer** ([`transform`]): rows to one sample per entity, with
//!   placeholders for anything missing or malformed
//! - **History merger** ([`HistoryWindow`], [`StatusMerger`], [`PowerMerger`]):
//!   bounded per-entity windows reduced by a severity or last-nonzero rule
//! - **Cache store** ([`CacheStore`], [`FileStore`], [`MemoryStore`])
//! - **Scheduler** ([`Scheduler`]): fixed-interval jobs that never overlap
//!   with themselves, with failures contained per job and per sub-job

mod history;
mod merger;
mod pipeline;
mod scheduler;
mod store;
pub mod transform;

pub use history::{HistoryWindow, Mergeable};
pub use merger::{HistoryMerger, LastKnownUptime, PowerMerger, StatusMerger, NO_DATA_LABEL};
pub use pipeline::{run_sub_jobs, JobError, JobReport, Pipeline, SubJob};
pub use scheduler::{Job, JobState, Scheduler, SchedulerBuilder, SchedulerHandle};
pub use store::{validate_key, CacheStore, FileStore, MemoryStore, StoreError};
pub use transform::{transform_power, transform_status, Batch};
