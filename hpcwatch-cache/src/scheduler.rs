//! The refresh scheduler.
//!
//! Each registered pipeline becomes a [`Job`] with its own interval. A job
//! moves `Idle -> Running -> Idle`; a tick that finds the job still running
//! is skipped, so a job never overlaps with itself. Distinct jobs run
//! independently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::pipeline::{JobError, JobReport, Pipeline};
use crate::store::CacheStore;

/// Whether a job is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

/// Scheduling state of one job.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub interval: Duration,
    /// When the most recent run started.
    pub last_run: Option<DateTime<Utc>>,
    pub state: JobState,
    pub runs: u64,
    /// Ticks dropped because the previous run was still in progress.
    pub skipped: u64,
    pub failures: u64,
}

#[derive(Debug)]
struct JobSlot {
    pipeline: Arc<dyn Pipeline>,
    job: Mutex<Job>,
}

/// Resets the job to `Idle` when dropped, however the run ended.
struct RunningGuard {
    slot: Arc<JobSlot>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.slot.job.lock().state = JobState::Idle;
    }
}

impl JobSlot {
    /// Move `Idle -> Running`, or record a skipped tick.
    fn try_begin(self: &Arc<Self>) -> Option<RunningGuard> {
        let mut job = self.job.lock();
        if job.state == JobState::Running {
            job.skipped += 1;
            return None;
        }

        job.state = JobState::Running;
        job.last_run = Some(Utc::now());
        job.runs += 1;
        Some(RunningGuard { slot: self.clone() })
    }

    fn name(&self) -> &str {
        self.pipeline.name()
    }
}

/// Run one job to completion under its guard.
///
/// The pipeline runs in its own task so a panic is contained and reported
/// as [`JobError::Panicked`].
async fn execute(
    slot: Arc<JobSlot>,
    store: Arc<dyn CacheStore>,
    guard: RunningGuard,
) -> Result<JobReport, JobError> {
    let _guard = guard;
    let pipeline = slot.pipeline.clone();
    let started = Instant::now();
    debug!(job = slot.name(), "Job started");

    let result = match tokio::spawn(async move { pipeline.run(store.as_ref()).await }).await {
        Ok(result) => result,
        Err(e) => Err(JobError::Panicked(join_error_message(e))),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(report) => {
            debug!(job = slot.name(), written = report.written.len(), elapsed_ms, "Job finished");
        }
        Err(e @ JobError::Panicked(_)) => {
            error!(job = slot.name(), error = %e, elapsed_ms, "Job panicked");
        }
        Err(e) => {
            warn!(job = slot.name(), error = %e, elapsed_ms, "Job failed");
        }
    }

    if result.is_err() {
        slot.job.lock().failures += 1;
    }
    result
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Owns the registered jobs and drives them.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use hpcwatch_cache::{MemoryStore, Scheduler};
///
/// # async fn demo(pipeline: Arc<dyn hpcwatch_cache::Pipeline>) {
/// let scheduler = Scheduler::builder(Arc::new(MemoryStore::new()))
///     .job(pipeline, Duration::from_secs(180))
///     .build();
///
/// // Runs every job once right away, then on its interval
/// let handle = scheduler.start();
///
/// // ... later
/// handle.stop();
/// # }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    slots: Vec<Arc<JobSlot>>,
    store: Arc<dyn CacheStore>,
}

impl Scheduler {
    /// Create a builder writing to `store`.
    pub fn builder(store: Arc<dyn CacheStore>) -> SchedulerBuilder {
        SchedulerBuilder {
            store,
            jobs: Vec::new(),
        }
    }

    /// Current state of every job, in registration order.
    pub fn jobs(&self) -> Vec<Job> {
        self.slots.iter().map(|s| s.job.lock().clone()).collect()
    }

    /// Every `(job, key)` pair the registered pipelines may write.
    pub fn keys(&self) -> Vec<(String, String)> {
        self.slots
            .iter()
            .flat_map(|slot| {
                let name = slot.name().to_string();
                slot.pipeline
                    .keys()
                    .into_iter()
                    .map(move |key| (name.clone(), key))
            })
            .collect()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Run every job once, concurrently, and wait for all of them.
    ///
    /// Jobs that are already running are skipped and reported as `None`.
    pub async fn run_all_now(&self) -> Vec<(String, Option<Result<JobReport, JobError>>)> {
        let runs = self.slots.iter().map(|slot| {
            let slot = slot.clone();
            let store = self.store.clone();
            async move {
                let name = slot.name().to_string();
                let outcome = match slot.try_begin() {
                    Some(guard) => Some(execute(slot, store, guard).await),
                    None => {
                        debug!(job = %name, "Job already running, not starting another run");
                        None
                    }
                };
                (name, outcome)
            }
        });
        join_all(runs).await
    }

    /// Start background scheduling.
    ///
    /// Every job runs once immediately, then on each tick of its interval.
    /// Returns a handle that can be used to stop scheduling; runs already in
    /// progress are allowed to finish.
    pub fn start(&self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        let tasks = self
            .slots
            .iter()
            .map(|slot| {
                let slot = slot.clone();
                let store = self.store.clone();
                let mut stop_rx = stop_rx.clone();

                tokio::spawn(async move {
                    let interval = slot.job.lock().interval;
                    info!(job = slot.name(), interval_secs = interval.as_secs(), "Scheduling job");

                    dispatch(&slot, &store);

                    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => dispatch(&slot, &store),
                            changed = stop_rx.changed() => {
                                if changed.is_err() || *stop_rx.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                    debug!(job = slot.name(), "Job loop stopped");
                })
            })
            .collect();

        SchedulerHandle { stop_tx, tasks }
    }
}

/// Start a run in the background unless the job is still running.
fn dispatch(slot: &Arc<JobSlot>, store: &Arc<dyn CacheStore>) {
    match slot.try_begin() {
        Some(guard) => {
            tokio::spawn(execute(slot.clone(), store.clone(), guard));
        }
        None => debug!(job = slot.name(), "Previous run still in progress, skipping tick"),
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    store: Arc<dyn CacheStore>,
    jobs: Vec<(Arc<dyn Pipeline>, Duration)>,
}

impl SchedulerBuilder {
    /// Register a pipeline to run every `interval`.
    pub fn job(mut self, pipeline: Arc<dyn Pipeline>, interval: Duration) -> Self {
        self.jobs.push((pipeline, interval));
        self
    }

    pub fn build(self) -> Scheduler {
        let slots = self
            .jobs
            .into_iter()
            .map(|(pipeline, interval)| {
                let job = Job {
                    name: pipeline.name().to_string(),
                    interval: interval.max(Duration::from_secs(1)),
                    last_run: None,
                    state: JobState::Idle,
                    runs: 0,
                    skipped: 0,
                    failures: 0,
                };
                Arc::new(JobSlot {
                    pipeline,
                    job: Mutex::new(job),
                })
            })
            .collect();

        Scheduler {
            slots,
            store: self.store,
        }
    }
}

/// Handle for controlling background scheduling.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop issuing new runs.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop issuing new runs and wait for the job loops to exit.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
