//! Cron Scheduler (C10, §4.9): loads a TOML job schedule at startup,
//! resolves each job's `task` against a static registry of in-process
//! async callables, and runs each on its own cron trigger with
//! exponential-backoff-plus-jitter retry.
//!
//! Follows the same shapes `fulfillment-core`'s replay worker
//! (`replay_worker.rs`) and observability store (`observability.rs`)
//! establish: a `run(shutdown: &Notify)` cooperative loop, a
//! `*ObservabilityStore` with mutex-protected counters and a
//! snapshotting `health()`/`metrics_for` read, and a local
//! `backoff(attempt)` helper — generalized here to a per-job policy read
//! from the schedule file instead of a single hardcoded constant.

pub mod observability;
pub mod registry;
pub mod schedule;
pub mod scheduler;

pub use observability::{CronObservabilityStore, JobHealth, JobMetrics};
pub use registry::{JobFn, JobFuture, JobRegistry};
pub use schedule::{JobSpec, ScheduleError, ScheduleFile};
pub use scheduler::{CronError, CronScheduler};
