//! Cron Scheduler (C10, §4.9): runs each scheduled job on its own cron
//! trigger, retrying failures with exponential backoff plus jitter before
//! giving up for that run.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use fulfillment_types::DomainError;
use rand::Rng;
use tokio::sync::Notify;

use crate::observability::{CronObservabilityStore, JobHealth};
use crate::registry::JobRegistry;
use crate::schedule::{JobSpec, ScheduleError, ScheduleFile};

#[derive(Debug, thiserror::Error)]
pub enum CronError {
	#[error(transparent)]
	Schedule(#[from] ScheduleError),
	#[error("job {0:?} has no registered task handler")]
	UnresolvedJob(String),
}

/// `base * multiplier^(attempt-1)`, capped at `max_backoff`, plus
/// `U(0, jitter)` (§4.9 step 3). `attempt` is 1-indexed.
fn backoff_duration(job: &JobSpec, attempt: u32) -> std::time::Duration {
	let exp = job.backoff_multiplier.powi((attempt - 1) as i32);
	let capped = (job.base_backoff_seconds * exp).min(job.max_backoff_seconds);
	let jitter = if job.jitter_seconds > 0.0 { rand::thread_rng().gen_range(0.0..job.jitter_seconds) } else { 0.0 };
	std::time::Duration::from_secs_f64((capped + jitter).max(0.0))
}

pub struct CronScheduler {
	jobs: Vec<(String, JobSpec)>,
	tz: chrono_tz::Tz,
	registry: JobRegistry,
	store: Arc<CronObservabilityStore>,
}

impl CronScheduler {
	/// Parses and validates `schedule` (cron syntax, timezone) and checks
	/// every `job.task` resolves against `registry` before returning — an
	/// unregistered task fails the scheduler at construction, not at its
	/// first scheduled fire.
	pub fn new(schedule: ScheduleFile, registry: JobRegistry) -> Result<Self, CronError> {
		let tz = schedule.timezone().map_err(|_| ScheduleError::UnknownTimezone(schedule.timezone.clone()))?;
		for job in schedule.jobs.values() {
			if !registry.contains(&job.task) {
				return Err(CronError::UnresolvedJob(job.task.clone()));
			}
		}
		let jobs = schedule.jobs.into_iter().collect();
		Ok(Self { jobs, tz, registry, store: Arc::new(CronObservabilityStore::new()) })
	}

	/// Runs every configured job's trigger loop until `shutdown` is
	/// notified. Each job runs on its own cooperative loop so one job's
	/// retry backoff never delays another's next fire.
	pub async fn run(&self, shutdown: &Notify) {
		self.store.set_running(true);
		let mut handles = Vec::new();
		for (id, job) in self.jobs.clone() {
			let registry = self.registry.clone();
			let store = self.store.clone();
			let tz = self.tz;
			handles.push(tokio::spawn(run_job_loop(id, job, tz, registry, store)));
		}

		shutdown.notified().await;
		self.store.set_running(false);
		for handle in handles {
			handle.abort();
		}
	}

	/// `health()` (§4.9): configured jobs, their metrics snapshot, and
	/// running/stopped state.
	pub fn health(&self) -> Vec<JobHealth> {
		self.jobs
			.iter()
			.map(|(id, job)| JobHealth {
				id: id.clone(),
				cron_expression: job.cron.clone(),
				running: self.store.is_running(),
				metrics: self.store.metrics_for(id),
			})
			.collect()
	}
}

/// One job's forever loop: sleep until the next cron fire, run with
/// retry, repeat. Stopped by `CronScheduler::run` aborting its handle on
/// shutdown rather than a cooperative check here — a job never parks
/// mid-retry waiting on a signal that might never come.
async fn run_job_loop(id: String, job: JobSpec, tz: chrono_tz::Tz, registry: JobRegistry, store: Arc<CronObservabilityStore>) {
	let schedule = match Schedule::from_str(&job.cron) {
		Ok(schedule) => schedule,
		Err(err) => {
			tracing::error!(job_id = %id, error = %err, "cron job loop exiting: invalid cron expression");
			return;
		}
	};

	loop {
		let Some(next_fire) = schedule.upcoming(tz).next() else {
			tracing::warn!(job_id = %id, "cron schedule has no upcoming fire time, stopping loop");
			return;
		};
		let now = Utc::now().with_timezone(&tz);
		let wait = (next_fire - now).to_std().unwrap_or(std::time::Duration::ZERO);
		tokio::time::sleep(wait).await;

		run_job_with_retry(&id, &job, &registry, &store).await;
	}
}

/// Runs `job` with retry-with-backoff up to `job.max_attempts`, recording
/// per-run observability regardless of outcome (§4.9 steps 3-4).
async fn run_job_with_retry(id: &str, job: &JobSpec, registry: &JobRegistry, store: &CronObservabilityStore) {
	let Some(task) = registry.resolve(&job.task) else {
		tracing::error!(job_id = %id, task = %job.task, "cron job has no registered handler at run time");
		return;
	};

	let started_at = Utc::now();
	store.record_run_start(id, started_at);

	let mut last_error: Option<DomainError> = None;
	let mut attempt = 0;
	for current_attempt in 1..=job.max_attempts.max(1) {
		attempt = current_attempt;
		match task(job.kwargs.clone()).await {
			Ok(()) => {
				last_error = None;
				break;
			}
			Err(err) => {
				tracing::warn!(job_id = %id, attempt, error = %err, "cron job run failed");
				last_error = Some(err);
				if current_attempt < job.max_attempts {
					tokio::time::sleep(backoff_duration(job, current_attempt)).await;
				}
			}
		}
	}

	let finished_at = Utc::now();
	let runtime_seconds = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;
	store.record_run_finish(id, finished_at, runtime_seconds, attempt, last_error.map(|e| e.to_string()));
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schedule::ScheduleFile;
	use std::sync::atomic::{AtomicU32, Ordering};

	fn one_job(cron: &str) -> (String, JobSpec) {
		let file = ScheduleFile::parse(&format!(
			r#"
			timezone = "UTC"

			[jobs.job_a]
			task = "noop"
			cron = "{cron}"
			max_attempts = 3
			base_backoff_seconds = 0.01
			backoff_multiplier = 2.0
			max_backoff_seconds = 0.05
			jitter_seconds = 0.0
			"#
		))
		.unwrap();
		file.jobs.into_iter().next().unwrap()
	}

	#[test]
	fn unresolved_task_fails_construction() {
		let file = ScheduleFile::parse(
			r#"
			timezone = "UTC"

			[jobs.job_a]
			task = "noop"
			cron = "0 * * * * *"
			"#,
		)
		.unwrap();
		let registry = JobRegistry::new();
		let err = CronScheduler::new(file, registry).unwrap_err();
		assert!(matches!(err, CronError::UnresolvedJob(_)));
	}

	#[tokio::test]
	async fn run_with_retry_succeeds_after_transient_failures() {
		let (id, job) = one_job("0 * * * * *");
		let mut registry = JobRegistry::new();
		let attempts = Arc::new(AtomicU32::new(0));
		let attempts_clone = attempts.clone();
		registry.register("noop", move |_kwargs| {
			let attempts = attempts_clone.clone();
			Box::pin(async move {
				let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
				if n < 2 {
					Err(DomainError::Transient("flaky".to_string()))
				} else {
					Ok(())
				}
			})
		});
		let store = CronObservabilityStore::new();

		run_job_with_retry(&id, &job, &registry, &store).await;

		assert_eq!(attempts.load(Ordering::SeqCst), 2);
		let metrics = store.metrics_for(&id);
		assert_eq!(metrics.total_failures, 0);
		assert_eq!(metrics.last_attempts, 2);
	}

	#[tokio::test]
	async fn run_with_retry_gives_up_after_max_attempts() {
		let (id, job) = one_job("0 * * * * *");
		let mut registry = JobRegistry::new();
		registry.register("noop", |_kwargs| Box::pin(async { Err(DomainError::Transient("always fails".to_string())) }));
		let store = CronObservabilityStore::new();

		run_job_with_retry(&id, &job, &registry, &store).await;

		let metrics = store.metrics_for(&id);
		assert_eq!(metrics.total_failures, 1);
		assert_eq!(metrics.last_attempts, 3);
		assert!(metrics.last_error.is_some());
	}
}
