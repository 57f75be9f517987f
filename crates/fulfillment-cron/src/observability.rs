//! Per-job observability the cron scheduler exposes via `health()`
//! (§4.9: "Emit per-run observability: runtimeSeconds, attempts,
//! lastError" / "`health()` returns configured jobs, their metrics
//! snapshot, and running/stopped state").

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobMetrics {
	pub last_run_started_at: Option<DateTime<Utc>>,
	pub last_run_finished_at: Option<DateTime<Utc>>,
	pub last_runtime_seconds: Option<f64>,
	pub last_attempts: u32,
	pub last_error: Option<String>,
	pub total_runs: u64,
	pub total_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobHealth {
	pub id: String,
	pub cron_expression: String,
	pub running: bool,
	pub metrics: JobMetrics,
}

#[derive(Default)]
pub struct CronObservabilityStore {
	inner: Mutex<HashMap<String, JobMetrics>>,
	running: Mutex<bool>,
}

impl CronObservabilityStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_running(&self, running: bool) {
		*self.running.lock().unwrap() = running;
	}

	pub fn is_running(&self) -> bool {
		*self.running.lock().unwrap()
	}

	pub fn record_run_start(&self, job_id: &str, started_at: DateTime<Utc>) {
		self.inner.lock().unwrap().entry(job_id.to_string()).or_default().last_run_started_at = Some(started_at);
	}

	pub fn record_run_finish(&self, job_id: &str, finished_at: DateTime<Utc>, runtime_seconds: f64, attempts: u32, error: Option<String>) {
		let mut store = self.inner.lock().unwrap();
		let metrics = store.entry(job_id.to_string()).or_default();
		metrics.last_run_finished_at = Some(finished_at);
		metrics.last_runtime_seconds = Some(runtime_seconds);
		metrics.last_attempts = attempts;
		metrics.total_runs += 1;
		if error.is_some() {
			metrics.total_failures += 1;
		}
		metrics.last_error = error;
	}

	pub fn metrics_for(&self, job_id: &str) -> JobMetrics {
		self.inner.lock().unwrap().get(job_id).cloned().unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tracks_totals_and_last_error_independently_per_job() {
		let store = CronObservabilityStore::new();
		let now = Utc::now();
		store.record_run_start("weekly-digest", now);
		store.record_run_finish("weekly-digest", now, 0.5, 1, None);
		store.record_run_start("weekly-digest", now);
		store.record_run_finish("weekly-digest", now, 0.2, 3, Some("boom".to_string()));

		let metrics = store.metrics_for("weekly-digest");
		assert_eq!(metrics.total_runs, 2);
		assert_eq!(metrics.total_failures, 1);
		assert_eq!(metrics.last_error.as_deref(), Some("boom"));
	}
}
