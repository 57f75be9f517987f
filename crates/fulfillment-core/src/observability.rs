//! Process-local observability counters for the task processor loop (C12,
//! §4.6.3/§4.6.4, §9 design note). Deliberately process-local and
//! mutex-protected; reads are snapshot-producing and never mutate state.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TaskTypeBucket {
	pub processed: u64,
	pub failed: u64,
	pub retried: u64,
	pub dead_lettered: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessorHealth {
	pub running: bool,
	pub last_run_started_at: Option<DateTime<Utc>>,
	pub last_run_finished_at: Option<DateTime<Utc>>,
	pub last_run_duration_ms: Option<i64>,
	pub last_run_error: Option<String>,
	pub tasks_processed: u64,
	pub tasks_failed: u64,
	pub tasks_retried: u64,
	pub tasks_dead_lettered: u64,
	pub loop_errors: u64,
	pub per_task_type: HashMap<String, TaskTypeBucket>,
}

#[derive(Default)]
pub struct ObservabilityStore {
	inner: Mutex<ProcessorHealth>,
}

impl ObservabilityStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_running(&self, running: bool) {
		self.inner.lock().unwrap().running = running;
	}

	pub fn record_run_start(&self, started_at: DateTime<Utc>) {
		self.inner.lock().unwrap().last_run_started_at = Some(started_at);
	}

	pub fn record_run_finish(&self, finished_at: DateTime<Utc>, duration_ms: i64, error: Option<String>) {
		let mut health = self.inner.lock().unwrap();
		health.last_run_finished_at = Some(finished_at);
		health.last_run_duration_ms = Some(duration_ms);
		health.last_run_error = error;
	}

	pub fn record_processed(&self, task_type: &str) {
		let mut health = self.inner.lock().unwrap();
		health.tasks_processed += 1;
		health.per_task_type.entry(task_type.to_string()).or_default().processed += 1;
	}

	pub fn record_failed(&self, task_type: &str) {
		let mut health = self.inner.lock().unwrap();
		health.tasks_failed += 1;
		health.per_task_type.entry(task_type.to_string()).or_default().failed += 1;
	}

	pub fn record_retried(&self, task_type: &str) {
		let mut health = self.inner.lock().unwrap();
		health.tasks_retried += 1;
		health.per_task_type.entry(task_type.to_string()).or_default().retried += 1;
	}

	pub fn record_dead_lettered(&self, task_type: &str) {
		let mut health = self.inner.lock().unwrap();
		health.tasks_dead_lettered += 1;
		health.per_task_type.entry(task_type.to_string()).or_default().dead_lettered += 1;
	}

	pub fn record_loop_error(&self) {
		self.inner.lock().unwrap().loop_errors += 1;
	}

	/// `healthSnapshot()` (§4.6.4): a read-only copy, never mutates state.
	pub fn snapshot(&self) -> ProcessorHealth {
		self.inner.lock().unwrap().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counters_increment_independently_per_task_type() {
		let store = ObservabilityStore::new();
		store.record_processed("instagram_setup");
		store.record_failed("instagram_setup");
		store.record_retried("follower_growth");

		let snapshot = store.snapshot();
		assert_eq!(snapshot.tasks_processed, 1);
		assert_eq!(snapshot.tasks_failed, 1);
		assert_eq!(snapshot.tasks_retried, 1);
		assert_eq!(snapshot.per_task_type.get("instagram_setup").unwrap().processed, 1);
		assert_eq!(snapshot.per_task_type.get("follower_growth").unwrap().retried, 1);
	}

	#[test]
	fn snapshot_does_not_reset_counters() {
		let store = ObservabilityStore::new();
		store.record_processed("instagram_setup");
		let _ = store.snapshot();
		let _ = store.snapshot();
		assert_eq!(store.snapshot().tasks_processed, 1);
	}
}
