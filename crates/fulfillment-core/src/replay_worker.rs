//! Scheduled-replay worker (C7, §4.4).
//!
//! Drains due `scheduledReplays[]` entries across every provider order,
//! replaying each through [`ProviderAutomationService::execute_scheduled_replay`]
//! (which already writes the entry's terminal status exactly once — this
//! loop only tallies the run and applies backoff between attempts).

use std::time::Duration as StdDuration;

use chrono::Utc;
use fulfillment_automation::ProviderAutomationService;
use fulfillment_storage::Repositories;
use fulfillment_types::{DomainError, ProviderAutomationRun, ProviderAutomationRunType};
use rand::Rng;
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
const BACKOFF_BASE_SECONDS: f64 = 1.0;
const BACKOFF_MULTIPLIER: f64 = 2.0;
const BACKOFF_MAX_SECONDS: f64 = 30.0;

pub struct ReplayWorkerConfig {
	pub poll_interval_seconds: u64,
}

impl Default for ReplayWorkerConfig {
	fn default() -> Self {
		Self { poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS }
	}
}

pub struct ReplayWorker {
	repositories: Repositories,
	automation: std::sync::Arc<ProviderAutomationService>,
	config: ReplayWorkerConfig,
}

impl ReplayWorker {
	pub fn new(
		repositories: Repositories,
		automation: std::sync::Arc<ProviderAutomationService>,
		config: ReplayWorkerConfig,
	) -> Self {
		Self { repositories, automation, config }
	}

	pub async fn run(&self, shutdown: &tokio::sync::Notify) {
		loop {
			tokio::select! {
				_ = shutdown.notified() => break,
				_ = tokio::time::sleep(StdDuration::from_secs(self.config.poll_interval_seconds)) => {
					if let Err(err) = self.run_once().await {
						tracing::error!(error = %err, "scheduled-replay worker iteration failed");
					}
				}
			}
		}
	}

	/// Drains every currently-due entry once (§4.4 steps 1-3), persisting a
	/// `ProviderAutomationRun` summary. Exposed for tests and a manual-
	/// trigger endpoint.
	pub async fn run_once(&self) -> Result<ProviderAutomationRun, DomainError> {
		let started_at = Utc::now();
		let due_orders = self.repositories.provider_orders.list_with_due_scheduled_replays(started_at).await?;

		let mut processed = 0i64;
		let mut succeeded = 0i64;
		let mut failed = 0i64;
		let mut attempt = 0u32;

		for po in &due_orders {
			let due_entry_ids: Vec<String> = po
				.payload
				.scheduled_replays
				.iter()
				.filter(|e| e.status == "scheduled" && e.scheduled_for <= started_at)
				.map(|e| e.id.clone())
				.collect();

			for entry_id in due_entry_ids {
				processed += 1;
				attempt += 1;
				match self.automation.execute_scheduled_replay(po.id, &entry_id).await {
					Ok(()) => {
						succeeded += 1;
					}
					Err(err) => {
						tracing::warn!(provider_order_id = %po.id, entry_id = %entry_id, error = %err, "scheduled replay attempt failed");
						failed += 1;
						backoff(attempt).await;
					}
				}
			}
		}

		let finished_at = Utc::now();
		let scheduled_backlog = self.scheduled_backlog(finished_at).await?;
		let run = ProviderAutomationRun {
			id: Uuid::new_v4(),
			run_type: ProviderAutomationRunType::Replay,
			started_at,
			finished_at,
			processed,
			succeeded,
			failed,
			scheduled_backlog,
			error: None,
		};
		self.repositories.automation_runs.insert(&run).await?;
		Ok(run)
	}

	async fn scheduled_backlog(&self, now: chrono::DateTime<Utc>) -> Result<i64, DomainError> {
		let all = self.repositories.provider_orders.list_all().await?;
		Ok(all
			.iter()
			.flat_map(|po| po.payload.scheduled_replays.iter())
			.filter(|e| e.status == "scheduled" && e.scheduled_for > now)
			.count() as i64)
	}
}

/// `base × multiplier^(attempt-1)`, capped, plus jitter (§4.4 step 4).
async fn backoff(attempt: u32) {
	let exponent = attempt.saturating_sub(1);
	let base = BACKOFF_BASE_SECONDS * BACKOFF_MULTIPLIER.powi(exponent as i32);
	let capped = base.min(BACKOFF_MAX_SECONDS);
	let jitter: f64 = rand::thread_rng().gen_range(0.0..capped * 0.25);
	tokio::time::sleep(StdDuration::from_secs_f64(capped + jitter)).await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_automation::ProviderAutomationService;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::{FulfillmentProviderOrder, ProviderOrderPayload, ScheduledReplayEntry};
	use rust_decimal::Decimal;
	use std::sync::Arc;

	fn repositories() -> Repositories {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		Repositories::new(storage)
	}

	fn due_provider_order() -> FulfillmentProviderOrder {
		let now = Utc::now();
		let mut payload = ProviderOrderPayload::default();
		payload.scheduled_replays.push(ScheduledReplayEntry {
			id: "sched-1".to_string(),
			requested_amount: None,
			currency: None,
			scheduled_for: now - chrono::Duration::minutes(1),
			status: "scheduled".to_string(),
			rule_ids: vec![],
			rule_metadata: Default::default(),
			response: None,
			error: None,
		});
		FulfillmentProviderOrder {
			id: Uuid::new_v4(),
			provider_id: "provider-a".to_string(),
			service_id: "svc-1".to_string(),
			service_action: "order".to_string(),
			order_id: Uuid::new_v4(),
			order_item_id: Uuid::new_v4(),
			amount: Decimal::new(1000, 2),
			currency: "USD".to_string(),
			provider_name: None,
			payload,
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn run_once_with_no_due_entries_persists_empty_summary() {
		let repos = repositories();
		let automation = Arc::new(ProviderAutomationService::new(repos.clone()));
		let worker = ReplayWorker::new(repos, automation, ReplayWorkerConfig::default());

		let run = worker.run_once().await.unwrap();
		assert_eq!(run.processed, 0);
		assert_eq!(run.run_type, ProviderAutomationRunType::Replay);
	}

	#[tokio::test]
	async fn due_entry_without_a_reachable_provider_counts_as_failed() {
		let repos = repositories();
		let po = due_provider_order();
		repos.provider_orders.insert(&po).await.unwrap();
		let automation = Arc::new(ProviderAutomationService::new(repos.clone()));
		let worker = ReplayWorker::new(repos.clone(), automation, ReplayWorkerConfig::default());

		let run = worker.run_once().await.unwrap();
		assert_eq!(run.processed, 1);
		assert_eq!(run.failed, 1);

		let stored = repos.provider_orders.get(po.id).await.unwrap();
		assert_eq!(stored.payload.scheduled_replays[0].status, "failed");
	}
}
