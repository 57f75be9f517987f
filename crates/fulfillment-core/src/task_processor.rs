//! Task processor loop (C6, §4.6).
//!
//! Single-worker, cooperative loop: sleep, fetch a batch of due tasks,
//! execute each serially, record observability counters. Built-in
//! handlers never perform outbound I/O — provider dispatch for their
//! categories happens at kickoff through C4's provider-order lifecycle
//! (§4.6 step 4b).

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use fulfillment_delivery::{HttpCallSpec, HttpExecutor};
use fulfillment_storage::Repositories;
use fulfillment_types::{
	DomainError, EndpointDescriptor, FulfillmentTask, FulfillmentTaskStatus, FulfillmentTaskType,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::fulfillment_service::FulfillmentService;
use crate::observability::ObservabilityStore;

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_BATCH_SIZE: usize = 25;
const DEFAULT_HTTP_TIMEOUT_SECONDS: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct TaskProcessorConfig {
	pub poll_interval_seconds: u64,
	pub batch_size: usize,
}

impl Default for TaskProcessorConfig {
	fn default() -> Self {
		Self { poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS, batch_size: DEFAULT_BATCH_SIZE }
	}
}

pub struct TaskProcessor {
	repositories: Repositories,
	fulfillment_service: Arc<FulfillmentService>,
	observability: Arc<ObservabilityStore>,
	http: HttpExecutor,
	config: TaskProcessorConfig,
}

impl TaskProcessor {
	pub fn new(
		repositories: Repositories,
		fulfillment_service: Arc<FulfillmentService>,
		observability: Arc<ObservabilityStore>,
		config: TaskProcessorConfig,
	) -> Self {
		Self { repositories, fulfillment_service, observability, http: HttpExecutor::new(), config }
	}

	/// Runs forever, sleeping `pollIntervalSeconds` between batches.
	/// Intended to be spawned as its own task by the supervisor (C13).
	pub async fn run(&self, shutdown: &tokio::sync::Notify) {
		self.observability.set_running(true);
		loop {
			tokio::select! {
				_ = shutdown.notified() => break,
				_ = tokio::time::sleep(std::time::Duration::from_secs(self.config.poll_interval_seconds)) => {
					self.run_once().await;
				}
			}
		}
		self.observability.set_running(false);
	}

	/// Drains up to `batchSize` due tasks once. Exposed separately from
	/// [`Self::run`] so tests and a manual-trigger endpoint can invoke a
	/// single iteration deterministically.
	pub async fn run_once(&self) {
		let started_at = Utc::now();
		let started = Instant::now();
		self.observability.record_run_start(started_at);

		let outcome = self.process_batch().await;

		let duration_ms = started.elapsed().as_millis() as i64;
		let error = match &outcome {
			Ok(()) => None,
			Err(err) => Some(err.to_string()),
		};
		if outcome.is_err() {
			self.observability.record_loop_error();
		}
		self.observability.record_run_finish(Utc::now(), duration_ms, error);
	}

	async fn process_batch(&self) -> Result<(), DomainError> {
		let now = Utc::now();
		let due = self.repositories.tasks.list_due(now, self.config.batch_size).await?;
		for mut task in due {
			self.process_one(&mut task).await;
		}
		Ok(())
	}

	async fn process_one(&self, task: &mut FulfillmentTask) {
		task.status = FulfillmentTaskStatus::InProgress;
		task.started_at = Some(Utc::now());
		task.updated_at = Utc::now();
		if let Err(err) = self.repositories.tasks.update(task).await {
			tracing::error!(task_id = %task.id, error = %err, "failed to mark task in_progress");
			return;
		}

		let type_key = task.task_type.as_str();
		match self.execute(task).await {
			Ok(result) => {
				task.status = FulfillmentTaskStatus::Completed;
				task.result = Some(result);
				task.error_message = None;
				task.completed_at = Some(Utc::now());
				task.updated_at = Utc::now();
				if let Err(err) = self.repositories.tasks.update(task).await {
					tracing::error!(task_id = %task.id, error = %err, "failed to persist completed task");
				}
				self.observability.record_processed(type_key);
				self.recompute_owning_order(task).await;
			}
			Err(err) => {
				self.handle_task_failure(task, &err).await;
				self.observability.record_failed(type_key);
				self.recompute_owning_order(task).await;
			}
		}
	}

	async fn recompute_owning_order(&self, task: &FulfillmentTask) {
		let Ok(item) = self.repositories.order_items.get(task.order_item_id).await else { return };
		if let Err(err) = self.fulfillment_service.recompute_order_status(item.order_id).await {
			tracing::warn!(order_id = %item.order_id, error = %err, "order status recompute failed");
		}
	}

	/// `_handleTaskFailure` (§4.6 step 4d): dead-letter past `maxRetries`,
	/// else schedule a retry at `min(1800, 60 × 2^retryCount)` seconds.
	async fn handle_task_failure(&self, task: &mut FulfillmentTask, err: &DomainError) {
		let type_key = task.task_type.as_str();
		if task.retry_count >= task.max_retries {
			task.status = FulfillmentTaskStatus::Failed;
			task.error_message = Some(err.to_string());
			task.result = Some(json!({"deadLetter": true, "retryCount": task.retry_count, "maxRetries": task.max_retries}));
			task.completed_at = Some(Utc::now());
			task.updated_at = Utc::now();
			if let Err(update_err) = self.repositories.tasks.update(task).await {
				tracing::error!(task_id = %task.id, error = %update_err, "failed to persist dead-lettered task");
			}
			self.observability.record_dead_lettered(type_key);
			return;
		}

		let delay_seconds = retry_delay_seconds(task.retry_count);
		if let Err(update_err) = self
			.fulfillment_service
			.schedule_retry(task, ChronoDuration::seconds(delay_seconds), &err.to_string())
			.await
		{
			tracing::error!(task_id = %task.id, error = %update_err, "failed to schedule task retry");
		}
		self.observability.record_retried(type_key);
	}

	async fn execute(&self, task: &FulfillmentTask) -> Result<Value, DomainError> {
		let payload = task.payload.clone().unwrap_or(Value::Null);
		let execution = payload.get("execution").cloned().filter(|v| !v.is_null());
		let context = payload.get("context").cloned().unwrap_or(Value::Null);

		if let Some(execution) = execution {
			return self.execute_http(task, &execution, &context).await;
		}
		Ok(execute_builtin(task))
	}

	async fn execute_http(&self, task: &FulfillmentTask, execution: &Value, context: &Value) -> Result<Value, DomainError> {
		let kind = execution.get("kind").and_then(Value::as_str).unwrap_or("http");
		if kind != "http" {
			return Err(DomainError::Template(format!("unsupported execution kind `{kind}`")));
		}

		let rendering_context = build_rendering_context(context, execution, task);

		let descriptor: EndpointDescriptor = serde_json::from_value(execution.clone())
			.map_err(|e| DomainError::Template(format!("invalid execution descriptor: {e}")))?;

		let method = fulfillment_template::render_string(&descriptor.method, &rendering_context)?;
		let url_value = fulfillment_template::render(&descriptor.url, &rendering_context)?;
		let url = url_value
			.as_str()
			.ok_or_else(|| DomainError::Template("execution url did not render to a string".to_string()))?
			.to_string();
		let headers =
			descriptor.headers.as_ref().map(|h| fulfillment_template::render(h, &rendering_context)).transpose()?;
		let body = descriptor.payload.as_ref().map(|p| fulfillment_template::render(p, &rendering_context)).transpose()?;
		let timeout_seconds = descriptor.timeout_seconds.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS);

		let spec = HttpCallSpec {
			method,
			url,
			headers,
			body: body.clone(),
			timeout_seconds,
			success_statuses: descriptor.success_statuses.clone(),
			success_status_min: descriptor.success_status_min,
			success_status_max: descriptor.success_status_max,
		};

		let started = Instant::now();
		let outcome = self.http.execute_checked(&spec).await?;
		let duration_ms = started.elapsed().as_millis() as i64;

		Ok(json!({
			"status": "http_request_completed",
			"status_code": outcome.status,
			"duration_ms": duration_ms,
			"response": outcome.json.unwrap_or_else(|| Value::String(outcome.text_preview.clone())),
			"payload_snapshot": body,
			"execution_kind": "http",
		}))
	}
}

/// `_getTaskEnvironment(executionEnvironmentKeys)` (§4.6.2). An empty or
/// absent `environment_keys` list exposes the full process environment;
/// otherwise only the named keys, with unset keys resolving to `null`.
fn task_environment(execution: &Value) -> Value {
	let keys: Vec<String> = execution
		.get("environment_keys")
		.and_then(Value::as_array)
		.map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
		.unwrap_or_default();

	let mut env = serde_json::Map::new();
	if keys.is_empty() {
		for (key, value) in std::env::vars() {
			env.insert(key, Value::String(value));
		}
	} else {
		for key in keys {
			let value = std::env::var(&key).map(Value::String).unwrap_or(Value::Null);
			env.insert(key, value);
		}
	}
	Value::Object(env)
}

fn build_rendering_context(frozen: &Value, execution: &Value, task: &FulfillmentTask) -> Value {
	let mut context = match frozen {
		Value::Object(map) => map.clone(),
		_ => serde_json::Map::new(),
	};
	context.insert("task".to_string(), json!({"id": task.id, "type": task.task_type.as_str(), "title": task.title}));
	context.insert("env".to_string(), task_environment(execution));
	Value::Object(context)
}

/// `min(1800, 60 × 2^retryCount)` (§4.6 step 4d).
fn retry_delay_seconds(retry_count: i32) -> i64 {
	let exp = 60i64.saturating_mul(1i64 << retry_count.max(0).min(62) as u32);
	exp.min(1800)
}

/// Dispatches a task with no `payload.execution` to its deterministic,
/// I/O-free built-in handler (§4.6 step 4b).
fn execute_builtin(task: &FulfillmentTask) -> Value {
	match task.task_type {
		FulfillmentTaskType::InstagramSetup => json!({"status": "instagram_setup_completed", "step": "account_verification"}),
		FulfillmentTaskType::AnalyticsCollection => {
			json!({"status": "analytics_collection_completed", "step": "baseline_metrics"})
		}
		FulfillmentTaskType::FollowerGrowth => json!({"status": "follower_growth_completed", "step": "growth_campaign"}),
		FulfillmentTaskType::EngagementBoost => json!({"status": "engagement_boost_completed", "step": "engagement_campaign"}),
		FulfillmentTaskType::ContentPromotion => json!({"status": "content_promotion_completed"}),
		FulfillmentTaskType::CampaignOptimization => json!({"status": "campaign_optimization_completed"}),
	}
}

/// A read-only view of what the processor has done so far, for an
/// operability endpoint — a thin wrapper over [`ObservabilityStore::snapshot`]
/// kept here so callers only need `task_processor` in scope.
pub fn health(observability: &ObservabilityStore) -> crate::observability::ProcessorHealth {
	observability.snapshot()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retry_delay_follows_exponential_backoff_capped_at_1800() {
		assert_eq!(retry_delay_seconds(0), 60);
		assert_eq!(retry_delay_seconds(1), 120);
		assert_eq!(retry_delay_seconds(2), 240);
		assert_eq!(retry_delay_seconds(5), 1800);
		assert_eq!(retry_delay_seconds(20), 1800);
	}

	#[test]
	fn builtin_handlers_are_deterministic_and_io_free() {
		let task = FulfillmentTask {
			id: Uuid::new_v4(),
			order_item_id: Uuid::new_v4(),
			task_type: FulfillmentTaskType::FollowerGrowth,
			status: FulfillmentTaskStatus::InProgress,
			title: "Follower Growth Campaign".to_string(),
			description: None,
			payload: None,
			result: None,
			error_message: None,
			retry_count: 0,
			max_retries: 3,
			scheduled_at: None,
			started_at: None,
			completed_at: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		let result = execute_builtin(&task);
		assert_eq!(result["status"], json!("follower_growth_completed"));
	}

	#[test]
	fn task_environment_restricts_to_named_keys() {
		std::env::set_var("FULFILLMENT_TEST_KEY", "value");
		let execution = json!({"environment_keys": ["FULFILLMENT_TEST_KEY", "FULFILLMENT_TEST_MISSING"]});
		let env = task_environment(&execution);
		assert_eq!(env["FULFILLMENT_TEST_KEY"], json!("value"));
		assert_eq!(env["FULFILLMENT_TEST_MISSING"], Value::Null);
		std::env::remove_var("FULFILLMENT_TEST_KEY");
	}

	#[test]
	fn task_environment_exposes_full_process_env_when_keys_absent() {
		std::env::set_var("FULFILLMENT_TEST_FULL", "1");
		let env = task_environment(&json!({}));
		assert_eq!(env["FULFILLMENT_TEST_FULL"], json!("1"));
		std::env::remove_var("FULFILLMENT_TEST_FULL");
	}
}
