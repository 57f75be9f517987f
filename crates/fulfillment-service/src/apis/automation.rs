//! Provider automation endpoints (§6): the telemetry snapshot and the
//! manual replay trigger.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use fulfillment_automation::{backlog_metrics, build_snapshot, AutomationSnapshot, BacklogMetrics, ReplayOutcome};
use fulfillment_types::{DomainError, ReplayEntry, ScheduledReplayEntry};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
	pub global: AutomationSnapshot,
	pub by_provider: std::collections::HashMap<String, AutomationSnapshot>,
	pub backlog: BacklogMetrics,
}

/// `GET /fulfillment/providers/automation/snapshot` (§4.3.7, §4.3.8, §6).
pub async fn snapshot(State(state): State<AppState>) -> Result<Json<SnapshotResponse>, DomainError> {
	let (global, by_provider) = build_snapshot(&state.repositories).await?;
	let backlog = backlog_metrics(&state.repositories).await?;
	Ok(Json(SnapshotResponse { global, by_provider, backlog }))
}

#[derive(Debug, Deserialize)]
pub struct ReplayRequest {
	#[serde(default)]
	pub amount: Option<f64>,
	#[serde(default)]
	pub run_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub schedule_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplayResponse {
	Immediate(ReplayEntry),
	Scheduled(ScheduledReplayEntry),
}

/// `POST /fulfillment/providers/{id}/orders/{providerOrderId}/replay`
/// (§4.3.5, §6, §8): `runAt <= now` behaves as immediate unless
/// `scheduleOnly=true`. `{id}` (the provider id) is accepted on the path
/// for routing symmetry with the rest of the provider sub-tree but is not
/// itself consulted — the provider-order row already carries its owning
/// `providerId`.
pub async fn replay(
	State(state): State<AppState>,
	Path((_provider_id, provider_order_id)): Path<(String, Uuid)>,
	Json(request): Json<ReplayRequest>,
) -> Result<Json<ReplayResponse>, DomainError> {
	let outcome = state.automation.replay(provider_order_id, request.amount, request.run_at, request.schedule_only).await?;
	Ok(Json(match outcome {
		ReplayOutcome::Immediate(entry) => ReplayResponse::Immediate(entry),
		ReplayOutcome::Scheduled(entry) => ReplayResponse::Scheduled(entry),
	}))
}
