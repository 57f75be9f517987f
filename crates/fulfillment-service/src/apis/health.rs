//! `GET /healthz` (§6): unauthenticated liveness probe reporting worker
//! supervisor state and build metadata, aggregated into one JSON body
//! the same way every other response DTO in this crate derives `Serialize`.

use axum::extract::State;
use axum::Json;
use fulfillment_core::ProcessorHealth;
use fulfillment_cron::JobHealth;
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct WorkerSupervisorHealth {
	pub fulfillment_processor: Option<ProcessorHealth>,
	pub provider_replay_enabled: bool,
	pub cron_jobs: Option<Vec<JobHealth>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub version: &'static str,
	pub workers: WorkerSupervisorHealth,
}

/// `GET /healthz` (§6, §4.6.4, §4.9, §4.11): never requires the
/// `X-API-Key` header — a probe that itself needed a credential would be
/// useless to an unauthenticated load balancer.
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
	let fulfillment_processor = state.config.workers.fulfillment.enabled.then(|| state.observability.snapshot());
	let cron_jobs = state.cron_scheduler.as_ref().map(|scheduler| scheduler.health());

	Json(HealthResponse {
		status: "ok",
		version: env!("CARGO_PKG_VERSION"),
		workers: WorkerSupervisorHealth {
			fulfillment_processor,
			provider_replay_enabled: state.config.workers.provider_replay.enabled,
			cron_jobs,
		},
	})
}
