//! HTTP server for the subset of the platform API this core still serves
//! directly (§6 "HTTP API"): an axum `Router` with a shared `AppState`
//! passed via `.with_state`, bound with `TcpListener::bind` and served
//! with `axum::serve`, with an `X-API-Key` middleware layer gating the
//! admin/user-scoped routes per §6.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use fulfillment_automation::ProviderAutomationService;
use fulfillment_config::{ApiConfig, Config};
use fulfillment_core::{FulfillmentService, ObservabilityStore, OrderStateMachine};
use fulfillment_cron::CronScheduler;
use fulfillment_payments::PaymentGatewayClient;
use fulfillment_payments::PaymentIngestionService;
use fulfillment_storage::Repositories;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::apis::{auth, automation, health, orders, payments};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub config: Config,
	pub repositories: Repositories,
	pub state_machine: Arc<OrderStateMachine>,
	pub automation: Arc<ProviderAutomationService>,
	pub fulfillment_service: Arc<FulfillmentService>,
	pub payments: Arc<PaymentIngestionService>,
	pub gateway: Arc<dyn PaymentGatewayClient>,
	pub observability: Arc<ObservabilityStore>,
	pub cron_scheduler: Option<Arc<CronScheduler>>,
}

/// Starts the HTTP server for the API (§6). Routes mirror the endpoint
/// list verbatim; admin/API-key-gated routes sit behind the
/// `require_api_key` middleware layer, applied per-route rather than
/// globally since `POST /payments/webhooks/stripe` authenticates via
/// its own signature check instead.
pub async fn start_server(api_config: ApiConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
	let gated = Router::new()
		.route("/orders/user/{user_id}", get(orders::list_orders_by_user))
		.route("/orders/{id}/status", patch(orders::update_order_status))
		.route("/orders/{id}/state-events", get(orders::order_state_events))
		.route("/payments/checkout", post(payments::create_checkout))
		.route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

	let open = Router::new()
		.route("/orders", post(orders::create_order).get(orders::list_orders))
		.route("/orders/{id}", get(orders::get_order))
		.route("/orders/{id}/progress", get(orders::order_progress))
		.route("/payments/webhooks/stripe", post(payments::stripe_webhook))
		.route("/fulfillment/providers/automation/snapshot", get(automation::snapshot))
		.route("/fulfillment/providers/{id}/orders/{provider_order_id}/replay", post(automation::replay))
		.route("/healthz", get(health::healthz));

	let app = Router::new()
		.merge(gated)
		.merge(open)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(state);

	let listener = TcpListener::bind(&api_config.bind_addr).await?;
	tracing::info!(bind_addr = %api_config.bind_addr, "fulfillment API server starting");
	axum::serve(listener, app).await?;
	Ok(())
}
