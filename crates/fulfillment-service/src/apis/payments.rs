//! Payment endpoints (§6): hosted checkout session creation and the
//! signed Stripe webhook.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use fulfillment_payments::CheckoutSession;
use fulfillment_types::{DomainError, Payment};
use serde::Deserialize;
use uuid::Uuid;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
	pub order_id: Uuid,
	pub success_url: String,
	pub cancel_url: String,
	#[serde(default)]
	pub customer_email: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
	pub checkout_session_id: String,
	pub checkout_url: String,
	pub payment_id: Uuid,
	pub amount: rust_decimal::Decimal,
	pub currency: String,
}

/// `POST /payments/checkout` (§6), gated by the `X-API-Key` middleware
/// (`require_checkout_api_key`, §6).
pub async fn create_checkout(
	State(state): State<AppState>,
	Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, DomainError> {
	let (session, payment): (CheckoutSession, Payment) = fulfillment_payments::create_checkout_session(
		&state.repositories,
		state.gateway.as_ref(),
		request.order_id,
		request.customer_email,
		request.success_url,
		request.cancel_url,
	)
	.await?;

	Ok(Json(CheckoutResponse {
		checkout_session_id: session.checkout_session_id,
		checkout_url: session.checkout_url,
		payment_id: payment.id,
		amount: payment.amount,
		currency: payment.currency,
	}))
}

/// `POST /payments/webhooks/stripe` (§4.8, §6): verifies `stripe-signature`,
/// dedupes by event id, and dispatches by event type. Per §7, every error
/// other than `AuthError`/`ValidationError` is surfaced as 500 so Stripe
/// retries the delivery; a signature mismatch or malformed payload is a
/// 400 the provider will not usefully retry (§4.8 step 2: "on mismatch
/// emit metric and return 400").
pub async fn stripe_webhook(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: axum::body::Bytes,
) -> axum::response::Response {
	use axum::response::IntoResponse;

	let signature = match headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
		Some(signature) => signature,
		None => return axum::http::StatusCode::BAD_REQUEST.into_response(),
	};

	match state.payments.ingest_stripe_webhook(&body, signature, chrono::Utc::now().timestamp()).await {
		Ok(()) => axum::http::StatusCode::OK.into_response(),
		Err(err @ (DomainError::Auth(_) | DomainError::Validation(_))) => {
			tracing::warn!(error = %err, "rejected stripe webhook");
			axum::http::StatusCode::BAD_REQUEST.into_response()
		}
		Err(err) => {
			tracing::error!(error = %err, "stripe webhook processing failed, returning 500 for retry");
			axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
	}
}
