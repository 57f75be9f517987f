//! The single-key admission check named in §1/§6: endpoints marked
//! "API-key gated" compare the `X-API-Key` header against
//! `AppConfig::checkout_api_key`. This is the entire extent of the
//! tenant/workspace RBAC surface this core implements (§1 Non-goals).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::server::AppState;

const HEADER_NAME: &str = "x-api-key";

pub async fn require_api_key(
	State(state): State<AppState>,
	headers: HeaderMap,
	request: axum::extract::Request,
	next: Next,
) -> Response {
	let provided = headers.get(HEADER_NAME).and_then(|v| v.to_str().ok());
	match provided {
		Some(key) if key == state.config.app.checkout_api_key => next.run(request).await,
		_ => (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"detail": "invalid or missing X-API-Key"}))).into_response(),
	}
}
