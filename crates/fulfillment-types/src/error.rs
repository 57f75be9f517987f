//! Cross-crate error taxonomy.
//!
//! Every component in the core surfaces failures as one of these tagged
//! kinds rather than letting a storage- or HTTP-library-specific error type
//! leak across a crate boundary. `fulfillment-service` maps each kind onto
//! an HTTP status; the task processor and cron scheduler use the kind to
//! decide whether a failure is retryable.

use thiserror::Error;

/// The eight dispositions every failure in the core is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Bad input: unknown currency, invalid status, missing product. Never retried.
	Validation,
	/// Entity missing.
	NotFound,
	/// Missing/wrong API key or webhook signature.
	Auth,
	/// Idempotency dedup or version mismatch.
	Conflict,
	/// Upstream HTTP failure from a provider endpoint.
	ProviderEndpoint,
	/// Missing context key or invalid template expression.
	Template,
	/// DB deadlock, network reset — retried with backoff.
	Transient,
	/// Unreachable DB, missing config — propagates to the supervisor.
	Fatal,
}

/// A domain error carrying its disposition kind.
///
/// Per-crate error enums (`StorageError`, `ProviderEndpointError`, …)
/// implement `From<X> for DomainError` so callers at a crate boundary can
/// convert with `?` without knowing the originating crate's error type.
#[derive(Debug, Error)]
pub enum DomainError {
	#[error("{0}")]
	Validation(String),
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	Auth(String),
	#[error("{0}")]
	Conflict(String),
	#[error("provider endpoint error ({status:?}): {message}")]
	ProviderEndpoint { status: Option<u16>, message: String },
	#[error("{0}")]
	Template(String),
	#[error("{0}")]
	Transient(String),
	#[error("{0}")]
	Fatal(String),
}

impl DomainError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			DomainError::Validation(_) => ErrorKind::Validation,
			DomainError::NotFound(_) => ErrorKind::NotFound,
			DomainError::Auth(_) => ErrorKind::Auth,
			DomainError::Conflict(_) => ErrorKind::Conflict,
			DomainError::ProviderEndpoint { .. } => ErrorKind::ProviderEndpoint,
			DomainError::Template(_) => ErrorKind::Template,
			DomainError::Transient(_) => ErrorKind::Transient,
			DomainError::Fatal(_) => ErrorKind::Fatal,
		}
	}

	/// Whether a caller implementing retry-with-backoff should retry this error.
	pub fn is_retryable(&self) -> bool {
		matches!(self.kind(), ErrorKind::Transient | ErrorKind::ProviderEndpoint)
	}

	/// HTTP status this error maps onto at the API boundary (§7).
	#[cfg(feature = "axum")]
	fn status_code(&self) -> axum::http::StatusCode {
		use axum::http::StatusCode;
		match self.kind() {
			ErrorKind::Validation => StatusCode::BAD_REQUEST,
			ErrorKind::NotFound => StatusCode::NOT_FOUND,
			ErrorKind::Auth => StatusCode::UNAUTHORIZED,
			ErrorKind::Conflict => StatusCode::CONFLICT,
			ErrorKind::ProviderEndpoint => StatusCode::BAD_GATEWAY,
			ErrorKind::Template => StatusCode::INTERNAL_SERVER_ERROR,
			ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
			ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// API error body (§7: "API returns `{detail: <string>}` with an HTTP status").
#[cfg(feature = "axum")]
#[derive(serde::Serialize)]
struct ErrorDetail {
	detail: String,
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for DomainError {
	fn into_response(self) -> axum::response::Response {
		use axum::response::IntoResponse as _;
		let status = self.status_code();
		let body = ErrorDetail { detail: self.to_string() };
		(status, axum::Json(body)).into_response()
	}
}
