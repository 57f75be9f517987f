//! Provider endpoint invocation (C3).
//!
//! Given an [`EndpointDescriptor`] (or any ad-hoc [`HttpCallSpec`]) and a
//! rendering context, renders every templated field through the template
//! renderer (C2), performs the HTTP call, and classifies the response
//! against the endpoint's success-status policy. The task processor (C6)
//! executes configured-task HTTP calls through the same [`HttpExecutor`]
//! so both surfaces share one success/timeout/preview policy.

use fulfillment_types::{DomainError, EndpointDescriptor};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Endpoint kinds carry different sane defaults for `timeoutSeconds`
/// (§4.2: "8-10 depending on endpoint kind").
pub const DEFAULT_ORDER_TIMEOUT_SECONDS: f64 = 10.0;
pub const DEFAULT_REFILL_TIMEOUT_SECONDS: f64 = 8.0;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 8.0;

const PREVIEW_MAX_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderEndpointError {
	#[error("provider endpoint error ({status:?}): {message}")]
	Endpoint { status: Option<u16>, message: String },
	#[error("{0}")]
	Template(#[from] fulfillment_template::TemplateError),
	#[error("request error: {0}")]
	Transport(String),
}

impl From<ProviderEndpointError> for DomainError {
	fn from(err: ProviderEndpointError) -> Self {
		match err {
			ProviderEndpointError::Endpoint { status, message } => DomainError::ProviderEndpoint { status, message },
			ProviderEndpointError::Template(e) => DomainError::Template(e.to_string()),
			ProviderEndpointError::Transport(message) => DomainError::Transient(message),
		}
	}
}

/// A fully-rendered HTTP call, independent of where its fields came from
/// (a provider's `EndpointDescriptor`, or a configured task's `execution`
/// block).
#[derive(Debug, Clone)]
pub struct HttpCallSpec {
	pub method: String,
	pub url: String,
	pub headers: Option<Value>,
	pub body: Option<Value>,
	pub timeout_seconds: f64,
	pub success_statuses: Option<Vec<u16>>,
	pub success_status_min: Option<u16>,
	pub success_status_max: Option<u16>,
}

/// The result of one HTTP call before success classification.
#[derive(Debug, Clone)]
pub struct HttpCallOutcome {
	pub status: u16,
	pub json: Option<Value>,
	pub text_preview: String,
}

/// Whether `status` satisfies an endpoint's success policy (§4.2):
/// `successStatuses[]` if present, else an inclusive `[min, max]` range,
/// else the default `200 <= s < 300`.
pub fn is_success_status(
	status: u16,
	success_statuses: Option<&[u16]>,
	success_status_min: Option<u16>,
	success_status_max: Option<u16>,
) -> bool {
	if let Some(statuses) = success_statuses {
		return statuses.contains(&status);
	}
	if success_status_min.is_some() || success_status_max.is_some() {
		let min = success_status_min.unwrap_or(200);
		let max = success_status_max.unwrap_or(299);
		return status >= min && status <= max;
	}
	(200..300).contains(&status)
}

/// Truncates `text` to at most 512 characters (§4.2 "response parsing").
pub fn truncate_preview(text: &str) -> String {
	if text.chars().count() > PREVIEW_MAX_CHARS {
		text.chars().take(PREVIEW_MAX_CHARS).collect()
	} else {
		text.to_string()
	}
}

/// Executes `HttpCallSpec`s over a shared `reqwest::Client`.
pub struct HttpExecutor {
	client: Client,
}

impl Default for HttpExecutor {
	fn default() -> Self {
		Self::new()
	}
}

impl HttpExecutor {
	pub fn new() -> Self {
		Self { client: Client::new() }
	}

	/// Performs the call. Only raises on a transport-level failure
	/// (connection refused, timeout, DNS); a non-2xx HTTP response is
	/// still returned as an `Ok(HttpCallOutcome)` for the caller to
	/// classify with [`is_success_status`].
	pub async fn execute(&self, spec: &HttpCallSpec) -> Result<HttpCallOutcome, ProviderEndpointError> {
		let method = Method::from_bytes(spec.method.to_uppercase().as_bytes())
			.map_err(|_| ProviderEndpointError::Transport(format!("invalid HTTP method `{}`", spec.method)))?;

		let mut request =
			self.client.request(method, &spec.url).timeout(Duration::from_secs_f64(spec.timeout_seconds));

		if let Some(Value::Object(headers)) = &spec.headers {
			for (key, value) in headers {
				if let Some(s) = value.as_str() {
					request = request.header(key.as_str(), s);
				}
			}
		}

		request = match &spec.body {
			Some(value @ (Value::Object(_) | Value::Array(_))) => request.json(value),
			Some(Value::String(s)) => request.body(s.clone()),
			Some(other) => request.body(other.to_string()),
			None => request,
		};

		let response = request.send().await.map_err(|e| ProviderEndpointError::Transport(e.to_string()))?;
		let status = response.status().as_u16();
		let body_bytes = response.bytes().await.map_err(|e| ProviderEndpointError::Transport(e.to_string()))?;
		let json = serde_json::from_slice::<Value>(&body_bytes).ok();
		let text_preview = truncate_preview(&String::from_utf8_lossy(&body_bytes));

		Ok(HttpCallOutcome { status, json, text_preview })
	}

	/// Executes `spec`, converting a non-success status into
	/// `ProviderEndpointError::Endpoint` with the truncated body preview.
	pub async fn execute_checked(&self, spec: &HttpCallSpec) -> Result<HttpCallOutcome, ProviderEndpointError> {
		let outcome = self.execute(spec).await?;
		if !is_success_status(
			outcome.status,
			spec.success_statuses.as_deref(),
			spec.success_status_min,
			spec.success_status_max,
		) {
			return Err(ProviderEndpointError::Endpoint {
				status: Some(outcome.status),
				message: outcome.text_preview,
			});
		}
		Ok(outcome)
	}
}

/// The outcome of invoking a provider's `EndpointDescriptor` (§4.2).
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
	pub status: u16,
	/// The parsed JSON response, or the truncated text preview wrapped as
	/// a JSON string when the body did not parse as JSON.
	pub response: Value,
	/// Extracted via `responsePath`, when the descriptor names one and the
	/// response is JSON.
	pub provider_order_id: Option<String>,
}

/// Renders an `EndpointDescriptor` against `context` (C2) and invokes it (C3).
pub struct ProviderEndpointInvoker {
	executor: HttpExecutor,
}

impl Default for ProviderEndpointInvoker {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderEndpointInvoker {
	pub fn new() -> Self {
		Self { executor: HttpExecutor::new() }
	}

	pub async fn invoke(
		&self,
		descriptor: &EndpointDescriptor,
		context: &Value,
	) -> Result<InvocationOutcome, ProviderEndpointError> {
		let method = fulfillment_template::render_string(&descriptor.method, context)?;

		let url_value = fulfillment_template::render(&descriptor.url, context)?;
		let url = url_value
			.as_str()
			.ok_or_else(|| ProviderEndpointError::Transport("endpoint url did not render to a string".to_string()))?
			.to_string();

		let headers = descriptor.headers.as_ref().map(|h| fulfillment_template::render(h, context)).transpose()?;
		let body = descriptor.payload.as_ref().map(|p| fulfillment_template::render(p, context)).transpose()?;

		let timeout_seconds = descriptor
			.timeout_seconds
			.or_else(|| context.get("timeoutSeconds").and_then(Value::as_f64))
			.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

		let spec = HttpCallSpec {
			method,
			url,
			headers,
			body,
			timeout_seconds,
			success_statuses: descriptor.success_statuses.clone(),
			success_status_min: descriptor.success_status_min,
			success_status_max: descriptor.success_status_max,
		};

		let outcome = self.executor.execute_checked(&spec).await?;

		let provider_order_id = descriptor.response_path.as_ref().and_then(|path| {
			outcome.json.as_ref().and_then(|json| fulfillment_template::resolve_context_path(json, path).ok())
		}).and_then(|value| match value {
			Value::String(s) => Some(s),
			Value::Number(n) => Some(n.to_string()),
			_ => None,
		});

		let response = outcome.json.unwrap_or_else(|| Value::String(outcome.text_preview));

		Ok(InvocationOutcome { status: outcome.status, response, provider_order_id })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn success_status_default_range() {
		assert!(is_success_status(200, None, None, None));
		assert!(is_success_status(299, None, None, None));
		assert!(!is_success_status(300, None, None, None));
		assert!(!is_success_status(199, None, None, None));
	}

	#[test]
	fn success_status_explicit_set_wins_over_range() {
		assert!(is_success_status(201, Some(&[201, 202]), Some(200), Some(299)));
		assert!(!is_success_status(404, Some(&[201, 202]), Some(200), Some(299)));
	}

	#[test]
	fn success_status_min_max_range() {
		assert!(is_success_status(404, None, Some(400), Some(499)));
		assert!(!is_success_status(500, None, Some(400), Some(499)));
	}

	#[test]
	fn preview_truncates_to_512_chars() {
		let long = "x".repeat(600);
		let preview = truncate_preview(&long);
		assert_eq!(preview.chars().count(), 512);
	}

	#[test]
	fn preview_keeps_short_text_verbatim() {
		assert_eq!(truncate_preview("ok"), "ok");
	}
}
