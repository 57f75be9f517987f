//! Provider catalog and provider-order types (§3, §4.3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An HTTP call descriptor as stored in `provider.metadataJson.automation.endpoints`.
///
/// Rendered through the template renderer (C2) before being dispatched by
/// the provider endpoint invoker (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
	#[serde(default = "default_method")]
	pub method: String,
	pub url: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub headers: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	/// Dotted path into the JSON response used to extract the provider's
	/// own order id (`providerOrderIdPath`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_seconds: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success_statuses: Option<Vec<u16>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success_status_min: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success_status_max: Option<u16>,
}

fn default_method() -> String {
	"POST".to_string()
}

/// Margin guardrail thresholds attached to a service's metadata.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Guardrails {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub minimum_margin_absolute: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub minimum_margin_percent: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub warning_margin_percent: Option<f64>,
}

/// A conditional override applied at provider-order creation time (§4.3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRule {
	pub id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub priority: Option<i64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub conditions: Vec<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub overrides: Option<Value>,
}

/// A registered external fulfillment connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentProvider {
	pub id: String,
	pub name: String,
	/// `automation.endpoints.{order,refill,balance,cancel}`.
	pub endpoints: std::collections::HashMap<String, EndpointDescriptor>,
	#[serde(default)]
	pub metadata: Value,
}

/// A service offered by a provider, carrying cost model and guardrails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentServiceCatalogEntry {
	pub id: String,
	pub provider_id: String,
	#[serde(default)]
	pub guardrails: Guardrails,
	#[serde(default)]
	pub metadata: Value,
}

/// One performed refill against an already-placed provider order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefillEntry {
	pub id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub amount: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub currency: Option<String>,
	pub performed_at: DateTime<Utc>,
	pub response: Value,
}

/// One replay of the provider `order` endpoint (§4.3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEntry {
	pub id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub requested_amount: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub currency: Option<String>,
	pub performed_at: DateTime<Utc>,
	pub status: String,
	pub response: Value,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub rule_ids: Vec<String>,
	#[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
	pub rule_metadata: std::collections::HashMap<String, Value>,
}

/// A replay scheduled for the future, drained by the scheduled-replay worker (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReplayEntry {
	pub id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub requested_amount: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub currency: Option<String>,
	pub scheduled_for: DateTime<Utc>,
	/// "scheduled" | "executed" | "failed". Writable exactly once away from "scheduled".
	pub status: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub rule_ids: Vec<String>,
	#[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
	pub rule_metadata: std::collections::HashMap<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// The opaque-ish JSON bag attached to a provider order, expressed as a
/// typed record per the §9 design note while remaining
/// serde-serializable to the same wire shape the original JSON bag used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOrderPayload {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_order_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_response: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_cost_amount: Option<f64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub refills: Vec<RefillEntry>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub replays: Vec<ReplayEntry>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub scheduled_replays: Vec<ScheduledReplayEntry>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub guardrails: Option<Guardrails>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub service_rules: Vec<ServiceRule>,
	/// Any additional scalar context captured at creation time, replayed
	/// verbatim into refill/replay invocation contexts (§4.3.4/4.3.5).
	#[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
	pub extra: std::collections::HashMap<String, Value>,
	/// The full rendering context built at provider-order creation time.
	/// An immediate replay (§4.3.5) re-invokes the `order` endpoint with
	/// this stored context rather than rebuilding it from the order/item,
	/// so a replay reflects exactly what was dispatched originally even if
	/// the order/item have since changed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub creation_context: Option<Value>,
}

/// The kind of run a `ProviderAutomationRun` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAutomationRunType {
	/// A scheduled-replay worker (C7) drain pass.
	Replay,
	/// A provider-alert / guardrail sweep.
	Alert,
}

/// A persisted record of one run of the scheduled-replay worker or the
/// provider-alert cron job. Per §9's design note, this table is the
/// durable source of truth; any in-memory status cache is rebuildable
/// from it and is never itself persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAutomationRun {
	pub id: Uuid,
	pub run_type: ProviderAutomationRunType,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub processed: i64,
	pub succeeded: i64,
	pub failed: i64,
	pub scheduled_backlog: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// One row per addon dispatched to a provider (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentProviderOrder {
	pub id: Uuid,
	pub provider_id: String,
	pub service_id: String,
	pub service_action: String,
	pub order_id: Uuid,
	pub order_item_id: Uuid,
	pub amount: Decimal,
	pub currency: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_name: Option<String>,
	pub payload: ProviderOrderPayload,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}
