//! Webhook dedup ledger types (§3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookProvider {
	Stripe,
}

/// A uniqueness row on `(provider, externalId)` that makes webhook
/// ingestion idempotent (§8: "business side effects run at most once").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
	pub id: Uuid,
	pub provider: WebhookProvider,
	pub external_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub event_type: Option<String>,
	pub processed_at: DateTime<Utc>,
}

/// Extends the webhook dedup concept with a payload-hash uniqueness axis
/// and replay bookkeeping, for providers whose events can recur with a
/// different external id but identical content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
	pub id: Uuid,
	pub provider: WebhookProvider,
	pub external_id: String,
	pub payload_hash: String,
	#[serde(default)]
	pub replay_requested: bool,
	#[serde(default)]
	pub replay_attempts: i32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_replay_error: Option<String>,
	pub processed_at: DateTime<Utc>,
}
