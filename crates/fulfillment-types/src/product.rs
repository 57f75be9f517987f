//! Product catalog types (§3) — the source of the configured task graph
//! consulted by the fulfillment service at kickoff (§4.5.2/4.5.3).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
	Active,
	Draft,
	Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
	pub id: Uuid,
	pub slug: String,
	pub title: String,
	pub category: String,
	pub base_price: Decimal,
	pub currency: String,
	pub status: ProductStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fulfillment_config: Option<FulfillmentConfig>,
}

/// A product's declarative task graph, consulted before falling back to
/// category defaults (§4.5.2/4.5.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentConfig {
	pub tasks: Vec<ConfiguredTask>,
}

/// One entry of `fulfillmentConfig.tasks[]`.
///
/// `execution` and `payload` are stored as raw JSON because their shape is
/// provider/task-type specific and carries `{{ … }}` templates rendered at
/// task-execution time, not at materialization time (S2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredTask {
	#[serde(rename = "type")]
	pub task_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub execution: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schedule_offset_seconds: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schedule_offset_minutes: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schedule_offset_hours: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_retries: Option<i32>,
}
