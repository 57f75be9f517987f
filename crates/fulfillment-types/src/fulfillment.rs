//! Fulfillment task types — the unit of work the task processor (C6) drains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentTaskStatus {
	Pending,
	InProgress,
	Completed,
	Failed,
	Cancelled,
}

/// Known task categories. Instagram kickoff emits the first four;
/// `ContentPromotion` is the generic fallback; `CampaignOptimization` only
/// appears from a product's configured task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentTaskType {
	InstagramSetup,
	FollowerGrowth,
	EngagementBoost,
	ContentPromotion,
	AnalyticsCollection,
	CampaignOptimization,
}

impl FulfillmentTaskType {
	pub fn as_str(&self) -> &'static str {
		match self {
			FulfillmentTaskType::InstagramSetup => "instagram_setup",
			FulfillmentTaskType::FollowerGrowth => "follower_growth",
			FulfillmentTaskType::EngagementBoost => "engagement_boost",
			FulfillmentTaskType::ContentPromotion => "content_promotion",
			FulfillmentTaskType::AnalyticsCollection => "analytics_collection",
			FulfillmentTaskType::CampaignOptimization => "campaign_optimization",
		}
	}
}

impl std::str::FromStr for FulfillmentTaskType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"instagram_setup" => Ok(FulfillmentTaskType::InstagramSetup),
			"follower_growth" => Ok(FulfillmentTaskType::FollowerGrowth),
			"engagement_boost" => Ok(FulfillmentTaskType::EngagementBoost),
			"content_promotion" => Ok(FulfillmentTaskType::ContentPromotion),
			"analytics_collection" => Ok(FulfillmentTaskType::AnalyticsCollection),
			"campaign_optimization" => Ok(FulfillmentTaskType::CampaignOptimization),
			other => Err(format!("unknown fulfillment task type: {other}")),
		}
	}
}

/// A unit of work materialized against one order item.
///
/// `payload` holds `execution` (for templated/configured tasks) and
/// `context` (the frozen rendering context, per S2). `result` holds
/// whatever the handler or HTTP execution produced, including the
/// `deadLetter: true` marker (§8 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentTask {
	pub id: Uuid,
	pub order_item_id: Uuid,
	pub task_type: FulfillmentTaskType,
	pub status: FulfillmentTaskStatus,
	pub title: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	pub retry_count: i32,
	pub max_retries: i32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scheduled_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub started_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl FulfillmentTask {
	/// `result.deadLetter == true`, the fence the §8 invariant checks against.
	pub fn is_dead_lettered(&self) -> bool {
		self.result
			.as_ref()
			.and_then(|v| v.get("deadLetter"))
			.and_then(|v| v.as_bool())
			.unwrap_or(false)
	}
}
