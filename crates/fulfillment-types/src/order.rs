//! Order and order-item types, plus the append-only state-event log (§3, §4.7).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of an order. Transitions are enforced by
/// `fulfillment-core`'s order state machine (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Pending,
	Processing,
	Active,
	Completed,
	OnHold,
	Canceled,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Processing => "processing",
			OrderStatus::Active => "active",
			OrderStatus::Completed => "completed",
			OrderStatus::OnHold => "on_hold",
			OrderStatus::Canceled => "canceled",
		}
	}
}

impl std::str::FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(OrderStatus::Pending),
			"processing" => Ok(OrderStatus::Processing),
			"active" => Ok(OrderStatus::Active),
			"completed" => Ok(OrderStatus::Completed),
			"on_hold" => Ok(OrderStatus::OnHold),
			"canceled" => Ok(OrderStatus::Canceled),
			other => Err(format!("unknown order status: {other}")),
		}
	}
}

/// How the order was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
	Checkout,
	Manual,
}

impl std::str::FromStr for OrderSource {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"checkout" => Ok(OrderSource::Checkout),
			"manual" => Ok(OrderSource::Manual),
			other => Err(format!("unknown order source: {other}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	pub id: Uuid,
	pub order_number: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Uuid>,
	pub status: OrderStatus,
	pub source: OrderSource,
	pub currency: String,
	pub subtotal: Decimal,
	pub tax: Decimal,
	pub total: Decimal,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	#[serde(default)]
	pub items: Vec<OrderItem>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Appends a failure note the way `_mark_order_on_payment_failure` does:
	/// newline-joined with any existing notes, skipping blank segments.
	pub fn append_note(&mut self, note: &str) {
		let existing = self.notes.as_deref().unwrap_or("").trim().to_string();
		let joined: Vec<&str> = [existing.as_str(), note].iter().copied().filter(|s| !s.is_empty()).collect();
		self.notes = Some(joined.join("\n"));
	}
}

/// A single add-on priced against an external provider service.
///
/// Carries everything `provider_automation_service` needs to create a
/// `FulfillmentProviderOrder`: which provider/service to target, the
/// customer price delta, the provider's own cost (for guardrail
/// evaluation), and any service-rule overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOn {
	pub pricing_mode: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub service_id: Option<String>,
	pub price_delta: Decimal,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub service_provider_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_cost_amount: Option<Decimal>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub service_rules: Vec<crate::provider::ServiceRule>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payload_template: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub preview_quantity: Option<i64>,
}

impl AddOn {
	pub fn is_service_override(&self) -> bool {
		self.pricing_mode == "serviceOverride" && self.service_id.is_some()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
	pub id: Uuid,
	pub order_id: Uuid,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub product_id: Option<Uuid>,
	pub product_title: String,
	pub quantity: i64,
	pub unit_price: Decimal,
	pub total_price: Decimal,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub add_ons: Vec<AddOn>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub attributes: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub platform_context: Option<Value>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Category of event recorded against an order's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStateEventType {
	StateChange,
	Note,
	RefillRequested,
	RefillCompleted,
	RefundRequested,
	RefundCompleted,
	ReplayScheduled,
	ReplayExecuted,
	AutomationAlert,
}

/// Identity of the actor emitting an order state event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStateActorType {
	System,
	Operator,
	Admin,
	Automation,
	Provider,
}

/// Append-only audit-log entry. Never mutated once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStateEvent {
	pub id: Uuid,
	pub order_id: Uuid,
	pub event_type: OrderStateEventType,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub actor_type: Option<OrderStateActorType>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub actor_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub actor_label: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub from_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub to_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	#[serde(default)]
	pub metadata: Value,
	pub created_at: DateTime<Utc>,
}
