//! Notification preference and delivery-record types (§3, §4.10).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Per-user opt-in/opt-out flags. Absence of a row defaults every flag to
/// `true` except `marketing_messages`, matching the original's
/// `_PreferenceSnapshot` defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
	pub user_id: Uuid,
	pub order_updates: bool,
	pub payment_updates: bool,
	pub fulfillment_alerts: bool,
	pub marketing_messages: bool,
	pub billing_alerts: bool,
}

impl Default for NotificationPreference {
	fn default() -> Self {
		Self {
			user_id: Uuid::nil(),
			order_updates: true,
			payment_updates: true,
			fulfillment_alerts: true,
			marketing_messages: false,
			billing_alerts: false,
		}
	}
}

/// The event kinds the dispatcher knows how to render (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
	OrderStatusUpdate,
	PaymentSuccess,
	FulfillmentRetry,
	FulfillmentCompletion,
}

impl NotificationKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			NotificationKind::OrderStatusUpdate => "order_status_update",
			NotificationKind::PaymentSuccess => "payment_success",
			NotificationKind::FulfillmentRetry => "fulfillment_retry",
			NotificationKind::FulfillmentCompletion => "fulfillment_completion",
		}
	}
}

/// A record of a notification that was (attempted to be) delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
	pub recipient: String,
	pub subject: String,
	pub text_body: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub html_body: Option<String>,
	pub event_type: String,
	#[serde(default)]
	pub metadata: Value,
}
