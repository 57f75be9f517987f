//! Payment record types (§3, §4.8).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Pending,
	Succeeded,
	Failed,
	Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
	Stripe,
	Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
	pub id: Uuid,
	pub order_id: Uuid,
	pub provider: PaymentProvider,
	/// The payment provider's reference id (e.g. a Stripe PaymentIntent id). Unique.
	pub provider_reference: String,
	pub status: PaymentStatus,
	pub amount: Decimal,
	pub currency: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure_reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub captured_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}
