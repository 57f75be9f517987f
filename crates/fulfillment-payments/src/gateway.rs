//! Hosted checkout session creation (§6 `POST /payments/checkout`):
//! loads the order with its items, builds one hosted-checkout line item
//! per item, delegates to the gateway, and seeds a pending `Payment`
//! row. The gateway call itself is behind a trait rather than a
//! concrete Stripe client: §1 names "a payment gateway client" as an
//! external collaborator interface this core consumes, not a component
//! it prescribes, mirroring the pluggable-backend shape
//! `fulfillment-notify` already uses for
//! `EmailBackend`/`SmsBackend`/`PushBackend`.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use fulfillment_types::{Order, OrderItem};

/// One hosted-checkout line item, derived from an `OrderItem` snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLineItem {
	pub product_title: String,
	pub unit_amount_cents: i64,
	pub currency: String,
	pub quantity: i64,
}

/// Inputs to a checkout session creation call.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest<'a> {
	pub order: &'a Order,
	pub line_items: Vec<CheckoutLineItem>,
	pub customer_email: Option<String>,
	pub success_url: String,
	pub cancel_url: String,
}

/// What the gateway hands back after creating a hosted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
	pub checkout_session_id: String,
	pub checkout_url: String,
}

/// Errors a gateway call can raise. Kept local rather than folded into
/// `DomainError::ProviderEndpoint` since a gateway failure here is
/// distinct from a fulfillment provider endpoint failure (§7's taxonomy
/// scopes `ProviderEndpointError` to C3/C4's provider automation calls).
#[derive(Debug, thiserror::Error)]
#[error("payment gateway error: {0}")]
pub struct GatewayError(pub String);

impl From<GatewayError> for fulfillment_types::DomainError {
	fn from(err: GatewayError) -> Self {
		fulfillment_types::DomainError::Transient(err.to_string())
	}
}

/// A payment provider's hosted-checkout API.
#[async_trait::async_trait]
pub trait PaymentGatewayClient: Send + Sync {
	async fn create_checkout_session(&self, request: CheckoutSessionRequest<'_>) -> Result<CheckoutSession, GatewayError>;
}

/// Converts order items into cents-denominated line items the gateway
/// speaks (`unit_amount_cents`), matching the original's
/// `Decimal * 100` rounded-half-up conversion.
pub fn line_items_for(order: &Order, items: &[OrderItem]) -> Vec<CheckoutLineItem> {
	items
		.iter()
		.map(|item| CheckoutLineItem {
			product_title: item.product_title.clone(),
			unit_amount_cents: (item.unit_price * rust_decimal::Decimal::from(100))
				.round()
				.to_i64()
				.unwrap_or(0),
			currency: order.currency.clone(),
			quantity: item.quantity,
		})
		.collect()
}

/// Test/offline double that fabricates a session id and echoes the
/// success URL as the checkout URL, the same role
/// `InMemoryEmailBackend` plays for notifications.
pub struct InMemoryGatewayClient;

#[async_trait::async_trait]
impl PaymentGatewayClient for InMemoryGatewayClient {
	async fn create_checkout_session(&self, request: CheckoutSessionRequest<'_>) -> Result<CheckoutSession, GatewayError> {
		let session_id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
		Ok(CheckoutSession { checkout_session_id: session_id, checkout_url: request.success_url.clone() })
	}
}
