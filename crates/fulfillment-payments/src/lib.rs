//! Payment Ingestion (C9, §4.8): idempotent Stripe webhook consumption
//! that updates `Payment` records, nudges the order state machine, and
//! kicks off fulfillment on first success. Dispatches by event type,
//! dedupes before committing, and treats a status update as idempotent
//! in its own right; signature verification is delegated to [`signature`].
//!
//! Deliberately depends on `fulfillment-core` (for `OrderStateMachine`
//! and `FulfillmentService`) rather than the other way around — payment
//! ingestion is a consumer of the fulfillment core, not a dependency of
//! it.

pub mod gateway;
pub mod signature;

use std::sync::Arc;

use chrono::Utc;
use fulfillment_core::{FulfillmentService, NotificationDispatch, OrderStateMachine, TransitionActor};
use fulfillment_storage::Repositories;
use fulfillment_types::{
	DomainError, NotificationKind, OrderStateActorType, OrderStatus, Payment, PaymentProvider, PaymentStatus,
	WebhookEvent, WebhookProvider,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

pub use gateway::{CheckoutSession, GatewayError, PaymentGatewayClient};

const UNKNOWN_ERROR: &str = "Unknown error";

/// The subset of a Stripe event envelope this core cares about:
/// `{id, type, data: {object: {...}}}`.
struct StripeEvent<'a> {
	id: &'a str,
	event_type: &'a str,
	object: &'a Value,
}

fn parse_event(event: &Value) -> Result<StripeEvent<'_>, DomainError> {
	let id = event.get("id").and_then(Value::as_str).ok_or_else(|| DomainError::Validation("missing event id".into()))?;
	let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
	let object = event
		.get("data")
		.and_then(|d| d.get("object"))
		.ok_or_else(|| DomainError::Validation("missing event data.object".into()))?;
	Ok(StripeEvent { id, event_type, object })
}

/// Builds a context bag for notification templates (§4.10 renders off a
/// flat JSON context rather than typed rows).
fn order_notification_context(order: &fulfillment_types::Order) -> Value {
	json!({
		"orderNumber": order.order_number,
		"status": order.status.as_str(),
	})
}

/// Consumes Stripe webhooks. One instance per process, shared across API
/// handlers.
pub struct PaymentIngestionService {
	repositories: Repositories,
	state_machine: Arc<OrderStateMachine>,
	fulfillment: Arc<FulfillmentService>,
	notifications: Arc<dyn NotificationDispatch>,
	webhook_secret: String,
}

impl PaymentIngestionService {
	pub fn new(
		repositories: Repositories,
		state_machine: Arc<OrderStateMachine>,
		fulfillment: Arc<FulfillmentService>,
		notifications: Arc<dyn NotificationDispatch>,
		webhook_secret: String,
	) -> Self {
		Self { repositories, state_machine, fulfillment, notifications, webhook_secret }
	}

	/// Full webhook ingestion pipeline (§4.8 steps 1-5). `now` is injected
	/// so signature tolerance windows are testable; callers outside tests
	/// pass `Utc::now().timestamp()`.
	#[tracing::instrument(skip(self, payload, signature_header), fields(provider = "stripe"))]
	pub async fn ingest_stripe_webhook(
		&self,
		payload: &[u8],
		signature_header: &str,
		now: i64,
	) -> Result<(), DomainError> {
		signature::verify(payload, signature_header, &self.webhook_secret, now, signature::DEFAULT_TOLERANCE_SECONDS)
			.map_err(|err| DomainError::Auth(format!("stripe signature verification failed: {err}")))?;

		let event: Value = serde_json::from_slice(payload).map_err(|err| DomainError::Validation(format!("invalid webhook payload: {err}")))?;
		let parsed = parse_event(&event)?;

		if self.repositories.webhooks.find(WebhookProvider::Stripe, parsed.id).await?.is_some() {
			tracing::info!(event_id = parsed.id, event_type = parsed.event_type, "ignoring duplicate stripe webhook");
			return Ok(());
		}

		match parsed.event_type {
			"payment_intent.succeeded" => self.handle_payment_succeeded(parsed.object).await?,
			"payment_intent.payment_failed" => self.handle_payment_failed(parsed.object).await?,
			"checkout.session.completed" => {
				tracing::info!(event_id = parsed.id, "checkout session completed, order already linked via metadata");
			}
			other => {
				tracing::info!(event_id = parsed.id, event_type = other, "received unhandled stripe webhook event type");
			}
		}

		self.repositories
			.webhooks
			.insert(&WebhookEvent {
				id: Uuid::new_v4(),
				provider: WebhookProvider::Stripe,
				external_id: parsed.id.to_string(),
				event_type: Some(parsed.event_type.to_string()),
				processed_at: Utc::now(),
			})
			.await?;

		Ok(())
	}

	/// `payment_intent.succeeded` (§4.8 step 4, first bullet).
	async fn handle_payment_succeeded(&self, payment_intent: &Value) -> Result<(), DomainError> {
		let provider_reference =
			payment_intent.get("id").and_then(Value::as_str).ok_or_else(|| DomainError::Validation("payment_intent missing id".into()))?;

		let existing = self.repositories.payments.get_by_reference(provider_reference).await?;
		let previously_succeeded = existing.as_ref().is_some_and(|p| p.status == PaymentStatus::Succeeded);

		let payment = match existing {
			Some(mut payment) => {
				if payment.status == PaymentStatus::Succeeded {
					// Idempotent no-op commit (§4.8 step 4: "status updates are
					// themselves idempotent regardless of dedup").
					return Ok(());
				}
				payment.status = PaymentStatus::Succeeded;
				payment.captured_at = Some(Utc::now());
				payment.updated_at = Utc::now();
				self.repositories.payments.update(&payment).await?;
				payment
			}
			None => {
				tracing::warn!(provider_reference, "payment_intent.succeeded for unknown provider_reference, recording orphan payment is skipped");
				return Ok(());
			}
		};

		if previously_succeeded {
			return Ok(());
		}

		let order = self.repositories.orders.get(payment.order_id).await?;
		if let Some(user_id) = order.user_id {
			self.notifications
				.dispatch(
					NotificationKind::PaymentSuccess,
					user_id,
					json!({"orderNumber": order.order_number, "amount": payment.amount, "currency": payment.currency}),
				)
				.await;
		}

		// Best-effort: a failure here must not fail the webhook response, the
		// payment update and dedup row are already durably committed (§4.8 step 5).
		if let Err(err) = self.fulfillment.process_order_fulfillment(payment.order_id).await {
			tracing::error!(order_id = %payment.order_id, error = %err, "fulfillment kickoff failed after payment success");
		}

		Ok(())
	}

	/// `payment_intent.payment_failed` (§4.8 step 4, second bullet).
	///
	/// `on_hold` is not reachable from `pending` in the order state
	/// machine's transition table, so when the order is still `pending`
	/// (payment failed before fulfillment ever started) the transition
	/// attempt is rejected; the failure note is still appended and the
	/// notification still sent regardless of whether the transition
	/// succeeded. Documented as an Open Question decision in DESIGN.md.
	async fn handle_payment_failed(&self, payment_intent: &Value) -> Result<(), DomainError> {
		let provider_reference =
			payment_intent.get("id").and_then(Value::as_str).ok_or_else(|| DomainError::Validation("payment_intent missing id".into()))?;
		let failure_reason = payment_intent
			.get("last_payment_error")
			.and_then(|e| e.get("message"))
			.and_then(Value::as_str)
			.unwrap_or(UNKNOWN_ERROR)
			.to_string();

		let mut payment = match self.repositories.payments.get_by_reference(provider_reference).await? {
			Some(payment) => payment,
			None => {
				tracing::warn!(provider_reference, "payment_intent.payment_failed for unknown provider_reference");
				return Ok(());
			}
		};
		payment.status = PaymentStatus::Failed;
		payment.failure_reason = Some(failure_reason.clone());
		payment.updated_at = Utc::now();
		self.repositories.payments.update(&payment).await?;

		let mut order = self.repositories.orders.get(payment.order_id).await?;
		if order.status == OrderStatus::Canceled || order.status == OrderStatus::Completed {
			return Ok(());
		}

		order.append_note(&format!("Payment failure: {failure_reason}"));
		self.repositories.orders.update(&order).await?;

		if let Err(err) = self
			.state_machine
			.transition(
				order.id,
				OrderStatus::OnHold,
				TransitionActor {
					actor_type: Some(OrderStateActorType::System),
					notes: Some(format!("Payment failure: {failure_reason}")),
					..Default::default()
				},
			)
			.await
		{
			tracing::warn!(order_id = %order.id, error = %err, "could not move order to on_hold after payment failure");
		}

		let order = self.repositories.orders.get(order.id).await?;
		if let Some(user_id) = order.user_id {
			self.notifications.dispatch(NotificationKind::OrderStatusUpdate, user_id, order_notification_context(&order)).await;
		}

		Ok(())
	}
}

/// `POST /payments/checkout` (§6): loads the order and its items, builds
/// one hosted-checkout line item per item, asks the gateway for a
/// session, and seeds a `Pending` payment row keyed by the gateway's
/// session id so the eventual `payment_intent.succeeded` webhook has a
/// `provider_reference` to dedupe and update against.
pub async fn create_checkout_session(
	repositories: &Repositories,
	gateway: &dyn PaymentGatewayClient,
	order_id: Uuid,
	customer_email: Option<String>,
	success_url: String,
	cancel_url: String,
) -> Result<(CheckoutSession, Payment), DomainError> {
	let order = repositories.orders.get(order_id).await?;
	let items = repositories.order_items.list_by_order(order_id).await?;
	if items.is_empty() {
		return Err(DomainError::Validation("order has no items".to_string()));
	}

	let line_items = gateway::line_items_for(&order, &items);
	let session = gateway
		.create_checkout_session(gateway::CheckoutSessionRequest {
			order: &order,
			line_items,
			customer_email,
			success_url,
			cancel_url,
		})
		.await?;

	let payment = new_pending_payment(order.id, order.total, &order.currency, &session.checkout_session_id);
	repositories.payments.insert(&payment).await?;

	Ok((session, payment))
}

/// Used by the checkout flow (outside C9's webhook scope but sharing the
/// same `Payment` record shape) to seed a `Pending` payment row before the
/// provider's webhook arrives.
pub fn new_pending_payment(order_id: Uuid, amount: Decimal, currency: &str, provider_reference: &str) -> Payment {
	let now = Utc::now();
	Payment {
		id: Uuid::new_v4(),
		order_id,
		provider: PaymentProvider::Stripe,
		provider_reference: provider_reference.to_string(),
		status: PaymentStatus::Pending,
		amount,
		currency: currency.to_string(),
		failure_reason: None,
		captured_at: None,
		created_at: now,
		updated_at: now,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_automation::ProviderAutomationService;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::OrderSource;

	fn repositories() -> Repositories {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		Repositories::new(storage)
	}

	fn order(status: OrderStatus) -> fulfillment_types::Order {
		let now = Utc::now();
		fulfillment_types::Order {
			id: Uuid::new_v4(),
			order_number: "SM000001".to_string(),
			user_id: Some(Uuid::new_v4()),
			status,
			source: OrderSource::Checkout,
			currency: "USD".to_string(),
			subtotal: Decimal::new(10000, 2),
			tax: Decimal::ZERO,
			total: Decimal::new(10000, 2),
			notes: None,
			items: vec![],
			created_at: now,
			updated_at: now,
		}
	}

	fn service(repos: Repositories) -> PaymentIngestionService {
		let state_machine = fulfillment_core::shared_state_machine(repos.clone());
		let automation = Arc::new(ProviderAutomationService::new(repos.clone()));
		let fulfillment = Arc::new(FulfillmentService::new(
			repos.clone(),
			state_machine.clone(),
			automation,
			Arc::new(fulfillment_core::NullNotificationDispatch),
		));
		PaymentIngestionService::new(
			repos,
			state_machine,
			fulfillment,
			Arc::new(fulfillment_core::NullNotificationDispatch),
			"whsec_test".to_string(),
		)
	}

	fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
		use hmac::{Hmac, Mac};
		use sha2::Sha256;
		let signed_payload = format!("{timestamp}.");
		let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
		mac.update(signed_payload.as_bytes());
		mac.update(payload);
		format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
	}

	#[tokio::test]
	async fn payment_failed_sets_on_hold_and_appends_note_from_processing() {
		let repos = repositories();
		let order = order(OrderStatus::Processing);
		repos.orders.insert(&order).await.unwrap();
		repos.payments.insert(&new_pending_payment(order.id, Decimal::new(2000, 2), "USD", "pi_123")).await.unwrap();
		let mut payment = repos.payments.get_by_reference("pi_123").await.unwrap().unwrap();
		payment.status = PaymentStatus::Succeeded;

		let svc = service(repos.clone());
		let now = 1_700_000_000;
		let payload = serde_json::to_vec(&json!({
			"id": "evt_1",
			"type": "payment_intent.payment_failed",
			"data": {"object": {"id": "pi_123", "last_payment_error": {"message": "card declined"}}}
		}))
		.unwrap();
		let header = sign(&payload, "whsec_test", now);

		svc.ingest_stripe_webhook(&payload, &header, now).await.unwrap();

		let stored_order = repos.orders.get(order.id).await.unwrap();
		assert_eq!(stored_order.status, OrderStatus::OnHold);
		assert_eq!(stored_order.notes.as_deref(), Some("Payment failure: card declined"));
		let stored_payment = repos.payments.get_by_reference("pi_123").await.unwrap().unwrap();
		assert_eq!(stored_payment.status, PaymentStatus::Failed);
		assert_eq!(stored_payment.failure_reason.as_deref(), Some("card declined"));
	}

	#[tokio::test]
	async fn payment_failed_from_pending_still_appends_note_when_transition_is_rejected() {
		let repos = repositories();
		let order = order(OrderStatus::Pending);
		repos.orders.insert(&order).await.unwrap();
		repos.payments.insert(&new_pending_payment(order.id, Decimal::new(2000, 2), "USD", "pi_456")).await.unwrap();

		let svc = service(repos.clone());
		let now = 1_700_000_000;
		let payload = serde_json::to_vec(&json!({
			"id": "evt_2",
			"type": "payment_intent.payment_failed",
			"data": {"object": {"id": "pi_456"}}
		}))
		.unwrap();
		let header = sign(&payload, "whsec_test", now);

		svc.ingest_stripe_webhook(&payload, &header, now).await.unwrap();

		let stored_order = repos.orders.get(order.id).await.unwrap();
		// pending -> on_hold is not a valid transition, so status is unchanged...
		assert_eq!(stored_order.status, OrderStatus::Pending);
		// ...but the note is appended regardless (falls back to "Unknown error").
		assert_eq!(stored_order.notes.as_deref(), Some("Payment failure: Unknown error"));
	}

	#[tokio::test]
	async fn duplicate_webhook_is_a_no_op() {
		let repos = repositories();
		let order = order(OrderStatus::Pending);
		repos.orders.insert(&order).await.unwrap();
		repos.payments.insert(&new_pending_payment(order.id, Decimal::new(2000, 2), "USD", "pi_789")).await.unwrap();

		let svc = service(repos.clone());
		let now = 1_700_000_000;
		let payload = serde_json::to_vec(&json!({
			"id": "evt_3",
			"type": "payment_intent.succeeded",
			"data": {"object": {"id": "pi_789", "amount_received": 2000}}
		}))
		.unwrap();
		let header = sign(&payload, "whsec_test", now);

		svc.ingest_stripe_webhook(&payload, &header, now).await.unwrap();
		let first_updated_at = repos.payments.get_by_reference("pi_789").await.unwrap().unwrap().updated_at;
		svc.ingest_stripe_webhook(&payload, &header, now).await.unwrap();

		let stored_payment = repos.payments.get_by_reference("pi_789").await.unwrap().unwrap();
		assert_eq!(stored_payment.status, PaymentStatus::Succeeded);
		// second delivery short-circuits on the dedup ledger: payment is untouched.
		assert_eq!(stored_payment.updated_at, first_updated_at);
	}

	#[tokio::test]
	async fn checkout_session_seeds_a_pending_payment() {
		let repos = repositories();
		let order = order(OrderStatus::Pending);
		repos.orders.insert(&order).await.unwrap();
		let item = fulfillment_types::OrderItem {
			id: Uuid::new_v4(),
			order_id: order.id,
			product_id: None,
			product_title: "Instagram Growth".to_string(),
			quantity: 2,
			unit_price: Decimal::new(5000, 2),
			total_price: Decimal::new(10000, 2),
			add_ons: vec![],
			attributes: None,
			platform_context: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		repos.order_items.insert(&item).await.unwrap();

		let gateway = gateway::InMemoryGatewayClient;
		let (session, payment) = create_checkout_session(
			&repos,
			&gateway,
			order.id,
			Some("buyer@example.com".to_string()),
			"https://app.example.com/success".to_string(),
			"https://app.example.com/cancel".to_string(),
		)
		.await
		.unwrap();

		assert_eq!(session.checkout_url, "https://app.example.com/success");
		assert_eq!(payment.status, PaymentStatus::Pending);
		assert_eq!(payment.provider_reference, session.checkout_session_id);
		let stored = repos.payments.get_by_reference(&session.checkout_session_id).await.unwrap();
		assert!(stored.is_some());
	}

	#[tokio::test]
	async fn checkout_session_rejects_order_with_no_items() {
		let repos = repositories();
		let order = order(OrderStatus::Pending);
		repos.orders.insert(&order).await.unwrap();

		let gateway = gateway::InMemoryGatewayClient;
		let result = create_checkout_session(
			&repos,
			&gateway,
			order.id,
			None,
			"https://app.example.com/success".to_string(),
			"https://app.example.com/cancel".to_string(),
		)
		.await;

		assert!(matches!(result, Err(DomainError::Validation(_))));
	}
}
