//! Notification Dispatcher (C11, §4.10): preference-gated, best-effort
//! delivery of the four notification kinds `fulfillment-core` and
//! `fulfillment-payments` raise, over pluggable email/SMS/push backends.
//!
//! Deliberately has no dependency on `fulfillment-core`: it implements its
//! own `dispatch(kind, recipient, context)` entry point, and
//! `fulfillment-service`'s composition root adapts it to
//! `fulfillment_core::NotificationDispatch` at startup, keeping both
//! crates' dependency edges one-directional (see DESIGN.md).

pub mod backend;
pub mod templates;

use std::sync::{Arc, Mutex};

use fulfillment_storage::Repositories;
use fulfillment_types::{NotificationEvent, NotificationKind};
use serde_json::Value;
use uuid::Uuid;

pub use backend::{EmailBackend, InMemoryEmailBackend, InMemoryPushBackend, InMemorySmsBackend, PushBackend, SmsBackend};

/// Whether `kind` is gated by the recipient's preference flag (§4.10):
/// `order_updates` gates status transitions, `payment_updates` gates
/// payment receipts, `fulfillment_alerts` gates task retry + completion.
fn is_enabled(kind: NotificationKind, preferences: &fulfillment_types::NotificationPreference) -> bool {
	match kind {
		NotificationKind::OrderStatusUpdate => preferences.order_updates,
		NotificationKind::PaymentSuccess => preferences.payment_updates,
		NotificationKind::FulfillmentRetry | NotificationKind::FulfillmentCompletion => preferences.fulfillment_alerts,
	}
}

fn render(kind: NotificationKind, context: &Value) -> templates::RenderedTemplate {
	match kind {
		NotificationKind::OrderStatusUpdate => templates::render_order_status_update(context),
		NotificationKind::PaymentSuccess => templates::render_payment_success(context),
		NotificationKind::FulfillmentRetry => templates::render_fulfillment_retry(context),
		NotificationKind::FulfillmentCompletion => templates::render_fulfillment_completion(context),
	}
}

/// Coordinates notification delivery via a pluggable email backend
/// (SMS/push are defined as backend traits per §4.10 but no notification
/// kind in this core's scope routes to them yet — every kind the
/// fulfillment/payment flow raises is an email-style order update).
pub struct NotificationDispatcher {
	repositories: Repositories,
	email: Arc<dyn EmailBackend>,
	events: Mutex<Vec<NotificationEvent>>,
}

impl NotificationDispatcher {
	pub fn new(repositories: Repositories, email: Arc<dyn EmailBackend>) -> Self {
		Self { repositories, email, events: Mutex::new(Vec::new()) }
	}

	/// Dispatches a best-effort notification (§4.10, §7: "notifications are
	/// best-effort — their failure is logged but never propagates to the
	/// caller"). A recipient with no stored preference row defaults to
	/// every flag enabled (`NotificationPreferenceRepository::get`).
	#[tracing::instrument(skip(self, context), fields(kind = kind.as_str(), recipient = %recipient))]
	pub async fn dispatch(&self, kind: NotificationKind, recipient: Uuid, context: Value) {
		let preferences = match self.repositories.notification_preferences.get(recipient).await {
			Ok(p) => p,
			Err(err) => {
				tracing::warn!(error = %err, "failed to load notification preferences, dropping notification");
				return;
			}
		};
		if !is_enabled(kind, &preferences) {
			tracing::debug!("notification suppressed by preference");
			return;
		}

		let rendered = render(kind, &context);
		let recipient_address = recipient.to_string();
		self.email.send_email(&recipient_address, &rendered.subject, &rendered.text_body, rendered.html_body.as_deref()).await;

		self.events.lock().unwrap().push(NotificationEvent {
			recipient: recipient_address,
			subject: rendered.subject,
			text_body: rendered.text_body,
			html_body: rendered.html_body,
			event_type: kind.as_str().to_string(),
			metadata: context,
		});
	}

	/// Every delivery attempted so far, for tests and the status endpoint.
	pub fn sent_events(&self) -> Vec<NotificationEvent> {
		self.events.lock().unwrap().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::NotificationPreference;
	use serde_json::json;

	fn repositories() -> Repositories {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		Repositories::new(storage)
	}

	#[tokio::test]
	async fn dispatch_delivers_when_no_preference_row_exists() {
		let repos = repositories();
		let backend = Arc::new(InMemoryEmailBackend::new());
		let dispatcher = NotificationDispatcher::new(repos, backend.clone());

		dispatcher
			.dispatch(NotificationKind::OrderStatusUpdate, Uuid::new_v4(), json!({"orderNumber": "SM000001", "status": "processing"}))
			.await;

		assert_eq!(backend.sent().len(), 1);
		assert_eq!(dispatcher.sent_events().len(), 1);
	}

	#[tokio::test]
	async fn dispatch_is_suppressed_when_preference_flag_is_off() {
		let repos = repositories();
		let user_id = Uuid::new_v4();
		repos
			.notification_preferences
			.upsert(&NotificationPreference { user_id, order_updates: false, ..Default::default() })
			.await
			.unwrap();
		let backend = Arc::new(InMemoryEmailBackend::new());
		let dispatcher = NotificationDispatcher::new(repos, backend.clone());

		dispatcher.dispatch(NotificationKind::OrderStatusUpdate, user_id, json!({"orderNumber": "SM000001"})).await;

		assert!(backend.sent().is_empty());
	}

	#[tokio::test]
	async fn marketing_opt_out_is_the_default() {
		let repos = repositories();
		let pref = repos.notification_preferences.get(Uuid::new_v4()).await.unwrap();
		assert!(!pref.marketing_messages);
		assert!(pref.order_updates);
	}
}
