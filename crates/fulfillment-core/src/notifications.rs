//! The notification boundary `fulfillment-core` dispatches through.
//!
//! `fulfillment-core` knows *when* a notification-worthy event happens
//! (order transitioned, task retried, fulfillment completed) but not how
//! to render or deliver it — that belongs to the notification dispatcher
//! (C11, in `fulfillment-notify`), which depends on `fulfillment-types`
//! the same way `fulfillment-core` does but never the reverse. A trait
//! object at this seam keeps the dependency edge one-directional.

use fulfillment_types::NotificationKind;
use serde_json::Value;
use uuid::Uuid;

/// Dispatches a best-effort notification. Implementations must never
/// propagate a delivery failure to the caller (§4.10, §7) — preference
/// lookups and backend calls are the dispatcher's problem, not the
/// caller's.
#[async_trait::async_trait]
pub trait NotificationDispatch: Send + Sync {
	async fn dispatch(&self, kind: NotificationKind, recipient: Uuid, context: Value);
}

/// A dispatcher that drops every notification. Used when a caller has no
/// recipient to notify, or in tests that don't exercise notification
/// delivery.
pub struct NullNotificationDispatch;

#[async_trait::async_trait]
impl NotificationDispatch for NullNotificationDispatch {
	async fn dispatch(&self, _kind: NotificationKind, _recipient: Uuid, _context: Value) {}
}
