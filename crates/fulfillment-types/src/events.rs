//! Event-bus types for inter-worker communication within one process.
//!
//! A single top-level enum nesting per-domain event payloads, broadcast to
//! every worker subscribed to `fulfillment-core`'s event bus.

use serde_json::Value;
use uuid::Uuid;

/// Events raised while materializing or updating an order's fulfillment tasks.
#[derive(Debug, Clone)]
pub enum FulfillmentTaskEvent {
	/// Emitted once kickoff has materialized every task for an order.
	Materialized { order_id: Uuid, task_count: usize },
	/// Emitted when a task transitions to `completed` or `failed`.
	StatusChanged { order_id: Uuid, task_id: Uuid, status: &'static str },
}

/// Events raised by the payment ingestion webhook handler (C9).
#[derive(Debug, Clone)]
pub enum PaymentEvent {
	Succeeded { order_id: Uuid, payment_id: Uuid },
	Failed { order_id: Uuid, payment_id: Uuid, reason: Option<String> },
}

/// Events raised by the provider automation service (C4) and the
/// scheduled-replay worker (C7).
#[derive(Debug, Clone)]
pub enum AutomationEvent {
	ProviderOrderCreated { provider_order_id: Uuid },
	ReplayExecuted { provider_order_id: Uuid, entry_id: String },
	ReplayFailed { provider_order_id: Uuid, entry_id: String, error: String },
	GuardrailBreach { provider_order_id: Uuid, status: &'static str, context: Value },
}

/// Top-level event-bus envelope broadcast across workers.
#[derive(Debug, Clone)]
pub enum FulfillmentEvent {
	Task(FulfillmentTaskEvent),
	Payment(PaymentEvent),
	Automation(AutomationEvent),
}
