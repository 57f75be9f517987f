//! Order lifecycle state machine (C8, §4.7).
//!
//! Allowed transitions form a DAG, not a strict linear chain. `canceled`
//! is terminal and never transitioned out of; `completed` is reachable
//! from `active`, `processing`, or `on_hold` and is itself terminal (the
//! order's successful end state). A transition outside the table is
//! rejected before anything is persisted — the order update and its
//! audit event are one atomic unit of work. Once a transition is
//! accepted and the order is persisted, a failure to append the audit
//! event is logged but never unwinds the transition (§4.7: "audit
//! failure logs but never aborts the caller").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use fulfillment_storage::Repositories;
use fulfillment_types::{DomainError, Order, OrderStateActorType, OrderStateEvent, OrderStateEventType, OrderStatus};
use once_cell::sync::Lazy;
use uuid::Uuid;

static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(OrderStatus::Pending, HashSet::from([OrderStatus::Processing, OrderStatus::Canceled]));
	m.insert(
		OrderStatus::Processing,
		HashSet::from([OrderStatus::Active, OrderStatus::OnHold, OrderStatus::Completed, OrderStatus::Canceled]),
	);
	m.insert(
		OrderStatus::Active,
		HashSet::from([OrderStatus::Completed, OrderStatus::OnHold, OrderStatus::Canceled]),
	);
	m.insert(
		OrderStatus::OnHold,
		HashSet::from([OrderStatus::Active, OrderStatus::Processing, OrderStatus::Completed, OrderStatus::Canceled]),
	);
	m.insert(OrderStatus::Completed, HashSet::new());
	m.insert(OrderStatus::Canceled, HashSet::new());
	m
});

fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	TRANSITIONS.get(&from).is_some_and(|allowed| allowed.contains(&to))
}

/// Parameters describing who requested a transition, for the audit event.
#[derive(Debug, Clone, Default)]
pub struct TransitionActor {
	pub actor_type: Option<OrderStateActorType>,
	pub actor_id: Option<String>,
	pub actor_label: Option<String>,
	pub notes: Option<String>,
}

pub struct OrderStateMachine {
	repositories: Repositories,
}

impl OrderStateMachine {
	pub fn new(repositories: Repositories) -> Self {
		Self { repositories }
	}

	/// Transitions `order_id` to `to`, rejecting the request outright (no
	/// storage mutation, no event) if `(from, to)` is not in the allowed
	/// table.
	#[tracing::instrument(skip(self, actor), fields(order_id = %order_id, to = to.as_str()))]
	pub async fn transition(
		&self,
		order_id: Uuid,
		to: OrderStatus,
		actor: TransitionActor,
	) -> Result<Order, DomainError> {
		let mut order = self.repositories.orders.get(order_id).await?;
		let from = order.status;
		if !is_valid_transition(from, to) {
			return Err(DomainError::Validation(format!(
				"cannot transition order {order_id} from {} to {}",
				from.as_str(),
				to.as_str()
			)));
		}

		order.status = to;
		order.updated_at = Utc::now();
		self.repositories.orders.update(&order).await?;

		let event = OrderStateEvent {
			id: Uuid::new_v4(),
			order_id,
			event_type: OrderStateEventType::StateChange,
			actor_type: actor.actor_type,
			actor_id: actor.actor_id,
			actor_label: actor.actor_label,
			from_status: Some(from.as_str().to_string()),
			to_status: Some(to.as_str().to_string()),
			notes: actor.notes,
			metadata: serde_json::Value::Null,
			created_at: Utc::now(),
		};
		if let Err(err) = self.repositories.events.insert(&event).await {
			tracing::error!(order_id = %order_id, error = %err, "failed to record order state event");
		}

		Ok(order)
	}

	/// Records a non-state-change audit entry (e.g. a refill/replay note)
	/// without touching `order.status`. Best-effort: failure is logged,
	/// never propagated.
	pub async fn record_event(&self, event: OrderStateEvent) {
		let order_id = event.order_id;
		if let Err(err) = self.repositories.events.insert(&event).await {
			tracing::error!(order_id = %order_id, error = %err, "failed to record order state event");
		}
	}

	pub fn repositories(&self) -> &Repositories {
		&self.repositories
	}
}

pub fn shared(repositories: Repositories) -> Arc<OrderStateMachine> {
	Arc::new(OrderStateMachine::new(repositories))
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::OrderSource;
	use std::sync::Arc as StdArc;

	fn repositories() -> Repositories {
		let storage = StdArc::new(StorageService::new(Box::new(MemoryStorage::new())));
		Repositories::new(storage)
	}

	fn order(status: OrderStatus) -> Order {
		let now = Utc::now();
		Order {
			id: Uuid::new_v4(),
			order_number: "ORD-1".to_string(),
			user_id: None,
			status,
			source: OrderSource::Checkout,
			currency: "USD".to_string(),
			subtotal: rust_decimal::Decimal::new(10000, 2),
			tax: rust_decimal::Decimal::ZERO,
			total: rust_decimal::Decimal::new(10000, 2),
			notes: None,
			items: vec![],
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn valid_transition_updates_status_and_records_event() {
		let repos = repositories();
		let order = order(OrderStatus::Pending);
		repos.orders.insert(&order).await.unwrap();
		let machine = OrderStateMachine::new(repos.clone());

		let updated = machine.transition(order.id, OrderStatus::Processing, TransitionActor::default()).await.unwrap();
		assert_eq!(updated.status, OrderStatus::Processing);
	}

	#[tokio::test]
	async fn invalid_transition_is_rejected_without_mutation() {
		let repos = repositories();
		let order = order(OrderStatus::Pending);
		repos.orders.insert(&order).await.unwrap();
		let machine = OrderStateMachine::new(repos.clone());

		let err = machine.transition(order.id, OrderStatus::Completed, TransitionActor::default()).await.unwrap_err();
		assert!(matches!(err, DomainError::Validation(_)));

		let stored = repos.orders.get(order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Pending);
	}

	#[tokio::test]
	async fn canceled_is_terminal() {
		assert!(!is_valid_transition(OrderStatus::Canceled, OrderStatus::Processing));
		assert!(!is_valid_transition(OrderStatus::Canceled, OrderStatus::Pending));
	}

	#[tokio::test]
	async fn completed_reachable_from_on_hold_processing_and_active() {
		assert!(is_valid_transition(OrderStatus::OnHold, OrderStatus::Completed));
		assert!(is_valid_transition(OrderStatus::Processing, OrderStatus::Completed));
		assert!(is_valid_transition(OrderStatus::Active, OrderStatus::Completed));
	}
}
