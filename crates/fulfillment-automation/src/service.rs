//! The provider automation service (C4): create/refill/replay/schedule-
//! replay provider-orders (§4.3.3–§4.3.5).

use chrono::{DateTime, Utc};
use fulfillment_delivery::ProviderEndpointInvoker;
use fulfillment_storage::Repositories;
use fulfillment_types::{
	DomainError, FulfillmentProviderOrder, Order, OrderItem, ProviderOrderPayload, RefillEntry, ReplayEntry,
	ScheduledReplayEntry,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::order_context;
use crate::overrides::ServiceOverride;
use crate::rules::{resolve_rules, rule_ids, rule_metadata};

/// The outcome of `POST /fulfillment/providers/{id}/orders/{id}/replay` (§6).
#[derive(Debug, Clone)]
pub enum ReplayOutcome {
	Immediate(ReplayEntry),
	Scheduled(ScheduledReplayEntry),
}

pub struct ProviderAutomationService {
	repositories: Repositories,
	invoker: ProviderEndpointInvoker,
}

impl ProviderAutomationService {
	pub fn new(repositories: Repositories) -> Self {
		Self { repositories, invoker: ProviderEndpointInvoker::new() }
	}

	/// Creates a provider-order for one service-override add-on (§4.3.3).
	#[tracing::instrument(skip_all, fields(order_id = %order.id, item_id = %item.id, service_id = %override_.service_id))]
	pub async fn create_provider_order(
		&self,
		order: &Order,
		item: &OrderItem,
		override_: &ServiceOverride,
	) -> Result<FulfillmentProviderOrder, DomainError> {
		let provider_id = override_
			.provider_id
			.clone()
			.ok_or_else(|| DomainError::Validation("service override is missing providerId".to_string()))?;
		let provider = self.repositories.providers.get(&provider_id).await?;
		let service = self.repositories.services.get(&override_.service_id).await.ok();

		let rule_context = json!({
			"channel": item.platform_context.as_ref().and_then(|v| v.get("channel")).cloned().unwrap_or(Value::Null),
			"serviceId": override_.service_id,
			"providerId": provider_id,
		});
		let resolved = resolve_rules(&override_.service_rules, &rule_context);

		let context = order_context(&provider, order, item, override_, &resolved.overrides);

		let endpoint = provider
			.endpoints
			.get("order")
			.ok_or_else(|| DomainError::Validation(format!("provider {provider_id} has no `order` endpoint")))?;

		let outcome = self.invoker.invoke(endpoint, &context).await?;

		let payload = ProviderOrderPayload {
			provider_order_id: outcome.provider_order_id.clone(),
			provider_response: Some(outcome.response.clone()),
			provider_cost_amount: override_.provider_cost_amount.and_then(|d| d.to_f64()),
			guardrails: service.map(|s| s.guardrails),
			service_rules: override_.service_rules.clone(),
			creation_context: Some(context),
			..Default::default()
		};

		let now = Utc::now();
		let provider_order = FulfillmentProviderOrder {
			id: Uuid::new_v4(),
			provider_id,
			service_id: override_.service_id.clone(),
			service_action: "order".to_string(),
			order_id: order.id,
			order_item_id: item.id,
			amount: override_.pricing_amount,
			currency: order.currency.clone(),
			provider_name: Some(provider.name.clone()),
			payload,
			created_at: now,
			updated_at: now,
		};

		self.repositories.provider_orders.insert(&provider_order).await?;
		Ok(provider_order)
	}

	/// Looks up the provider's own order id, in priority order, from the
	/// typed field then the legacy scalar keys the untyped payload used to
	/// carry (§4.3.4).
	fn resolve_provider_order_id(payload: &ProviderOrderPayload) -> Option<String> {
		if let Some(id) = &payload.provider_order_id {
			if !id.trim().is_empty() {
				return Some(id.clone());
			}
		}
		for key in ["providerOrderId", "provider_order_id", "providerOrderID", "orderId"] {
			if let Some(value) = payload.extra.get(key) {
				if let Some(s) = value.as_str() {
					if !s.trim().is_empty() {
						return Some(s.to_string());
					}
				}
			}
		}
		None
	}

	fn scalar_extras(payload: &ProviderOrderPayload) -> Value {
		let mut map = serde_json::Map::new();
		for (k, v) in &payload.extra {
			if v.is_string() || v.is_number() {
				map.insert(k.clone(), v.clone());
			}
		}
		Value::Object(map)
	}

	/// `requestedAmount` fallback chain: explicit override, the provider-
	/// order's stored `amount`, then `payload.extra.requestedAmount`
	/// parsed from a string if necessary (§4.3.5).
	fn resolve_requested_amount(po: &FulfillmentProviderOrder, explicit: Option<f64>) -> Option<f64> {
		explicit.or_else(|| po.amount.to_f64()).or_else(|| {
			po.payload.extra.get("requestedAmount").and_then(|v| match v {
				Value::Number(n) => n.as_f64(),
				Value::String(s) => s.parse::<f64>().ok(),
				_ => None,
			})
		})
	}

	/// Refills an already-placed provider order (§4.3.4).
	#[tracing::instrument(skip_all, fields(provider_order_id = %provider_order_id))]
	pub async fn refill(
		&self,
		provider_order_id: Uuid,
		amount: Option<f64>,
		currency: Option<String>,
	) -> Result<RefillEntry, DomainError> {
		let mut po = self.repositories.provider_orders.get(provider_order_id).await?;
		let provider_order_id_value = Self::resolve_provider_order_id(&po.payload).ok_or_else(|| {
			DomainError::Validation("provider order has no providerOrderId to refill".to_string())
		})?;
		let provider = self.repositories.providers.get(&po.provider_id).await?;
		let endpoint = provider
			.endpoints
			.get("refill")
			.ok_or_else(|| DomainError::Validation(format!("provider {} has no `refill` endpoint", po.provider_id)))?;

		let mut context = serde_json::Map::new();
		context.insert("providerOrderId".to_string(), json!(provider_order_id_value));
		if let Some(amount) = amount {
			context.insert("amount".to_string(), json!(amount));
		}
		if let Some(currency) = &currency {
			context.insert("currency".to_string(), json!(currency));
		}
		if let Value::Object(extras) = Self::scalar_extras(&po.payload) {
			for (k, v) in extras {
				context.entry(k).or_insert(v);
			}
		}

		let outcome = self.invoker.invoke(endpoint, &Value::Object(context)).await?;

		let entry = RefillEntry {
			id: Uuid::new_v4().to_string(),
			amount,
			currency,
			performed_at: Utc::now(),
			response: outcome.response,
		};
		po.payload.refills.push(entry.clone());
		po.updated_at = Utc::now();
		self.repositories.provider_orders.update(&po).await?;
		Ok(entry)
	}

	/// Re-invokes the `order` endpoint with the context stored at creation
	/// time (§4.3.5 "Immediate").
	#[tracing::instrument(skip_all, fields(provider_order_id = %provider_order_id))]
	pub async fn replay_immediate(
		&self,
		provider_order_id: Uuid,
		amount_override: Option<f64>,
	) -> Result<ReplayEntry, DomainError> {
		let mut po = self.repositories.provider_orders.get(provider_order_id).await?;
		let provider = self.repositories.providers.get(&po.provider_id).await?;
		let endpoint = provider
			.endpoints
			.get("order")
			.ok_or_else(|| DomainError::Validation(format!("provider {} has no `order` endpoint", po.provider_id)))?;

		let requested_amount = Self::resolve_requested_amount(&po, amount_override);
		let mut context = po.payload.creation_context.clone().unwrap_or_else(|| json!({}));
		if let (Value::Object(map), Some(amount)) = (&mut context, requested_amount) {
			map.insert("requestedAmount".to_string(), json!(amount));
		}

		let outcome = self.invoker.invoke(endpoint, &context).await?;

		let entry = ReplayEntry {
			id: Uuid::new_v4().to_string(),
			requested_amount,
			currency: Some(po.currency.clone()),
			performed_at: Utc::now(),
			status: "executed".to_string(),
			response: outcome.response.clone(),
			rule_ids: rule_ids(&po.payload.service_rules),
			rule_metadata: rule_metadata(&po.payload.service_rules),
		};
		po.payload.replays.push(entry.clone());
		po.payload.provider_response = Some(outcome.response);
		po.updated_at = Utc::now();
		self.repositories.provider_orders.update(&po).await?;
		Ok(entry)
	}

	/// Appends a `scheduled` entry to `scheduledReplays[]`, drained later
	/// by the scheduled-replay worker (C7) (§4.3.5 "Scheduled").
	pub async fn schedule_replay(
		&self,
		provider_order_id: Uuid,
		run_at: DateTime<Utc>,
		amount_override: Option<f64>,
	) -> Result<ScheduledReplayEntry, DomainError> {
		let mut po = self.repositories.provider_orders.get(provider_order_id).await?;
		let requested_amount = Self::resolve_requested_amount(&po, amount_override);
		let entry = ScheduledReplayEntry {
			id: Uuid::new_v4().to_string(),
			requested_amount,
			currency: Some(po.currency.clone()),
			scheduled_for: run_at,
			status: "scheduled".to_string(),
			rule_ids: rule_ids(&po.payload.service_rules),
			rule_metadata: rule_metadata(&po.payload.service_rules),
			response: None,
			error: None,
		};
		po.payload.scheduled_replays.push(entry.clone());
		po.updated_at = Utc::now();
		self.repositories.provider_orders.update(&po).await?;
		Ok(entry)
	}

	/// `POST /fulfillment/providers/{id}/orders/{id}/replay` (§6, §8):
	/// `runAt <= now` behaves as immediate unless `scheduleOnly=true`.
	pub async fn replay(
		&self,
		provider_order_id: Uuid,
		amount: Option<f64>,
		run_at: Option<DateTime<Utc>>,
		schedule_only: bool,
	) -> Result<ReplayOutcome, DomainError> {
		match run_at {
			Some(at) if schedule_only || at > Utc::now() => {
				Ok(ReplayOutcome::Scheduled(self.schedule_replay(provider_order_id, at, amount).await?))
			}
			_ => Ok(ReplayOutcome::Immediate(self.replay_immediate(provider_order_id, amount).await?)),
		}
	}

	/// Drains one due scheduled-replay entry on behalf of the scheduled-
	/// replay worker (C7, §4.4 step 2): executes it immediately and writes
	/// the entry's terminal status exactly once.
	pub async fn execute_scheduled_replay(
		&self,
		provider_order_id: Uuid,
		entry_id: &str,
	) -> Result<(), DomainError> {
		let result = self.replay_immediate(provider_order_id, None).await;
		let mut po = self.repositories.provider_orders.get(provider_order_id).await?;
		if let Some(entry) = po.payload.scheduled_replays.iter_mut().find(|e| e.id == entry_id) {
			if entry.status != "scheduled" {
				// Already fenced by a prior attempt; nothing to do (§4.4: "the
				// executed marker is the fence").
				return Ok(());
			}
			match &result {
				Ok(replay_entry) => {
					entry.status = "executed".to_string();
					entry.response = Some(replay_entry.response.clone());
				}
				Err(err) => {
					entry.status = "failed".to_string();
					entry.error = Some(err.to_string());
				}
			}
			po.updated_at = Utc::now();
			self.repositories.provider_orders.update(&po).await?;
		}
		result.map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::Guardrails;
	use std::sync::Arc;

	fn repositories() -> Repositories {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		Repositories::new(storage)
	}

	fn provider_order(service_rules: Vec<fulfillment_types::ServiceRule>) -> FulfillmentProviderOrder {
		let now = Utc::now();
		FulfillmentProviderOrder {
			id: Uuid::new_v4(),
			provider_id: "prov-1".to_string(),
			service_id: "svc-1".to_string(),
			service_action: "order".to_string(),
			order_id: Uuid::new_v4(),
			order_item_id: Uuid::new_v4(),
			amount: rust_decimal::Decimal::new(9500, 2),
			currency: "USD".to_string(),
			provider_name: Some("Provider One".to_string()),
			payload: ProviderOrderPayload {
				provider_order_id: Some("ext-123".to_string()),
				provider_cost_amount: Some(72.0),
				guardrails: Some(Guardrails {
					minimum_margin_absolute: None,
					minimum_margin_percent: Some(20.0),
					warning_margin_percent: Some(40.0),
				}),
				service_rules,
				creation_context: Some(json!({"orderId": "abc", "requestedAmount": 95.0})),
				..Default::default()
			},
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn schedule_replay_appends_scheduled_entry() {
		let repos = repositories();
		let service = ProviderAutomationService::new(repos.clone());
		let po = provider_order(vec![]);
		repos.provider_orders.insert(&po).await.unwrap();

		let run_at = Utc::now() - chrono::Duration::minutes(5);
		let entry = service.schedule_replay(po.id, run_at, Some(95.0)).await.unwrap();
		assert_eq!(entry.status, "scheduled");

		let stored = repos.provider_orders.get(po.id).await.unwrap();
		assert_eq!(stored.payload.scheduled_replays.len(), 1);
	}

	#[tokio::test]
	async fn refill_requires_provider_order_id() {
		let repos = repositories();
		let service = ProviderAutomationService::new(repos.clone());
		let mut po = provider_order(vec![]);
		po.payload.provider_order_id = None;
		repos.provider_orders.insert(&po).await.unwrap();

		let err = service.refill(po.id, Some(10.0), None).await.unwrap_err();
		assert!(matches!(err, DomainError::Validation(_)));
	}

	// Provider endpoint invocation (replay_immediate, create_provider_order,
	// refill happy paths) is exercised against a live HTTP mock in
	// `fulfillment-core`'s integration tests (scenario S5), which wires a
	// real in-memory provider + invoker end to end.
}
