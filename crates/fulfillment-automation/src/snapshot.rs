//! Aggregate snapshot and backlog metrics over provider orders (§4.3.7,
//! §4.3.8).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fulfillment_storage::Repositories;
use fulfillment_types::{DomainError, FulfillmentProviderOrder};
use serde::Serialize;

use crate::guardrails::{self, GuardrailStatus};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayTally {
	pub total: i64,
	pub executed: i64,
	pub failed: i64,
	pub scheduled: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GuardrailTally {
	pub evaluated: i64,
	pub pass: i64,
	pub warn: i64,
	pub fail: i64,
}

impl GuardrailTally {
	fn record(&mut self, status: GuardrailStatus) {
		if status == GuardrailStatus::Idle {
			return;
		}
		self.evaluated += 1;
		match status {
			GuardrailStatus::Pass => self.pass += 1,
			GuardrailStatus::Warn => self.warn += 1,
			GuardrailStatus::Fail => self.fail += 1,
			GuardrailStatus::Idle => unreachable!(),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleFrequency {
	pub id: String,
	pub label: Option<String>,
	pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceRuleOverrides {
	pub total_overrides: i64,
	pub rules: HashMap<String, RuleFrequency>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutomationSnapshot {
	pub total_orders: i64,
	pub replays: ReplayTally,
	pub guardrails: GuardrailTally,
	pub guardrail_hits_by_service: HashMap<String, GuardrailTally>,
	pub rule_overrides_by_service: HashMap<String, ServiceRuleOverrides>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BacklogMetrics {
	pub scheduled_backlog: i64,
	pub next_scheduled_at: Option<DateTime<Utc>>,
}

fn tally_order(snapshot: &mut AutomationSnapshot, po: &FulfillmentProviderOrder) {
	snapshot.total_orders += 1;

	for replay in &po.payload.replays {
		snapshot.replays.total += 1;
		match replay.status.as_str() {
			"executed" => snapshot.replays.executed += 1,
			"failed" => snapshot.replays.failed += 1,
			_ => {}
		}
	}
	for entry in &po.payload.scheduled_replays {
		if entry.status == "scheduled" || entry.status.is_empty() {
			snapshot.replays.scheduled += 1;
		}
	}

	if let Some(guardrails) = &po.payload.guardrails {
		let customer_price = po.amount.to_string().parse::<f64>().unwrap_or(0.0);
		let provider_cost = po.payload.provider_cost_amount.unwrap_or(0.0);
		let status = guardrails::classify(customer_price, provider_cost, guardrails);
		snapshot.guardrails.record(status);
		snapshot.guardrail_hits_by_service.entry(po.service_id.clone()).or_default().record(status);
	}

	if !po.payload.service_rules.is_empty() {
		let entry = snapshot.rule_overrides_by_service.entry(po.service_id.clone()).or_default();
		for rule in &po.payload.service_rules {
			let id = rule.id.trim();
			if id.is_empty() {
				continue;
			}
			entry.total_overrides += 1;
			let frequency = entry.rules.entry(id.to_string()).or_insert_with(|| RuleFrequency {
				id: id.to_string(),
				label: rule.label.clone(),
				count: 0,
			});
			frequency.count += 1;
			if frequency.label.is_none() {
				frequency.label = rule.label.clone();
			}
		}
	}
}

/// Aggregates every provider order into a global and per-provider
/// snapshot (§4.3.7).
pub async fn build_snapshot(
	repositories: &Repositories,
) -> Result<(AutomationSnapshot, HashMap<String, AutomationSnapshot>), DomainError> {
	let orders = repositories.provider_orders.list_all().await?;
	let mut global = AutomationSnapshot::default();
	let mut by_provider: HashMap<String, AutomationSnapshot> = HashMap::new();

	for po in &orders {
		tally_order(&mut global, po);
		tally_order(by_provider.entry(po.provider_id.clone()).or_default(), po);
	}

	Ok((global, by_provider))
}

/// Counts all-providers due-or-pending scheduled replays and the
/// earliest pending `scheduledFor` (§4.3.8).
pub async fn backlog_metrics(repositories: &Repositories) -> Result<BacklogMetrics, DomainError> {
	let orders = repositories.provider_orders.list_all().await?;
	let mut metrics = BacklogMetrics::default();
	for po in &orders {
		for entry in &po.payload.scheduled_replays {
			if entry.status == "scheduled" || entry.status.is_empty() {
				metrics.scheduled_backlog += 1;
				metrics.next_scheduled_at = match metrics.next_scheduled_at {
					Some(current) if current <= entry.scheduled_for => Some(current),
					_ => Some(entry.scheduled_for),
				};
			}
		}
	}
	Ok(metrics)
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::{Guardrails, ProviderOrderPayload, ScheduledReplayEntry, ServiceRule};
	use std::sync::Arc;
	use uuid::Uuid;

	fn po_with(
		service_id: &str,
		guardrails: Option<Guardrails>,
		provider_cost: Option<f64>,
		amount: f64,
		rules: Vec<ServiceRule>,
	) -> FulfillmentProviderOrder {
		let now = Utc::now();
		FulfillmentProviderOrder {
			id: Uuid::new_v4(),
			provider_id: "prov-1".to_string(),
			service_id: service_id.to_string(),
			service_action: "order".to_string(),
			order_id: Uuid::new_v4(),
			order_item_id: Uuid::new_v4(),
			amount: rust_decimal::Decimal::try_from(amount).unwrap(),
			currency: "USD".to_string(),
			provider_name: None,
			payload: ProviderOrderPayload {
				guardrails,
				provider_cost_amount: provider_cost,
				service_rules: rules,
				..Default::default()
			},
			created_at: now,
			updated_at: now,
		}
	}

	#[tokio::test]
	async fn snapshot_tallies_guardrails_and_rule_frequency() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let repos = Repositories::new(storage);

		let guardrails = Guardrails { minimum_margin_absolute: None, minimum_margin_percent: Some(20.0), warning_margin_percent: Some(40.0) };
		let rule = ServiceRule {
			id: "rule-a".to_string(),
			label: Some("Rule A".to_string()),
			description: None,
			priority: None,
			conditions: vec![],
			overrides: None,
		};
		let po1 = po_with("svc-1", Some(guardrails), Some(72.0), 100.0, vec![rule.clone()]);
		let po2 = po_with("svc-1", Some(guardrails), Some(50.0), 100.0, vec![rule]);
		repos.provider_orders.insert(&po1).await.unwrap();
		repos.provider_orders.insert(&po2).await.unwrap();

		let (global, by_provider) = build_snapshot(&repos).await.unwrap();
		assert_eq!(global.total_orders, 2);
		assert_eq!(global.guardrails.evaluated, 2);
		assert_eq!(global.guardrails.warn, 1);
		assert_eq!(global.guardrails.pass, 1);
		let svc = global.rule_overrides_by_service.get("svc-1").unwrap();
		assert_eq!(svc.total_overrides, 2);
		assert_eq!(svc.rules.get("rule-a").unwrap().count, 2);
		assert_eq!(by_provider.get("prov-1").unwrap().total_orders, 2);
	}

	#[tokio::test]
	async fn backlog_metrics_finds_earliest_scheduled() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let repos = Repositories::new(storage);

		let mut po = po_with("svc-1", None, None, 100.0, vec![]);
		let later = Utc::now() + chrono::Duration::hours(2);
		let sooner = Utc::now() + chrono::Duration::minutes(10);
		po.payload.scheduled_replays.push(ScheduledReplayEntry {
			id: "s1".to_string(),
			requested_amount: None,
			currency: None,
			scheduled_for: later,
			status: "scheduled".to_string(),
			rule_ids: vec![],
			rule_metadata: Default::default(),
			response: None,
			error: None,
		});
		po.payload.scheduled_replays.push(ScheduledReplayEntry {
			id: "s2".to_string(),
			requested_amount: None,
			currency: None,
			scheduled_for: sooner,
			status: "scheduled".to_string(),
			rule_ids: vec![],
			rule_metadata: Default::default(),
			response: None,
			error: None,
		});
		repos.provider_orders.insert(&po).await.unwrap();

		let metrics = backlog_metrics(&repos).await.unwrap();
		assert_eq!(metrics.scheduled_backlog, 2);
		assert_eq!(metrics.next_scheduled_at, Some(sooner));
	}
}
