//! Service-rule resolution (§4.3.2).
//!
//! A rule's `conditions[]` are small JSON predicates evaluated against the
//! rendering context built for a provider-order: `{"field": <dotted
//! path>, "equals": <value>}` or `{"field": <dotted path>, "in":
//! [<values>]}`. Rules are evaluated in list order (their priority); every
//! matching rule's `overrides` are folded into the result, with an
//! earlier rule's keys winning over a later one's (§4.3.2: "later rules
//! do not clobber earlier overridden keys").

use fulfillment_types::ServiceRule;
use serde_json::{Map, Value};

fn condition_holds(condition: &Value, context: &Value) -> bool {
	let Some(field) = condition.get("field").and_then(Value::as_str) else {
		return false;
	};
	let Ok(resolved) = fulfillment_template::resolve_context_path(context, field) else {
		return false;
	};
	if let Some(expected) = condition.get("equals") {
		return &resolved == expected;
	}
	if let Some(Value::Array(values)) = condition.get("in") {
		return values.contains(&resolved);
	}
	false
}

/// The outcome of resolving a priority-ordered `serviceRules[]` list
/// against a context: the merged override map, and every rule that
/// matched (in priority order), captured for replay-entry audit metadata.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRules {
	pub overrides: Map<String, Value>,
	pub matched: Vec<ServiceRule>,
}

/// Resolves `rules` against `context` (§4.3.2).
pub fn resolve_rules(rules: &[ServiceRule], context: &Value) -> ResolvedRules {
	let mut resolved = ResolvedRules::default();
	for rule in rules {
		if rule.conditions.iter().all(|c| condition_holds(c, context)) {
			if let Some(Value::Object(map)) = &rule.overrides {
				for (key, value) in map {
					resolved.overrides.entry(key.clone()).or_insert_with(|| value.clone());
				}
			}
			resolved.matched.push(rule.clone());
		}
	}
	resolved
}

/// Rule ids/labels extracted from a stored `serviceRules[]` snapshot for a
/// replay-entry audit trail (§4.3.5: "Rule ids/labels are extracted from
/// `payload.serviceRules[]` by trimming each rule's `id` field and
/// skipping rules with a blank or missing id").
pub fn rule_ids(rules: &[ServiceRule]) -> Vec<String> {
	rules.iter().map(|r| r.id.trim().to_string()).filter(|id| !id.is_empty()).collect()
}

/// Per-rule metadata snapshot for a replay entry: id, label, description,
/// priority, a shallow copy of conditions, and overrides (§4.3.5).
pub fn rule_metadata(rules: &[ServiceRule]) -> std::collections::HashMap<String, Value> {
	rules
		.iter()
		.filter(|r| !r.id.trim().is_empty())
		.map(|r| {
			let meta = serde_json::json!({
				"id": r.id,
				"label": r.label,
				"description": r.description,
				"priority": r.priority,
				"conditions": r.conditions,
				"overrides": r.overrides,
			});
			(r.id.trim().to_string(), meta)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn rule(id: &str, conditions: Vec<Value>, overrides: Value) -> ServiceRule {
		ServiceRule {
			id: id.to_string(),
			label: Some(format!("{id} label")),
			description: None,
			priority: Some(1),
			conditions,
			overrides: Some(overrides),
		}
	}

	#[test]
	fn first_matching_rule_wins_on_conflicting_keys() {
		let rules = vec![
			rule("r1", vec![json!({"field": "channel", "equals": "storefront"})], json!({"providerId": "p1"})),
			rule("r2", vec![], json!({"providerId": "p2", "extra": "yes"})),
		];
		let context = json!({"channel": "storefront"});
		let resolved = resolve_rules(&rules, &context);
		assert_eq!(resolved.overrides.get("providerId"), Some(&json!("p1")));
		assert_eq!(resolved.overrides.get("extra"), Some(&json!("yes")));
		assert_eq!(resolved.matched.len(), 2);
	}

	#[test]
	fn non_matching_condition_excludes_rule() {
		let rules = vec![rule("r1", vec![json!({"field": "channel", "in": ["app"]})], json!({"providerId": "p1"}))];
		let context = json!({"channel": "storefront"});
		let resolved = resolve_rules(&rules, &context);
		assert!(resolved.overrides.is_empty());
		assert!(resolved.matched.is_empty());
	}

	#[test]
	fn rule_ids_skips_blank() {
		let rules = vec![rule("  ", vec![], json!({})), rule("r2", vec![], json!({}))];
		assert_eq!(rule_ids(&rules), vec!["r2".to_string()]);
	}
}
