//! Provider automation: service-override extraction, rule resolution,
//! margin guardrails, and the provider-order lifecycle (C4, §4.3).

pub mod context;
pub mod guardrails;
pub mod overrides;
pub mod rules;
pub mod service;
pub mod snapshot;

pub use context::order_context;
pub use guardrails::GuardrailStatus;
pub use overrides::{extract_overrides, ServiceOverride};
pub use rules::{resolve_rules, rule_ids, rule_metadata, ResolvedRules};
pub use service::{ProviderAutomationService, ReplayOutcome};
pub use snapshot::{backlog_metrics, build_snapshot, AutomationSnapshot, BacklogMetrics};
