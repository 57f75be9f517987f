//! Override extraction (§4.3.1).

use fulfillment_types::{AddOn, OrderItem, ServiceRule};
use rust_decimal::Decimal;
use serde_json::Value;

/// A normalized service override computed from one item add-on.
///
/// Only fields actually carried by [`AddOn`] are modeled; `fulfillmentMode`
/// always resolves to `"order"` since every add-on is dispatched against a
/// provider's `order` endpoint at creation time (refills/replays are
/// separate operations, never part of override extraction).
#[derive(Debug, Clone)]
pub struct ServiceOverride {
	pub service_id: String,
	pub provider_id: Option<String>,
	pub pricing_amount: Decimal,
	pub provider_cost_amount: Option<Decimal>,
	pub fulfillment_mode: String,
	pub payload_template: Option<Value>,
	pub preview_quantity: Option<i64>,
	pub service_rules: Vec<ServiceRule>,
}

impl ServiceOverride {
	fn from_add_on(add_on: &AddOn) -> Option<Self> {
		let service_id = add_on.service_id.clone()?;
		Some(ServiceOverride {
			service_id,
			provider_id: add_on.service_provider_id.clone(),
			pricing_amount: add_on.price_delta,
			provider_cost_amount: add_on.provider_cost_amount,
			fulfillment_mode: "order".to_string(),
			payload_template: add_on.payload_template.clone(),
			preview_quantity: add_on.preview_quantity,
			service_rules: add_on.service_rules.clone(),
		})
	}
}

/// Extracts one [`ServiceOverride`] per `serviceOverride` add-on on `item`
/// (§4.3.1). Add-ons in any other pricing mode, or missing a `serviceId`,
/// contribute nothing.
pub fn extract_overrides(item: &OrderItem) -> Vec<ServiceOverride> {
	item.add_ons
		.iter()
		.filter(|add_on| add_on.is_service_override())
		.filter_map(ServiceOverride::from_add_on)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use uuid::Uuid;

	fn item_with_add_ons(add_ons: Vec<AddOn>) -> OrderItem {
		OrderItem {
			id: Uuid::new_v4(),
			order_id: Uuid::new_v4(),
			product_id: None,
			product_title: "Growth package".to_string(),
			quantity: 1,
			unit_price: Decimal::ZERO,
			total_price: Decimal::ZERO,
			add_ons,
			attributes: None,
			platform_context: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	fn override_add_on(service_id: &str) -> AddOn {
		AddOn {
			pricing_mode: "serviceOverride".to_string(),
			service_id: Some(service_id.to_string()),
			price_delta: Decimal::new(999, 2),
			service_provider_id: Some("provider-a".to_string()),
			provider_cost_amount: Some(Decimal::new(450, 2)),
			service_rules: vec![],
			payload_template: None,
			preview_quantity: None,
		}
	}

	#[test]
	fn extracts_only_service_override_add_ons() {
		let mut non_override = override_add_on("svc-ignored");
		non_override.pricing_mode = "flat".to_string();
		let item = item_with_add_ons(vec![override_add_on("svc-1"), non_override]);

		let overrides = extract_overrides(&item);
		assert_eq!(overrides.len(), 1);
		assert_eq!(overrides[0].service_id, "svc-1");
		assert_eq!(overrides[0].fulfillment_mode, "order");
	}

	#[test]
	fn skips_override_add_on_missing_service_id() {
		let mut add_on = override_add_on("ignored");
		add_on.service_id = None;
		let item = item_with_add_ons(vec![add_on]);

		assert!(extract_overrides(&item).is_empty());
	}
}
