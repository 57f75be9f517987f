//! Rendering-context builders for the provider endpoint invoker (C3).

use fulfillment_types::{FulfillmentProvider, Order, OrderItem};
use serde_json::{json, Map, Value};

use crate::overrides::ServiceOverride;

fn decimal_to_json(value: rust_decimal::Decimal) -> Value {
	value.to_string().parse::<f64>().map(json!).unwrap_or(Value::Null)
}

/// The context built for a provider's `order` endpoint (§4.3.3):
/// `{providerMetadata…, orderId, orderItemId, serviceId, serviceAction,
/// requestedAmount, currency, …addOn fields}`, with any resolved rule
/// overrides folded in on top.
pub fn order_context(
	provider: &FulfillmentProvider,
	order: &Order,
	item: &OrderItem,
	override_: &ServiceOverride,
	rule_overrides: &Map<String, Value>,
) -> Value {
	let mut context = Map::new();
	if let Value::Object(provider_meta) = &provider.metadata {
		for (k, v) in provider_meta {
			context.insert(k.clone(), v.clone());
		}
	}
	context.insert("providerId".to_string(), json!(provider.id));
	context.insert("providerName".to_string(), json!(provider.name));
	context.insert("orderId".to_string(), json!(order.id));
	context.insert("orderItemId".to_string(), json!(item.id));
	context.insert("serviceId".to_string(), json!(override_.service_id));
	context.insert("serviceAction".to_string(), json!("order"));
	context.insert("requestedAmount".to_string(), decimal_to_json(override_.pricing_amount));
	context.insert("currency".to_string(), json!(order.currency));
	context.insert("quantity".to_string(), json!(override_.preview_quantity.unwrap_or(item.quantity)));
	if let Some(cost) = override_.provider_cost_amount {
		context.insert("providerCostAmount".to_string(), decimal_to_json(cost));
	}
	if let Some(template) = &override_.payload_template {
		context.insert("payloadTemplate".to_string(), template.clone());
	}
	context.insert("order".to_string(), json!({"id": order.id, "orderNumber": order.order_number}));
	context.insert("item".to_string(), json!({"id": item.id, "productTitle": item.product_title}));
	for (k, v) in rule_overrides {
		context.insert(k.clone(), v.clone());
	}
	Value::Object(context)
}
