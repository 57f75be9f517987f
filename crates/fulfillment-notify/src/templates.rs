//! Pure rendering functions: `render<Kind>(context) -> RenderedTemplate`
//! (§4.10). Each renders off the flat JSON context bag
//! `fulfillment-core`/`fulfillment-payments` hand the dispatcher, rather
//! than typed ORM rows — those crates have no dependency on a richer
//! order/task model than they already carry.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RenderedTemplate {
	pub subject: String,
	pub text_body: String,
	pub html_body: Option<String>,
}

fn str_field<'a>(context: &'a Value, key: &str) -> &'a str {
	context.get(key).and_then(Value::as_str).unwrap_or("")
}

fn title_case_status(status: &str) -> String {
	status
		.split('_')
		.map(|word| {
			let mut chars = word.chars();
			match chars.next() {
				Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}

/// `order_status_update` (§4.10).
pub fn render_order_status_update(context: &Value) -> RenderedTemplate {
	let order_number = str_field(context, "orderNumber");
	let status = title_case_status(str_field(context, "status"));
	let subject = format!("Order {order_number} is now {status}");
	let text_body = format!(
		"Hi there,\n\nYour order {order_number} has moved to {status}.\n\nYou can review your order progress by logging into the dashboard.\n\nThanks,\nThe SMPLAT Team"
	);
	let html_body = format!(
		"<html><body><p>Hi there,</p><p>Your order <strong>{order_number}</strong> has moved to <strong>{status}</strong>.</p><p>You can review your order progress by logging into the dashboard.</p><p>Thanks,<br />The SMPLAT Team</p></body></html>"
	);
	RenderedTemplate { subject, text_body, html_body: Some(html_body) }
}

/// `payment_success`.
pub fn render_payment_success(context: &Value) -> RenderedTemplate {
	let order_number = str_field(context, "orderNumber");
	let amount = str_field(context, "amount");
	let currency = str_field(context, "currency");
	let subject = format!("Payment received for order {order_number}");
	let text_body = format!(
		"Hi there,\n\nWe've received your payment of {amount} {currency} for order {order_number}. Fulfillment is underway.\n\nThanks,\nThe SMPLAT Team"
	);
	let html_body = format!(
		"<html><body><p>Hi there,</p><p>We've received your payment of <strong>{amount} {currency}</strong> for order <strong>{order_number}</strong>. Fulfillment is underway.</p><p>Thanks,<br />The SMPLAT Team</p></body></html>"
	);
	RenderedTemplate { subject, text_body, html_body: Some(html_body) }
}

/// `fulfillment_retry`.
pub fn render_fulfillment_retry(context: &Value) -> RenderedTemplate {
	let order_number = str_field(context, "orderNumber");
	let task_title = str_field(context, "taskTitle");
	let retry_count = context.get("retryCount").and_then(Value::as_i64).unwrap_or(0);
	let subject = format!("Retry scheduled for {task_title} on order {order_number}");
	let text_body = format!(
		"Hi there,\n\nWe hit a snag running '{task_title}' for order {order_number}. The task is queued for retry (attempt {retry_count}).\n\nWe'll keep retrying automatically and alert you if manual action is needed.\n\nThanks,\nThe SMPLAT Team"
	);
	let html_body = format!(
		"<html><body><p>Hi there,</p><p>We hit a snag running <strong>{task_title}</strong> for order <strong>{order_number}</strong>. The task is queued for retry (attempt {retry_count}).</p><p>We'll keep retrying automatically and alert you if manual action is needed.</p><p>Thanks,<br />The SMPLAT Team</p></body></html>"
	);
	RenderedTemplate { subject, text_body, html_body: Some(html_body) }
}

/// `fulfillment_completion`.
pub fn render_fulfillment_completion(context: &Value) -> RenderedTemplate {
	let order_number = str_field(context, "orderNumber");
	let subject = format!("Fulfillment completed for order {order_number}");
	let text_body = format!(
		"Hi there,\n\nAll fulfillment tasks for order {order_number} are complete.\n\nReview deliverables and share feedback from the order timeline.\n\nAppreciate you trusting SMPLAT.\nThe SMPLAT Team"
	);
	let html_body = format!(
		"<html><body><p>Hi there,</p><p>All fulfillment tasks for order <strong>{order_number}</strong> are complete.</p><p>Review deliverables and share feedback from the order timeline.</p><p>Appreciate you trusting SMPLAT.<br />The SMPLAT Team</p></body></html>"
	);
	RenderedTemplate { subject, text_body, html_body: Some(html_body) }
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn order_status_update_title_cases_the_status() {
		let rendered = render_order_status_update(&json!({"orderNumber": "SM000001", "status": "on_hold"}));
		assert!(rendered.subject.contains("On Hold"));
	}

	#[test]
	fn fulfillment_retry_includes_task_title_and_attempt() {
		let rendered =
			render_fulfillment_retry(&json!({"orderNumber": "SM000001", "taskTitle": "Follower Growth Campaign", "retryCount": 2}));
		assert!(rendered.text_body.contains("Follower Growth Campaign"));
		assert!(rendered.text_body.contains("attempt 2"));
	}
}
