use fulfillment_delivery::ProviderEndpointInvoker;
use fulfillment_types::EndpointDescriptor;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn invoke_renders_template_and_extracts_provider_order_id() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/orders"))
		.and(header("x-api-key", "secret-123"))
		.respond_with(ResponseTemplate::new(201).set_body_json(json!({
			"data": { "id": "po_789" }
		})))
		.mount(&server)
		.await;

	let descriptor: EndpointDescriptor = serde_json::from_value(json!({
		"method": "POST",
		"url": format!("{}/orders", server.uri()),
		"headers": { "x-api-key": "{{ apiKey }}" },
		"payload": { "serviceId": "{{ serviceId }}", "quantity": "{{ quantity }}" },
		"response_path": "data.id",
	}))
	.unwrap();

	let context = json!({ "apiKey": "secret-123", "serviceId": "svc-1", "quantity": 500 });

	let invoker = ProviderEndpointInvoker::new();
	let outcome = invoker.invoke(&descriptor, &context).await.unwrap();

	assert_eq!(outcome.status, 201);
	assert_eq!(outcome.provider_order_id.as_deref(), Some("po_789"));
	assert_eq!(outcome.response["data"]["id"], "po_789");
}

#[tokio::test]
async fn invoke_raises_provider_endpoint_error_on_failure_status() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/orders"))
		.respond_with(ResponseTemplate::new(422).set_body_string("invalid sku"))
		.mount(&server)
		.await;

	let descriptor: EndpointDescriptor = serde_json::from_value(json!({
		"method": "POST",
		"url": format!("{}/orders", server.uri()),
	}))
	.unwrap();

	let invoker = ProviderEndpointInvoker::new();
	let err = invoker.invoke(&descriptor, &json!({})).await.unwrap_err();

	match err {
		fulfillment_delivery::ProviderEndpointError::Endpoint { status, message } => {
			assert_eq!(status, Some(422));
			assert_eq!(message, "invalid sku");
		}
		other => panic!("expected Endpoint error, got {other:?}"),
	}
}

#[tokio::test]
async fn invoke_defaults_method_to_post_and_respects_custom_success_range() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/balance"))
		.respond_with(ResponseTemplate::new(404).set_body_json(json!({ "balance": 0 })))
		.mount(&server)
		.await;

	let descriptor: EndpointDescriptor = serde_json::from_value(json!({
		"url": format!("{}/balance", server.uri()),
		"success_status_min": 200,
		"success_status_max": 499,
	}))
	.unwrap();

	let invoker = ProviderEndpointInvoker::new();
	let outcome = invoker.invoke(&descriptor, &json!({})).await.unwrap();
	assert_eq!(outcome.status, 404);
}
