//! End-to-end scenario tests for the fulfillment core, backed by the
//! in-memory storage implementation. Named after the concrete scenarios
//! they cover rather than the modules they exercise.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fulfillment_automation::ProviderAutomationService;
use fulfillment_core::{
    FulfillmentService, NullNotificationDispatch, ObservabilityStore, OrderStateMachine, ReplayWorker,
    ReplayWorkerConfig, TaskProcessor, TaskProcessorConfig,
};
use fulfillment_storage::implementations::memory::MemoryStorage;
use fulfillment_storage::{Repositories, StorageService};
use fulfillment_types::{
    ConfiguredTask, FulfillmentConfig, FulfillmentProvider, FulfillmentTaskStatus, FulfillmentTaskType, Guardrails,
    Order, OrderItem, OrderSource, OrderStatus, Product, ProductStatus, ProviderOrderPayload, ScheduledReplayEntry,
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repositories() -> Repositories {
    let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
    Repositories::new(storage)
}

fn new_order() -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        order_number: "ORD-S1".to_string(),
        user_id: None,
        status: OrderStatus::Pending,
        source: OrderSource::Checkout,
        currency: "USD".to_string(),
        subtotal: Decimal::new(29900, 2),
        tax: Decimal::ZERO,
        total: Decimal::new(29900, 2),
        notes: None,
        items: vec![],
        created_at: now,
        updated_at: now,
    }
}

fn new_item(order_id: Uuid, product_id: Option<Uuid>, total_price: Decimal) -> OrderItem {
    let now = Utc::now();
    OrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id,
        product_title: "Instagram Growth".to_string(),
        quantity: 1,
        unit_price: total_price,
        total_price,
        add_ons: vec![],
        attributes: None,
        platform_context: None,
        created_at: now,
        updated_at: now,
    }
}

fn fulfillment_service(repos: Repositories) -> FulfillmentService {
    FulfillmentService::new(
        repos.clone(),
        Arc::new(OrderStateMachine::new(repos.clone())),
        Arc::new(ProviderAutomationService::new(repos.clone())),
        Arc::new(NullNotificationDispatch),
    )
}

/// S1 — Instagram order goes pending -> processing, materializes 4 tasks.
#[tokio::test]
async fn s1_instagram_kickoff_materializes_four_tasks() {
    let repos = repositories();
    let product = Product {
        id: Uuid::new_v4(),
        slug: "instagram-growth".to_string(),
        title: "Instagram Growth".to_string(),
        category: "instagram".to_string(),
        base_price: Decimal::new(29900, 2),
        currency: "USD".to_string(),
        status: ProductStatus::Active,
        fulfillment_config: None,
    };
    repos.products.upsert(&product).await.unwrap();

    let order = new_order();
    repos.orders.insert(&order).await.unwrap();
    let item = new_item(order.id, Some(product.id), Decimal::new(29900, 2));
    repos.order_items.insert(&item).await.unwrap();

    let service = fulfillment_service(repos.clone());
    let kicked_off = service.process_order_fulfillment(order.id).await.unwrap();
    assert!(kicked_off);

    let updated = repos.orders.get(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Processing);

    let tasks = repos.tasks.list_by_item(item.id).await.unwrap();
    assert_eq!(tasks.len(), 4);
    let types: Vec<_> = tasks.iter().map(|t| t.task_type).collect();
    for expected in [
        FulfillmentTaskType::InstagramSetup,
        FulfillmentTaskType::AnalyticsCollection,
        FulfillmentTaskType::FollowerGrowth,
        FulfillmentTaskType::EngagementBoost,
    ] {
        assert!(types.contains(&expected), "missing {expected:?}");
    }
}

/// S2 — Configured task rendering: templates stay unrendered at
/// materialization time; the frozen context carries the order number.
#[tokio::test]
async fn s2_configured_task_defers_rendering_to_execution_time() {
    let repos = repositories();
    let product = Product {
        id: Uuid::new_v4(),
        slug: "custom-analytics".to_string(),
        title: "Custom Analytics".to_string(),
        category: "general".to_string(),
        base_price: Decimal::new(9900, 2),
        currency: "USD".to_string(),
        status: ProductStatus::Active,
        fulfillment_config: Some(FulfillmentConfig {
            tasks: vec![ConfiguredTask {
                task_type: "analytics_collection".to_string(),
                title: None,
                description: None,
                execution: Some(json!({
                    "kind": "http",
                    "method": "POST",
                    "url": "https://api.test/{{ order.id }}",
                    "headers": {"X-Order-Number": "{{ order.order_number }}"},
                    "payload": {"itemId": "{{ item.id }}", "quantity": "{{ item.quantity }}"},
                })),
                payload: None,
                schedule_offset_seconds: Some(0),
                schedule_offset_minutes: None,
                schedule_offset_hours: None,
                scheduled_at: None,
                max_retries: None,
            }],
        }),
    };
    repos.products.upsert(&product).await.unwrap();

    let order = new_order();
    repos.orders.insert(&order).await.unwrap();
    let item = new_item(order.id, Some(product.id), Decimal::new(9900, 2));
    repos.order_items.insert(&item).await.unwrap();

    let service = fulfillment_service(repos.clone());
    service.process_order_fulfillment(order.id).await.unwrap();

    let tasks = repos.tasks.list_by_item(item.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let payload = tasks[0].payload.as_ref().unwrap();
    assert_eq!(payload["context"]["order"]["order_number"], json!(order.order_number));
    assert_eq!(payload["execution"]["headers"]["X-Order-Number"], json!("{{ order.order_number }}"));
}

/// S3 — Retry then dead-letter with maxRetries=2.
#[tokio::test]
async fn s3_retry_then_dead_letter() {
    let repos = repositories();
    let order = new_order();
    repos.orders.insert(&order).await.unwrap();
    let item = new_item(order.id, None, Decimal::new(9900, 2));
    repos.order_items.insert(&item).await.unwrap();

    let now = Utc::now();
    let task = fulfillment_types::FulfillmentTask {
        id: Uuid::new_v4(),
        order_item_id: item.id,
        task_type: FulfillmentTaskType::ContentPromotion,
        status: FulfillmentTaskStatus::Pending,
        title: "Content Promotion".to_string(),
        description: None,
        payload: Some(json!({"execution": {"kind": "unsupported"}})),
        result: None,
        error_message: None,
        retry_count: 0,
        max_retries: 2,
        scheduled_at: Some(now - Duration::seconds(1)),
        started_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    repos.tasks.insert(&task).await.unwrap();

    let service = Arc::new(fulfillment_service(repos.clone()));
    let observability = Arc::new(ObservabilityStore::new());
    let processor = TaskProcessor::new(repos.clone(), service.clone(), observability, TaskProcessorConfig::default());

    processor.run_once().await;
    let after_first = repos.tasks.get(task.id).await.unwrap();
    assert_eq!(after_first.status, FulfillmentTaskStatus::Pending);
    assert_eq!(after_first.retry_count, 1);
    assert!(after_first.scheduled_at.unwrap() <= now + Duration::seconds(61));

    let mut rescheduled = after_first.clone();
    rescheduled.scheduled_at = Some(now - Duration::seconds(1));
    repos.tasks.update(&rescheduled).await.unwrap();
    processor.run_once().await;
    let after_second = repos.tasks.get(task.id).await.unwrap();
    assert_eq!(after_second.retry_count, 2);
    assert_eq!(after_second.status, FulfillmentTaskStatus::Pending);

    let mut rescheduled_again = after_second.clone();
    rescheduled_again.scheduled_at = Some(now - Duration::seconds(1));
    repos.tasks.update(&rescheduled_again).await.unwrap();
    processor.run_once().await;
    let after_third = repos.tasks.get(task.id).await.unwrap();
    assert_eq!(after_third.status, FulfillmentTaskStatus::Failed);
    assert_eq!(after_third.result.unwrap()["deadLetter"], json!(true));
}

/// S5 — Scheduled replay drain against a live HTTP mock.
#[tokio::test]
async fn s5_scheduled_replay_drain_executes_due_entry() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/order$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"order_id": "mock-order-1"}})))
        .mount(&mock_server)
        .await;

    let repos = repositories();
    let provider = FulfillmentProvider {
        id: "prov-1".to_string(),
        name: "Provider One".to_string(),
        endpoints: std::collections::HashMap::from([(
            "order".to_string(),
            fulfillment_types::EndpointDescriptor {
                method: "POST".to_string(),
                url: json!(format!("{}/order", mock_server.uri())),
                headers: None,
                payload: None,
                response_path: Some("data.order_id".to_string()),
                timeout_seconds: None,
                success_statuses: None,
                success_status_min: None,
                success_status_max: None,
            },
        )]),
        metadata: json!({}),
    };
    repos.providers.upsert(&provider).await.unwrap();

    let now = Utc::now();
    let mut payload = ProviderOrderPayload {
        creation_context: Some(json!({"orderId": "abc"})),
        ..Default::default()
    };
    payload.scheduled_replays.push(ScheduledReplayEntry {
        id: "sched-1".to_string(),
        requested_amount: Some(95.0),
        currency: Some("USD".to_string()),
        scheduled_for: now - Duration::minutes(5),
        status: "scheduled".to_string(),
        rule_ids: vec![],
        rule_metadata: Default::default(),
        response: None,
        error: None,
    });
    let provider_order = fulfillment_types::FulfillmentProviderOrder {
        id: Uuid::new_v4(),
        provider_id: "prov-1".to_string(),
        service_id: "svc-1".to_string(),
        service_action: "order".to_string(),
        order_id: Uuid::new_v4(),
        order_item_id: Uuid::new_v4(),
        amount: Decimal::new(9500, 2),
        currency: "USD".to_string(),
        provider_name: None,
        payload,
        created_at: now,
        updated_at: now,
    };
    repos.provider_orders.insert(&provider_order).await.unwrap();

    let automation = Arc::new(ProviderAutomationService::new(repos.clone()));
    let worker = ReplayWorker::new(repos.clone(), automation.clone(), ReplayWorkerConfig::default());
    let run = worker.run_once().await.unwrap();
    assert_eq!(run.processed, 1);
    assert_eq!(run.succeeded, 1);

    let stored = repos.provider_orders.get(provider_order.id).await.unwrap();
    assert_eq!(stored.payload.scheduled_replays[0].status, "executed");
    assert_eq!(stored.payload.replays.len(), 1);
    assert_eq!(stored.payload.replays[0].status, "executed");

    let (snapshot, _) = fulfillment_automation::build_snapshot(&repos).await.unwrap();
    assert_eq!(snapshot.replays.executed, 1);
    assert_eq!(snapshot.replays.scheduled, 0);
}
