//! Order endpoints (§6): create, fetch, list, admin status transition,
//! fulfillment progress rollup, and the state-event timeline.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use fulfillment_core::{FulfillmentProgress, OrderStateMachine, TransitionActor};
use fulfillment_types::{
	AddOn, DomainError, Order, OrderItem, OrderSource, OrderStateActorType, OrderStateEvent, OrderStatus,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::server::AppState;

const ALLOWED_CURRENCIES: &[&str] = &["USD", "EUR"];

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
	pub product_id: Uuid,
	#[serde(default = "default_quantity")]
	pub quantity: i64,
	#[serde(default)]
	pub add_ons: Vec<AddOn>,
	#[serde(default)]
	pub attributes: Option<Value>,
	#[serde(default)]
	pub platform_context: Option<Value>,
}

fn default_quantity() -> i64 {
	1
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
	#[serde(default)]
	pub user_id: Option<Uuid>,
	#[serde(default = "default_currency")]
	pub currency: String,
	#[serde(default = "default_source")]
	pub source: String,
	#[serde(default)]
	pub notes: Option<String>,
	pub items: Vec<CreateOrderItemRequest>,
}

fn default_currency() -> String {
	"USD".to_string()
}

fn default_source() -> String {
	"checkout".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
	#[serde(default)]
	pub skip: usize,
	#[serde(default = "default_limit")]
	pub limit: usize,
	pub status: Option<String>,
}

fn default_limit() -> usize {
	50
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
	pub status: String,
	#[serde(default)]
	pub notes: Option<String>,
}

/// `POST /orders` (§6): validates currency/source, resolves each item's
/// product (404 if missing), computes line and order totals, allocates
/// the next `SM######` order number, and persists order + items. Does
/// *not* kick off fulfillment — that happens once payment succeeds
/// (§4.8 step 4, first bullet).
pub async fn create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<Order>), DomainError> {
	let currency = request.currency.to_uppercase();
	if !ALLOWED_CURRENCIES.contains(&currency.as_str()) {
		return Err(DomainError::Validation(format!("unknown currency: {}", request.currency)));
	}
	let source = OrderSource::from_str(&request.source.to_lowercase())
		.map_err(|_| DomainError::Validation(format!("unknown order source: {}", request.source)))?;
	if request.items.is_empty() {
		return Err(DomainError::Validation("order must have at least one item".to_string()));
	}

	let mut items = Vec::with_capacity(request.items.len());
	for item_request in &request.items {
		let product = state.repositories.products.get(item_request.product_id).await?;
		let quantity = item_request.quantity.max(1);
		let unit_price = product.base_price;
		let total_price = unit_price * rust_decimal::Decimal::from(quantity);
		let now = Utc::now();
		items.push(OrderItem {
			id: Uuid::new_v4(),
			order_id: Uuid::nil(),
			product_id: Some(product.id),
			product_title: product.title,
			quantity,
			unit_price,
			total_price,
			add_ons: item_request.add_ons.clone(),
			attributes: item_request.attributes.clone(),
			platform_context: item_request.platform_context.clone(),
			created_at: now,
			updated_at: now,
		});
	}

	let subtotal = items.iter().fold(rust_decimal::Decimal::ZERO, |acc, item| acc + item.total_price);
	let tax = rust_decimal::Decimal::ZERO;
	let total = subtotal + tax;
	let order_number = state.repositories.orders.next_order_number().await?;
	let now = Utc::now();
	let order = Order {
		id: Uuid::new_v4(),
		order_number,
		user_id: request.user_id,
		status: OrderStatus::Pending,
		source,
		currency,
		subtotal,
		tax,
		total,
		notes: request.notes,
		items: vec![],
		created_at: now,
		updated_at: now,
	};

	state.repositories.orders.insert(&order).await?;
	for item in &mut items {
		item.order_id = order.id;
		state.repositories.order_items.insert(item).await?;
	}

	let mut created = order;
	created.items = items;
	Ok((axum::http::StatusCode::CREATED, Json(created)))
}

/// `GET /orders/{id}`.
pub async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, DomainError> {
	let mut order = state.repositories.orders.get(id).await?;
	order.items = state.repositories.order_items.list_by_order(id).await?;
	Ok(Json(order))
}

/// `GET /orders` with `skip`/`limit`/`status` query parameters.
pub async fn list_orders(
	State(state): State<AppState>,
	Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, DomainError> {
	let status_filter = match &query.status {
		Some(status) => Some(
			OrderStatus::from_str(status).map_err(|_| DomainError::Validation(format!("unknown order status: {status}")))?,
		),
		None => None,
	};
	let orders = state.repositories.orders.list(query.skip, query.limit, status_filter).await?;
	Ok(Json(orders))
}

/// `GET /orders/user/{userId}`.
pub async fn list_orders_by_user(
	State(state): State<AppState>,
	Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, DomainError> {
	Ok(Json(state.repositories.orders.list_by_user(user_id).await?))
}

/// `PATCH /orders/{id}/status` (§6): admin transition, recording an
/// order-state event through the same state machine every other
/// transition goes through (§4.7).
pub async fn update_order_status(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
	Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, DomainError> {
	let target = OrderStatus::from_str(&request.status)
		.map_err(|_| DomainError::Validation(format!("unknown order status: {}", request.status)))?;
	transition(&state.state_machine, id, target, request.notes).await
}

async fn transition(
	state_machine: &Arc<OrderStateMachine>,
	order_id: Uuid,
	target: OrderStatus,
	notes: Option<String>,
) -> Result<Json<Order>, DomainError> {
	let actor = TransitionActor {
		actor_type: Some(OrderStateActorType::Admin),
		notes,
		..Default::default()
	};
	let order = state_machine.transition(order_id, target, actor).await?;
	Ok(Json(order))
}

/// `GET /orders/{id}/progress` (§4.5.5).
pub async fn order_progress(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
) -> Result<Json<FulfillmentProgress>, DomainError> {
	Ok(Json(state.fulfillment_service.order_fulfillment_progress(id).await?))
}

/// `GET /orders/{id}/state-events`.
pub async fn order_state_events(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderStateEvent>>, DomainError> {
	Ok(Json(state.repositories.events.list_by_order(id).await?))
}
