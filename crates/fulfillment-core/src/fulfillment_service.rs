//! Fulfillment service (C5): kickoff, task materialization, status
//! recomputation, retry scheduling, and progress rollup (§4.5).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fulfillment_automation::{extract_overrides, ProviderAutomationService};
use fulfillment_storage::Repositories;
use fulfillment_types::{
	DomainError, FulfillmentTask, FulfillmentTaskStatus, FulfillmentTaskType, NotificationKind, Order, OrderItem,
	OrderStateActorType, OrderStatus, Product,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::notifications::NotificationDispatch;
use crate::state_machine::{OrderStateMachine, TransitionActor};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FulfillmentProgress {
	pub total_tasks: i64,
	pub completed_tasks: i64,
	pub failed_tasks: i64,
	pub in_progress_tasks: i64,
	pub progress_percentage: f64,
	pub items_count: i64,
	pub order_status: String,
}

struct TaskCounts {
	total: i64,
	completed: i64,
	failed: i64,
	in_progress: i64,
}

pub struct FulfillmentService {
	repositories: Repositories,
	state_machine: Arc<OrderStateMachine>,
	automation: Arc<ProviderAutomationService>,
	notifications: Arc<dyn NotificationDispatch>,
}

impl FulfillmentService {
	pub fn new(
		repositories: Repositories,
		state_machine: Arc<OrderStateMachine>,
		automation: Arc<ProviderAutomationService>,
		notifications: Arc<dyn NotificationDispatch>,
	) -> Self {
		Self { repositories, state_machine, automation, notifications }
	}

	/// `processOrderFulfillment(orderId)` (§4.5.1). Returns `false` for a
	/// no-op (order not pending); `true` once kickoff committed.
	#[tracing::instrument(skip(self), fields(order_id = %order_id))]
	pub async fn process_order_fulfillment(&self, order_id: Uuid) -> Result<bool, DomainError> {
		let order = self.repositories.orders.get(order_id).await?;
		if order.status != OrderStatus::Pending {
			return Ok(false);
		}
		let items = self.repositories.order_items.list_by_order(order_id).await?;

		let transitioned = self
			.state_machine
			.transition(
				order_id,
				OrderStatus::Processing,
				TransitionActor { actor_type: Some(OrderStateActorType::System), ..Default::default() },
			)
			.await?;

		match self.materialize_and_dispatch(&transitioned, &items).await {
			Ok(()) => {
				if let Some(user_id) = transitioned.user_id {
					self.notifications
						.dispatch(
							NotificationKind::OrderStatusUpdate,
							user_id,
							json!({"orderNumber": transitioned.order_number, "status": "processing"}),
						)
						.await;
				}
				Ok(true)
			}
			Err(err) => {
				tracing::error!(order_id = %order_id, error = %err, "kickoff failed, reverting order to pending");
				if let Err(revert_err) = self
					.state_machine
					.transition(
						order_id,
						OrderStatus::Pending,
						TransitionActor { actor_type: Some(OrderStateActorType::System), ..Default::default() },
					)
					.await
				{
					tracing::error!(order_id = %order_id, error = %revert_err, "failed to revert order to pending after kickoff failure");
				}
				Err(err)
			}
		}
	}

	async fn materialize_and_dispatch(&self, order: &Order, items: &[OrderItem]) -> Result<(), DomainError> {
		let now = Utc::now();
		let mut inserted_task_ids: Vec<Uuid> = Vec::new();

		let result: Result<(), DomainError> = async {
			for item in items {
				let product = match item.product_id {
					Some(product_id) => self.repositories.products.get(product_id).await.ok(),
					None => None,
				};
				let overrides = extract_overrides(item);

				let (tasks, provider_orders): (Vec<FulfillmentTask>, Vec<Result<_, DomainError>>) = tokio::join!(
					async { materialize_tasks(order, item, product.as_ref(), now) },
					async {
						let mut results = Vec::new();
						for override_ in &overrides {
							results.push(self.automation.create_provider_order(order, item, override_).await);
						}
						results
					}
				);

				for task in &tasks {
					self.repositories.tasks.insert(task).await?;
					inserted_task_ids.push(task.id);
				}
				for provider_order in provider_orders {
					provider_order?;
				}
			}
			Ok(())
		}
		.await;

		if result.is_err() {
			for task_id in &inserted_task_ids {
				if let Ok(mut task) = self.repositories.tasks.get(*task_id).await {
					task.status = FulfillmentTaskStatus::Cancelled;
					let _ = self.repositories.tasks.update(&task).await;
				}
			}
		}
		result
	}

	/// On every task status update, recompute the owning order's status
	/// from the aggregate task counts across *every* item of the order
	/// (§4.5.4).
	#[tracing::instrument(skip(self), fields(order_id = %order_id))]
	pub async fn recompute_order_status(&self, order_id: Uuid) -> Result<(), DomainError> {
		let order = self.repositories.orders.get(order_id).await?;
		if order.status == OrderStatus::Canceled {
			return Ok(());
		}
		let counts = self.task_counts(order_id).await?;

		let target = if counts.failed > 0 {
			Some(OrderStatus::OnHold)
		} else if counts.total > 0 && counts.completed == counts.total {
			Some(OrderStatus::Completed)
		} else if counts.in_progress + counts.completed > 0 {
			Some(OrderStatus::Active)
		} else {
			None
		};

		let Some(target) = target else {
			return Ok(());
		};
		if target == order.status {
			return Ok(());
		}

		match self
			.state_machine
			.transition(order_id, target, TransitionActor { actor_type: Some(OrderStateActorType::System), ..Default::default() })
			.await
		{
			Ok(updated) => {
				if let Some(user_id) = updated.user_id {
					let kind = if target == OrderStatus::Completed {
						NotificationKind::FulfillmentCompletion
					} else {
						NotificationKind::OrderStatusUpdate
					};
					self.notifications
						.dispatch(kind, user_id, json!({"orderNumber": updated.order_number, "status": target.as_str()}))
						.await;
				}
				Ok(())
			}
			Err(err) => {
				tracing::warn!(order_id = %order_id, error = %err, "skipping invalid recompute transition");
				Ok(())
			}
		}
	}

	async fn task_counts(&self, order_id: Uuid) -> Result<TaskCounts, DomainError> {
		let items = self.repositories.order_items.list_by_order(order_id).await?;
		let mut counts = TaskCounts { total: 0, completed: 0, failed: 0, in_progress: 0 };
		for item in &items {
			let tasks = self.repositories.tasks.list_by_item(item.id).await?;
			for task in &tasks {
				counts.total += 1;
				match task.status {
					FulfillmentTaskStatus::Completed => counts.completed += 1,
					FulfillmentTaskStatus::Failed => counts.failed += 1,
					FulfillmentTaskStatus::InProgress => counts.in_progress += 1,
					FulfillmentTaskStatus::Pending | FulfillmentTaskStatus::Cancelled => {}
				}
			}
		}
		Ok(counts)
	}

	/// `scheduleRetry(task, delay, errorMessage)` (§4.5.5).
	pub async fn schedule_retry(
		&self,
		task: &mut FulfillmentTask,
		delay: Duration,
		error_message: &str,
	) -> Result<(), DomainError> {
		task.status = FulfillmentTaskStatus::Pending;
		task.retry_count += 1;
		task.started_at = None;
		task.completed_at = None;
		task.result = None;
		task.error_message = Some(error_message.to_string());
		let base = task.scheduled_at.unwrap_or_else(Utc::now);
		task.scheduled_at = Some(base + delay);
		task.updated_at = Utc::now();
		self.repositories.tasks.update(task).await?;

		let item = self.repositories.order_items.get(task.order_item_id).await?;
		if let Ok(order) = self.repositories.orders.get(item.order_id).await {
			if let Some(user_id) = order.user_id {
				self.notifications
					.dispatch(
						NotificationKind::FulfillmentRetry,
						user_id,
						json!({"taskTitle": task.title, "retryCount": task.retry_count, "orderNumber": order.order_number}),
					)
					.await;
			}
		}
		Ok(())
	}

	/// `getOrderFulfillmentProgress(orderId)` (§4.5.6).
	pub async fn order_fulfillment_progress(&self, order_id: Uuid) -> Result<FulfillmentProgress, DomainError> {
		let order = self.repositories.orders.get(order_id).await?;
		let items = self.repositories.order_items.list_by_order(order_id).await?;
		let counts = self.task_counts(order_id).await?;
		let percentage = if counts.total == 0 {
			0.0
		} else {
			(counts.completed as f64 / counts.total as f64 * 100.0 * 100.0).round() / 100.0
		};
		Ok(FulfillmentProgress {
			total_tasks: counts.total,
			completed_tasks: counts.completed,
			failed_tasks: counts.failed,
			in_progress_tasks: counts.in_progress,
			progress_percentage: percentage,
			items_count: items.len() as i64,
			order_status: order.status.as_str().to_string(),
		})
	}
}

fn frozen_context(order: &Order, item: &OrderItem, product: Option<&Product>) -> Value {
	json!({
		"order": {"id": order.id, "order_number": order.order_number, "currency": order.currency},
		"item": {"id": item.id, "product_title": item.product_title, "quantity": item.quantity, "total_price": item.total_price.to_string()},
		"product": product.map(|p| json!({"id": p.id, "slug": p.slug, "category": p.category})),
	})
}

/// `_calculateGrowthTargets(itemTotalPrice)` (§4.5.2.1).
fn growth_targets(item_total_price: Decimal) -> Value {
	if item_total_price >= Decimal::new(50000, 2) {
		json!({"followers": 2000, "engagementRate": 8.0, "dailyActions": 65})
	} else if item_total_price >= Decimal::new(30000, 2) {
		json!({"followers": 1000, "engagementRate": 6.0, "dailyActions": 35})
	} else {
		json!({"followers": 500, "engagementRate": 4.0, "dailyActions": 20})
	}
}

fn new_task(
	item: &OrderItem,
	task_type: FulfillmentTaskType,
	title: &str,
	description: Option<&str>,
	payload: Value,
	scheduled_at: DateTime<Utc>,
	max_retries: i32,
	now: DateTime<Utc>,
) -> FulfillmentTask {
	FulfillmentTask {
		id: Uuid::new_v4(),
		order_item_id: item.id,
		task_type,
		status: FulfillmentTaskStatus::Pending,
		title: title.to_string(),
		description: description.map(str::to_string),
		payload: Some(payload),
		result: None,
		error_message: None,
		retry_count: 0,
		max_retries,
		scheduled_at: Some(scheduled_at),
		started_at: None,
		completed_at: None,
		created_at: now,
		updated_at: now,
	}
}

fn instagram_tasks(_order: &Order, item: &OrderItem, _product: Option<&Product>, now: DateTime<Utc>) -> Vec<FulfillmentTask> {
	vec![
		new_task(
			item,
			FulfillmentTaskType::InstagramSetup,
			"Instagram Account Setup",
			Some("Links and verifies the customer's Instagram account for automated management."),
			json!({"step": "account_verification", "platform": "instagram"}),
			now + Duration::hours(1),
			3,
			now,
		),
		new_task(
			item,
			FulfillmentTaskType::AnalyticsCollection,
			"Baseline Analytics Collection",
			Some("Captures the account's starting metrics before growth activity begins."),
			json!({"step": "baseline_metrics", "platform": "instagram"}),
			now + Duration::hours(2),
			3,
			now,
		),
		new_task(
			item,
			FulfillmentTaskType::FollowerGrowth,
			"Follower Growth Campaign",
			Some("Runs the provider-side follower growth campaign against the tiered targets."),
			json!({"step": "growth_campaign", "platform": "instagram", "targets": growth_targets(item.total_price)}),
			now + Duration::hours(24),
			3,
			now,
		),
		new_task(
			item,
			FulfillmentTaskType::EngagementBoost,
			"Engagement Boost Campaign",
			Some("Runs the provider-side engagement boost campaign."),
			json!({"step": "engagement_campaign", "platform": "instagram"}),
			now + Duration::hours(48),
			3,
			now,
		),
	]
}

fn generic_task(item: &OrderItem, now: DateTime<Utc>) -> FulfillmentTask {
	new_task(
		item,
		FulfillmentTaskType::ContentPromotion,
		"Content Promotion",
		None,
		json!({}),
		now + Duration::hours(24),
		3,
		now,
	)
}

/// Schedule resolution precedence (§4.5.3): offset seconds, then
/// minutes, then hours (first present wins); else an explicit
/// `scheduled_at`; else now.
fn resolve_scheduled_at(configured: &fulfillment_types::ConfiguredTask, now: DateTime<Utc>) -> DateTime<Utc> {
	if let Some(seconds) = configured.schedule_offset_seconds {
		now + Duration::seconds(seconds)
	} else if let Some(minutes) = configured.schedule_offset_minutes {
		now + Duration::minutes(minutes)
	} else if let Some(hours) = configured.schedule_offset_hours {
		now + Duration::hours(hours)
	} else if let Some(scheduled_at) = configured.scheduled_at {
		scheduled_at
	} else {
		now
	}
}

fn configured_tasks(
	order: &Order,
	item: &OrderItem,
	product: &Product,
	configured: &[fulfillment_types::ConfiguredTask],
	now: DateTime<Utc>,
) -> Vec<FulfillmentTask> {
	let mut tasks = Vec::new();
	for entry in configured {
		let task_type: FulfillmentTaskType = match entry.task_type.parse() {
			Ok(t) => t,
			Err(_) => {
				tracing::warn!(task_type = %entry.task_type, "skipping unknown configured task type");
				continue;
			}
		};
		let context = frozen_context(order, item, Some(product));
		let payload = json!({
			"execution": entry.execution.clone(),
			"context": context,
			"payload": entry.payload.clone(),
		});
		let max_retries = entry.max_retries.filter(|r| *r >= 0).unwrap_or(3);
		let title = entry.title.clone().unwrap_or_else(|| task_type.as_str().to_string());
		tasks.push(new_task(
			item,
			task_type,
			&title,
			entry.description.as_deref(),
			payload,
			resolve_scheduled_at(entry, now),
			max_retries,
			now,
		));
	}
	tasks
}

/// Task materialization (§4.5.2/§4.5.3): product-configured tasks win,
/// else category defaults (instagram's 4-task graph, else a single
/// generic content-promotion task).
fn materialize_tasks(order: &Order, item: &OrderItem, product: Option<&Product>, now: DateTime<Utc>) -> Vec<FulfillmentTask> {
	if let Some(product) = product {
		if let Some(config) = &product.fulfillment_config {
			if !config.tasks.is_empty() {
				let tasks = configured_tasks(order, item, product, &config.tasks, now);
				if !tasks.is_empty() {
					return tasks;
				}
			}
		}
		if product.category == "instagram" {
			return instagram_tasks(order, item, Some(product), now);
		}
	}
	vec![generic_task(item, now)]
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_types::{OrderSource, ProductStatus};

	fn order() -> Order {
		let now = Utc::now();
		Order {
			id: Uuid::new_v4(),
			order_number: "ORD-1".to_string(),
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

	fn item(order_id: Uuid, total_price: Decimal) -> OrderItem {
		let now = Utc::now();
		OrderItem {
			id: Uuid::new_v4(),
			order_id,
			product_id: None,
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

	fn product(category: &str) -> Product {
		Product {
			id: Uuid::new_v4(),
			slug: "instagram-growth".to_string(),
			title: "Instagram Growth".to_string(),
			category: category.to_string(),
			base_price: Decimal::new(29900, 2),
			currency: "USD".to_string(),
			status: ProductStatus::Active,
			fulfillment_config: None,
		}
	}

	#[test]
	fn instagram_category_materializes_four_tasks() {
		let order = order();
		let item = item(order.id, Decimal::new(29900, 2));
		let product = product("instagram");
		let now = Utc::now();
		let tasks = materialize_tasks(&order, &item, Some(&product), now);
		assert_eq!(tasks.len(), 4);
		let types: Vec<_> = tasks.iter().map(|t| t.task_type).collect();
		assert!(types.contains(&FulfillmentTaskType::InstagramSetup));
		assert!(types.contains(&FulfillmentTaskType::AnalyticsCollection));
		assert!(types.contains(&FulfillmentTaskType::FollowerGrowth));
		assert!(types.contains(&FulfillmentTaskType::EngagementBoost));
	}

	#[test]
	fn non_instagram_category_without_config_gets_generic_task() {
		let order = order();
		let item = item(order.id, Decimal::new(10000, 2));
		let product = product("general");
		let tasks = materialize_tasks(&order, &item, Some(&product), Utc::now());
		assert_eq!(tasks.len(), 1);
		assert_eq!(tasks[0].task_type, FulfillmentTaskType::ContentPromotion);
	}

	#[test]
	fn growth_targets_follow_price_tiers() {
		assert_eq!(growth_targets(Decimal::new(50000, 2))["followers"], json!(2000));
		assert_eq!(growth_targets(Decimal::new(30000, 2))["followers"], json!(1000));
		assert_eq!(growth_targets(Decimal::new(10000, 2))["followers"], json!(500));
	}

	#[test]
	fn no_product_falls_back_to_generic_task() {
		let order = order();
		let item = item(order.id, Decimal::new(10000, 2));
		let tasks = materialize_tasks(&order, &item, None, Utc::now());
		assert_eq!(tasks.len(), 1);
		assert_eq!(tasks[0].task_type, FulfillmentTaskType::ContentPromotion);
	}
}
