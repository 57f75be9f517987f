//! Typed repositories (C1) built on top of the key/value `StorageService`.
//!
//! Every repository follows the same shape against
//! `StorageService::{store, retrieve, query}`: a thin wrapper that knows
//! its namespace, its indexed fields, and how to translate a
//! `StorageError` into the cross-crate `DomainError`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fulfillment_types::{
	DomainError, FulfillmentProvider, FulfillmentProviderOrder, FulfillmentServiceCatalogEntry,
	FulfillmentTask, FulfillmentTaskStatus, NotificationPreference, Order, OrderItem, OrderStateEvent,
	OrderStatus, Payment, ProcessorEvent, Product, ProviderAutomationRun, StorageKey, WebhookEvent,
	WebhookProvider,
};
use serde_json::json;
use uuid::Uuid;

use crate::{QueryFilter, StorageError, StorageIndexes, StorageService};

impl From<StorageError> for DomainError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => DomainError::NotFound("record not found".to_string()),
			other => DomainError::Transient(other.to_string()),
		}
	}
}

/// Bundles one repository per entity over a shared `StorageService`.
///
/// Constructed once at process start and cloned (cheaply, via `Arc`)
/// into every worker and API handler that needs persistence.
#[derive(Clone)]
pub struct Repositories {
	pub orders: OrderRepository,
	pub order_items: OrderItemRepository,
	pub tasks: TaskRepository,
	pub providers: ProviderRepository,
	pub services: ServiceRepository,
	pub provider_orders: ProviderOrderRepository,
	pub events: EventRepository,
	pub payments: PaymentRepository,
	pub webhooks: WebhookRepository,
	pub processor_events: ProcessorEventRepository,
	pub notification_preferences: NotificationPreferenceRepository,
	pub automation_runs: AutomationRunRepository,
	pub products: ProductRepository,
}

impl Repositories {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			orders: OrderRepository { storage: storage.clone() },
			order_items: OrderItemRepository { storage: storage.clone() },
			tasks: TaskRepository { storage: storage.clone() },
			providers: ProviderRepository { storage: storage.clone() },
			services: ServiceRepository { storage: storage.clone() },
			provider_orders: ProviderOrderRepository { storage: storage.clone() },
			events: EventRepository { storage: storage.clone() },
			payments: PaymentRepository { storage: storage.clone() },
			webhooks: WebhookRepository { storage: storage.clone() },
			processor_events: ProcessorEventRepository { storage: storage.clone() },
			notification_preferences: NotificationPreferenceRepository { storage: storage.clone() },
			automation_runs: AutomationRunRepository { storage: storage.clone() },
			products: ProductRepository { storage },
		}
	}
}

#[derive(Clone)]
pub struct OrderRepository {
	storage: Arc<StorageService>,
}

impl OrderRepository {
	pub async fn insert(&self, order: &Order) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("status", order.status.as_str())
			.with_field("order_number", &order.order_number)
			.with_field("user_id", order.user_id.map(|u| u.to_string()));
		self.storage.store(StorageKey::Orders.as_str(), &order.id.to_string(), order, Some(indexes)).await?;
		Ok(())
	}

	pub async fn get(&self, id: Uuid) -> Result<Order, DomainError> {
		Ok(self.storage.retrieve(StorageKey::Orders.as_str(), &id.to_string()).await?)
	}

	pub async fn get_by_number(&self, order_number: &str) -> Result<Order, DomainError> {
		let matches: Vec<(String, Order)> = self
			.storage
			.query(
				StorageKey::Orders.as_str(),
				QueryFilter::Equals("order_number".to_string(), json!(order_number)),
			)
			.await?;
		matches.into_iter().next().map(|(_, o)| o).ok_or_else(|| {
			DomainError::NotFound(format!("order with number {order_number} not found"))
		})
	}

	pub async fn update(&self, order: &Order) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("status", order.status.as_str())
			.with_field("order_number", &order.order_number)
			.with_field("user_id", order.user_id.map(|u| u.to_string()));
		self.storage.update(StorageKey::Orders.as_str(), &order.id.to_string(), order, Some(indexes)).await?;
		Ok(())
	}

	/// `GET /orders` with `skip`/`limit`/`status_filter` (§6).
	pub async fn list(
		&self,
		skip: usize,
		limit: usize,
		status_filter: Option<OrderStatus>,
	) -> Result<Vec<Order>, DomainError> {
		let mut orders: Vec<(String, Order)> = match status_filter {
			Some(status) => {
				self.storage
					.query(
						StorageKey::Orders.as_str(),
						QueryFilter::Equals("status".to_string(), json!(status.as_str())),
					)
					.await?
			}
			None => self.storage.retrieve_all(StorageKey::Orders.as_str()).await?,
		};
		orders.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
		Ok(orders.into_iter().skip(skip).take(limit).map(|(_, o)| o).collect())
	}

	pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, DomainError> {
		let mut orders: Vec<(String, Order)> = self
			.storage
			.query(
				StorageKey::Orders.as_str(),
				QueryFilter::Equals("user_id".to_string(), json!(user_id.to_string())),
			)
			.await?;
		orders.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
		Ok(orders.into_iter().map(|(_, o)| o).collect())
	}

	/// Allocates the next `SM######` order number.
	///
	/// Uses the count of existing orders as the sequence source — adequate
	/// for the single-process deployment this core targets; a real
	/// multi-writer deployment would back this with a DB sequence instead
	/// (see DESIGN.md).
	pub async fn next_order_number(&self) -> Result<String, DomainError> {
		let all: Vec<(String, Order)> = self.storage.retrieve_all(StorageKey::Orders.as_str()).await?;
		let next = all.len() as u64 + 1;
		Ok(format!("SM{next:06}"))
	}
}

#[derive(Clone)]
pub struct OrderItemRepository {
	storage: Arc<StorageService>,
}

impl OrderItemRepository {
	pub async fn insert(&self, item: &OrderItem) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new().with_field("order_id", item.order_id.to_string());
		self.storage
			.store(StorageKey::OrderItems.as_str(), &item.id.to_string(), item, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn get(&self, id: Uuid) -> Result<OrderItem, DomainError> {
		Ok(self.storage.retrieve(StorageKey::OrderItems.as_str(), &id.to_string()).await?)
	}

	pub async fn update(&self, item: &OrderItem) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new().with_field("order_id", item.order_id.to_string());
		self.storage
			.update(StorageKey::OrderItems.as_str(), &item.id.to_string(), item, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
		let items: Vec<(String, OrderItem)> = self
			.storage
			.query(
				StorageKey::OrderItems.as_str(),
				QueryFilter::Equals("order_id".to_string(), json!(order_id.to_string())),
			)
			.await?;
		Ok(items.into_iter().map(|(_, i)| i).collect())
	}
}

#[derive(Clone)]
pub struct TaskRepository {
	storage: Arc<StorageService>,
}

impl TaskRepository {
	pub async fn insert(&self, task: &FulfillmentTask) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("order_item_id", task.order_item_id.to_string())
			.with_field("status", serde_json::to_value(task.status).unwrap_or(json!(null)));
		self.storage
			.store(StorageKey::FulfillmentTasks.as_str(), &task.id.to_string(), task, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn get(&self, id: Uuid) -> Result<FulfillmentTask, DomainError> {
		Ok(self.storage.retrieve(StorageKey::FulfillmentTasks.as_str(), &id.to_string()).await?)
	}

	pub async fn update(&self, task: &FulfillmentTask) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("order_item_id", task.order_item_id.to_string())
			.with_field("status", serde_json::to_value(task.status).unwrap_or(json!(null)));
		self.storage
			.update(StorageKey::FulfillmentTasks.as_str(), &task.id.to_string(), task, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn list_by_item(&self, order_item_id: Uuid) -> Result<Vec<FulfillmentTask>, DomainError> {
		let tasks: Vec<(String, FulfillmentTask)> = self
			.storage
			.query(
				StorageKey::FulfillmentTasks.as_str(),
				QueryFilter::Equals("order_item_id".to_string(), json!(order_item_id.to_string())),
			)
			.await?;
		Ok(tasks.into_iter().map(|(_, t)| t).collect())
	}

	/// Tasks the processor loop (C6) should claim this iteration: `pending`
	/// and `scheduledAt <= now`, ordered by `scheduledAt` ascending, capped
	/// at `batch_size` (§4.6).
	pub async fn list_due(
		&self,
		now: DateTime<Utc>,
		batch_size: usize,
	) -> Result<Vec<FulfillmentTask>, DomainError> {
		let pending: Vec<(String, FulfillmentTask)> = self
			.storage
			.query(
				StorageKey::FulfillmentTasks.as_str(),
				QueryFilter::Equals(
					"status".to_string(),
					serde_json::to_value(FulfillmentTaskStatus::Pending).unwrap_or(json!(null)),
				),
			)
			.await?;
		let mut due: Vec<FulfillmentTask> = pending
			.into_iter()
			.map(|(_, t)| t)
			.filter(|t| t.scheduled_at.map(|s| s <= now).unwrap_or(true))
			.collect();
		due.sort_by_key(|t| t.scheduled_at.unwrap_or(now));
		due.truncate(batch_size);
		Ok(due)
	}
}

#[derive(Clone)]
pub struct ProviderRepository {
	storage: Arc<StorageService>,
}

impl ProviderRepository {
	pub async fn get(&self, id: &str) -> Result<FulfillmentProvider, DomainError> {
		Ok(self.storage.retrieve(StorageKey::FulfillmentProviders.as_str(), id).await?)
	}

	pub async fn upsert(&self, provider: &FulfillmentProvider) -> Result<(), DomainError> {
		self.storage.store(StorageKey::FulfillmentProviders.as_str(), &provider.id, provider, None).await?;
		Ok(())
	}

	pub async fn list(&self) -> Result<Vec<FulfillmentProvider>, DomainError> {
		let all: Vec<(String, FulfillmentProvider)> =
			self.storage.retrieve_all(StorageKey::FulfillmentProviders.as_str()).await?;
		Ok(all.into_iter().map(|(_, p)| p).collect())
	}
}

#[derive(Clone)]
pub struct ServiceRepository {
	storage: Arc<StorageService>,
}

impl ServiceRepository {
	pub async fn get(&self, id: &str) -> Result<FulfillmentServiceCatalogEntry, DomainError> {
		Ok(self.storage.retrieve(StorageKey::FulfillmentServices.as_str(), id).await?)
	}

	pub async fn upsert(&self, service: &FulfillmentServiceCatalogEntry) -> Result<(), DomainError> {
		self.storage.store(StorageKey::FulfillmentServices.as_str(), &service.id, service, None).await?;
		Ok(())
	}

	pub async fn list(&self) -> Result<Vec<FulfillmentServiceCatalogEntry>, DomainError> {
		let all: Vec<(String, FulfillmentServiceCatalogEntry)> =
			self.storage.retrieve_all(StorageKey::FulfillmentServices.as_str()).await?;
		Ok(all.into_iter().map(|(_, s)| s).collect())
	}
}

#[derive(Clone)]
pub struct ProviderOrderRepository {
	storage: Arc<StorageService>,
}

impl ProviderOrderRepository {
	pub async fn insert(&self, po: &FulfillmentProviderOrder) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("order_id", po.order_id.to_string())
			.with_field("order_item_id", po.order_item_id.to_string())
			.with_field("provider_id", &po.provider_id);
		self.storage
			.store(StorageKey::FulfillmentProviderOrders.as_str(), &po.id.to_string(), po, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn get(&self, id: Uuid) -> Result<FulfillmentProviderOrder, DomainError> {
		Ok(self.storage.retrieve(StorageKey::FulfillmentProviderOrders.as_str(), &id.to_string()).await?)
	}

	pub async fn update(&self, po: &FulfillmentProviderOrder) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("order_id", po.order_id.to_string())
			.with_field("order_item_id", po.order_item_id.to_string())
			.with_field("provider_id", &po.provider_id);
		self.storage
			.update(StorageKey::FulfillmentProviderOrders.as_str(), &po.id.to_string(), po, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<FulfillmentProviderOrder>, DomainError> {
		let pos: Vec<(String, FulfillmentProviderOrder)> = self
			.storage
			.query(
				StorageKey::FulfillmentProviderOrders.as_str(),
				QueryFilter::Equals("order_id".to_string(), json!(order_id.to_string())),
			)
			.await?;
		Ok(pos.into_iter().map(|(_, p)| p).collect())
	}

	pub async fn list_all(&self) -> Result<Vec<FulfillmentProviderOrder>, DomainError> {
		let all: Vec<(String, FulfillmentProviderOrder)> =
			self.storage.retrieve_all(StorageKey::FulfillmentProviderOrders.as_str()).await?;
		Ok(all.into_iter().map(|(_, p)| p).collect())
	}

	/// Provider-orders with at least one `scheduledReplays[]` entry whose
	/// `status == "scheduled"` and `scheduledFor <= now` (§4.4 step 1).
	pub async fn list_with_due_scheduled_replays(
		&self,
		now: DateTime<Utc>,
	) -> Result<Vec<FulfillmentProviderOrder>, DomainError> {
		let all = self.list_all().await?;
		Ok(all
			.into_iter()
			.filter(|po| {
				po.payload
					.scheduled_replays
					.iter()
					.any(|r| r.status == "scheduled" && r.scheduled_for <= now)
			})
			.collect())
	}
}

#[derive(Clone)]
pub struct EventRepository {
	storage: Arc<StorageService>,
}

impl EventRepository {
	/// Append-only insert (§4.7: `recordEvent` never mutates or deletes).
	pub async fn insert(&self, event: &OrderStateEvent) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new().with_field("order_id", event.order_id.to_string());
		self.storage
			.store(StorageKey::OrderStateEvents.as_str(), &event.id.to_string(), event, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<OrderStateEvent>, DomainError> {
		let mut events: Vec<(String, OrderStateEvent)> = self
			.storage
			.query(
				StorageKey::OrderStateEvents.as_str(),
				QueryFilter::Equals("order_id".to_string(), json!(order_id.to_string())),
			)
			.await?;
		events.sort_by_key(|(_, e)| e.created_at);
		Ok(events.into_iter().map(|(_, e)| e).collect())
	}
}

#[derive(Clone)]
pub struct PaymentRepository {
	storage: Arc<StorageService>,
}

impl PaymentRepository {
	pub async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("provider_reference", &payment.provider_reference)
			.with_field("order_id", payment.order_id.to_string());
		self.storage
			.store(StorageKey::Payments.as_str(), &payment.id.to_string(), payment, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn get_by_reference(&self, reference: &str) -> Result<Option<Payment>, DomainError> {
		let matches: Vec<(String, Payment)> = self
			.storage
			.query(
				StorageKey::Payments.as_str(),
				QueryFilter::Equals("provider_reference".to_string(), json!(reference)),
			)
			.await?;
		Ok(matches.into_iter().next().map(|(_, p)| p))
	}

	pub async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("provider_reference", &payment.provider_reference)
			.with_field("order_id", payment.order_id.to_string());
		self.storage
			.update(StorageKey::Payments.as_str(), &payment.id.to_string(), payment, Some(indexes))
			.await?;
		Ok(())
	}
}

#[derive(Clone)]
pub struct WebhookRepository {
	storage: Arc<StorageService>,
}

impl WebhookRepository {
	pub async fn find(
		&self,
		provider: WebhookProvider,
		external_id: &str,
	) -> Result<Option<WebhookEvent>, DomainError> {
		let key = format!("{provider:?}:{external_id}").to_lowercase();
		match self.storage.retrieve::<WebhookEvent>(StorageKey::WebhookEvents.as_str(), &key).await {
			Ok(event) => Ok(Some(event)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Insert-then-commit dedup row (§4.8 step 5, §5 "webhook dedup").
	pub async fn insert(&self, event: &WebhookEvent) -> Result<(), DomainError> {
		let key = format!("{:?}:{}", event.provider, event.external_id).to_lowercase();
		self.storage.store(StorageKey::WebhookEvents.as_str(), &key, event, None).await?;
		Ok(())
	}
}

#[derive(Clone)]
pub struct ProcessorEventRepository {
	storage: Arc<StorageService>,
}

impl ProcessorEventRepository {
	pub async fn find_by_payload_hash(
		&self,
		provider: WebhookProvider,
		payload_hash: &str,
	) -> Result<Option<ProcessorEvent>, DomainError> {
		let matches: Vec<(String, ProcessorEvent)> = self
			.storage
			.query(
				StorageKey::ProcessorEvents.as_str(),
				QueryFilter::Equals("payload_hash".to_string(), json!(payload_hash)),
			)
			.await?;
		Ok(matches.into_iter().map(|(_, e)| e).find(|e| e.provider == provider))
	}

	pub async fn insert(&self, event: &ProcessorEvent) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new().with_field("payload_hash", &event.payload_hash);
		let key = format!("{:?}:{}", event.provider, event.external_id).to_lowercase();
		self.storage.store(StorageKey::ProcessorEvents.as_str(), &key, event, Some(indexes)).await?;
		Ok(())
	}

	pub async fn update(&self, event: &ProcessorEvent) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new().with_field("payload_hash", &event.payload_hash);
		let key = format!("{:?}:{}", event.provider, event.external_id).to_lowercase();
		self.storage.update(StorageKey::ProcessorEvents.as_str(), &key, event, Some(indexes)).await?;
		Ok(())
	}
}

#[derive(Clone)]
pub struct NotificationPreferenceRepository {
	storage: Arc<StorageService>,
}

impl NotificationPreferenceRepository {
	/// Absence of a row defaults every flag per `NotificationPreference::default`.
	pub async fn get(&self, user_id: Uuid) -> Result<NotificationPreference, DomainError> {
		match self
			.storage
			.retrieve::<NotificationPreference>(StorageKey::NotificationPreferences.as_str(), &user_id.to_string())
			.await
		{
			Ok(pref) => Ok(pref),
			Err(StorageError::NotFound) => Ok(NotificationPreference { user_id, ..Default::default() }),
			Err(e) => Err(e.into()),
		}
	}

	pub async fn upsert(&self, pref: &NotificationPreference) -> Result<(), DomainError> {
		self.storage
			.store(StorageKey::NotificationPreferences.as_str(), &pref.user_id.to_string(), pref, None)
			.await?;
		Ok(())
	}
}

#[derive(Clone)]
pub struct AutomationRunRepository {
	storage: Arc<StorageService>,
}

impl AutomationRunRepository {
	pub async fn insert(&self, run: &ProviderAutomationRun) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new()
			.with_field("run_type", serde_json::to_value(run.run_type).unwrap_or(json!(null)));
		self.storage
			.store(StorageKey::ProviderAutomationRuns.as_str(), &run.id.to_string(), run, Some(indexes))
			.await?;
		Ok(())
	}

	pub async fn list_recent(&self, limit: usize) -> Result<Vec<ProviderAutomationRun>, DomainError> {
		let mut all: Vec<(String, ProviderAutomationRun)> =
			self.storage.retrieve_all(StorageKey::ProviderAutomationRuns.as_str()).await?;
		all.sort_by(|a, b| b.1.finished_at.cmp(&a.1.finished_at));
		Ok(all.into_iter().take(limit).map(|(_, r)| r).collect())
	}
}

#[derive(Clone)]
pub struct ProductRepository {
	storage: Arc<StorageService>,
}

impl ProductRepository {
	pub async fn get(&self, id: Uuid) -> Result<Product, DomainError> {
		Ok(self.storage.retrieve(StorageKey::Products.as_str(), &id.to_string()).await?)
	}

	pub async fn get_by_slug(&self, slug: &str) -> Result<Product, DomainError> {
		let matches: Vec<(String, Product)> = self
			.storage
			.query(StorageKey::Products.as_str(), QueryFilter::Equals("slug".to_string(), json!(slug)))
			.await?;
		matches.into_iter().next().map(|(_, p)| p).ok_or_else(|| DomainError::NotFound(format!("product {slug}")))
	}

	pub async fn upsert(&self, product: &Product) -> Result<(), DomainError> {
		let indexes = StorageIndexes::new().with_field("slug", &product.slug);
		self.storage.store(StorageKey::Products.as_str(), &product.id.to_string(), product, Some(indexes)).await?;
		Ok(())
	}

	pub async fn list(&self) -> Result<Vec<Product>, DomainError> {
		let all: Vec<(String, Product)> = self.storage.retrieve_all(StorageKey::Products.as_str()).await?;
		Ok(all.into_iter().map(|(_, p)| p).collect())
	}
}
