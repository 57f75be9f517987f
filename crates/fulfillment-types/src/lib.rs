//! Shared domain types for the fulfillment orchestration core.
//!
//! This crate defines the data model shared by every other crate in the
//! workspace: orders, products, fulfillment tasks, provider orders, the
//! state-event audit log, payments, webhooks, notifications, and the
//! cross-crate error taxonomy used to surface failures consistently.

/// Error taxonomy shared across crates (§7 of the design).
pub mod error;
/// Event bus types for inter-service communication.
pub mod events;
/// Fulfillment task types: status, task kind, and the task record itself.
pub mod fulfillment;
/// Notification preference and delivery record types.
pub mod notification;
/// Order, order item, and order state-event types.
pub mod order;
/// Payment record types.
pub mod payment;
/// Product catalog and fulfillment-config types.
pub mod product;
/// Fulfillment provider / provider-order types.
pub mod provider;
/// Configuration validation DSL shared by every pluggable backend.
pub mod schema;
/// Storage key enumeration shared by every repository.
pub mod storage;
/// Webhook and processor-event dedup ledger types.
pub mod webhook;

pub use error::{DomainError, ErrorKind};
pub use events::FulfillmentEvent;
pub use fulfillment::{FulfillmentTask, FulfillmentTaskStatus, FulfillmentTaskType};
pub use notification::{NotificationEvent, NotificationKind, NotificationPreference};
pub use order::{Order, OrderItem, OrderSource, OrderStateActorType, OrderStateEvent, OrderStateEventType, OrderStatus};
pub use payment::{Payment, PaymentProvider, PaymentStatus};
pub use product::{ConfiguredTask, FulfillmentConfig, Product, ProductStatus};
pub use provider::{
	EndpointDescriptor, FulfillmentProvider, FulfillmentProviderOrder, FulfillmentServiceCatalogEntry,
	Guardrails, ProviderAutomationRun, ProviderAutomationRunType, ProviderOrderPayload, RefillEntry,
	ReplayEntry, ScheduledReplayEntry, ServiceRule,
};
pub use schema::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
pub use storage::StorageKey;
pub use webhook::{ProcessorEvent, WebhookEvent, WebhookProvider};
