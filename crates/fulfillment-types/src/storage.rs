//! Storage keys for the typed repositories in `fulfillment-storage`.

/// Namespaces used to key records in the underlying byte store.
///
/// Mirrors the relational tables described in §3/§6 of the design: each
/// variant becomes the `namespace` half of a `namespace:id` storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	Orders,
	OrderItems,
	FulfillmentTasks,
	FulfillmentProviders,
	FulfillmentServices,
	FulfillmentProviderOrders,
	OrderStateEvents,
	Payments,
	WebhookEvents,
	ProcessorEvents,
	NotificationPreferences,
	NotificationEvents,
	ProviderAutomationRuns,
	Products,
	/// Secondary index: order number -> order id.
	OrderNumberIndex,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderItems => "order_items",
			StorageKey::FulfillmentTasks => "fulfillment_tasks",
			StorageKey::FulfillmentProviders => "fulfillment_providers",
			StorageKey::FulfillmentServices => "fulfillment_services",
			StorageKey::FulfillmentProviderOrders => "fulfillment_provider_orders",
			StorageKey::OrderStateEvents => "order_state_events",
			StorageKey::Payments => "payments",
			StorageKey::WebhookEvents => "webhook_events",
			StorageKey::ProcessorEvents => "processor_events",
			StorageKey::NotificationPreferences => "notification_preferences",
			StorageKey::NotificationEvents => "notification_events",
			StorageKey::ProviderAutomationRuns => "provider_automation_runs",
			StorageKey::Products => "products",
			StorageKey::OrderNumberIndex => "order_number_index",
		}
	}

	/// Every namespace, used to build per-namespace TTL configuration fields.
	pub fn all() -> Vec<StorageKey> {
		vec![
			StorageKey::Orders,
			StorageKey::OrderItems,
			StorageKey::FulfillmentTasks,
			StorageKey::FulfillmentProviders,
			StorageKey::FulfillmentServices,
			StorageKey::FulfillmentProviderOrders,
			StorageKey::OrderStateEvents,
			StorageKey::Payments,
			StorageKey::WebhookEvents,
			StorageKey::ProcessorEvents,
			StorageKey::NotificationPreferences,
			StorageKey::NotificationEvents,
			StorageKey::ProviderAutomationRuns,
			StorageKey::Products,
			StorageKey::OrderNumberIndex,
		]
	}
}

impl std::str::FromStr for StorageKey {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.into_iter()
			.find(|k| k.as_str() == s)
			.ok_or_else(|| format!("unknown storage namespace: {s}"))
	}
}
