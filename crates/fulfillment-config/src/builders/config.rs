//! Configuration builder for creating test and development configurations.
//!
//! Provides utilities for constructing `Config` instances with sensible
//! defaults, particularly useful for testing scenarios.

use crate::{AppConfig, Config, ScheduledFeatureConfig, StorageConfig, WorkerConfig, WorkersConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	checkout_api_key: String,
	payment_provider_secret: String,
	database_url: String,
	frontend_url: String,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	fulfillment_worker_enabled: bool,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			checkout_api_key: "test-checkout-key".to_string(),
			payment_provider_secret: "whsec_test".to_string(),
			database_url: "postgres://localhost/test".to_string(),
			frontend_url: "https://app.example.test".to_string(),
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			fulfillment_worker_enabled: false,
		}
	}

	pub fn checkout_api_key(mut self, key: String) -> Self {
		self.checkout_api_key = key;
		self
	}

	pub fn database_url(mut self, url: String) -> Self {
		self.database_url = url;
		self
	}

	pub fn storage_primary(mut self, primary: String) -> Self {
		self.storage_primary = primary;
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	pub fn fulfillment_worker_enabled(mut self, enabled: bool) -> Self {
		self.fulfillment_worker_enabled = enabled;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(self.storage_primary.clone(), toml::Value::Table(Default::default()));

		Config {
			app: AppConfig {
				checkout_api_key: self.checkout_api_key,
				payment_provider_secret: self.payment_provider_secret,
				database_url: self.database_url,
				frontend_url: self.frontend_url,
				log_level: "debug".to_string(),
				smtp: None,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			workers: WorkersConfig {
				fulfillment: WorkerConfig { enabled: self.fulfillment_worker_enabled, interval_seconds: 1, limit: 10 },
				provider_replay: WorkerConfig { enabled: false, interval_seconds: 60, limit: 20 },
				provider_automation_alert: WorkerConfig { enabled: false, interval_seconds: 300, limit: 10 },
				weekly_digest: ScheduledFeatureConfig { enabled: false, interval_seconds: 86400 },
				catalog_job_scheduler: ScheduledFeatureConfig { enabled: false, interval_seconds: 3600 },
			},
			api: None,
		}
	}
}
