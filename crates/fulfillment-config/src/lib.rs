//! Configuration module for the fulfillment orchestration core.
//!
//! Supports loading configuration from a TOML file with `${VAR}` /
//! `${VAR:-default}` environment-variable interpolation, and provides
//! validation to ensure all required values are properly set before the
//! rest of the core starts up.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

pub mod loader;
/// `ConfigBuilder`, for constructing test/development configs without a TOML file.
#[cfg(feature = "testing")]
pub mod builders;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration for the fulfillment core (§6 "Environment").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub app: AppConfig,
	pub storage: StorageConfig,
	pub workers: WorkersConfig,
	pub api: Option<ApiConfig>,
}

/// Required secrets and addressing (§6: `CHECKOUT_API_KEY`,
/// `PAYMENT_PROVIDER_SECRET`, `DATABASE_URL`, `FRONTEND_URL`), plus the
/// optional SMTP settings and log-level directive.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
	/// Matched against the `X-API-Key` header on API-key-gated endpoints.
	pub checkout_api_key: String,
	/// Shared secret used to verify `stripe-signature` on inbound webhooks.
	pub payment_provider_secret: String,
	pub database_url: String,
	/// Base URL used to build hosted checkout return links.
	pub frontend_url: String,
	/// Tracing filter directive (`RUST_LOG` / `FULFILLMENT_LOG_LEVEL`).
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub smtp: Option<SmtpConfig>,
}

fn default_log_level() -> String {
	"info".to_string()
}

/// Outbound SMTP settings for the email notification backend (§4.10).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
	pub host: String,
	#[serde(default = "default_smtp_port")]
	pub port: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
	587
}

/// Configuration for the storage backend (§4.1).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use: `"memory"` | `"file"` (`STORAGE_BACKEND`).
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// One polling worker's enable flag, interval, and per-iteration batch
/// size (§6: `*_ENABLED`, `*_INTERVAL_SECONDS`, `*_LIMIT`).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WorkerConfig {
	#[serde(default)]
	pub enabled: bool,
	pub interval_seconds: u64,
	pub limit: usize,
}

/// A cron-triggered feature's enable flag and polling cadence. Unlike
/// `WorkerConfig` these have no per-run batch limit — their cadence comes
/// from the cron schedule file (§6 "Schedule file format"), not a fixed
/// interval loop; `interval_seconds` only bounds the scheduler's own
/// drift-detection poll.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ScheduledFeatureConfig {
	#[serde(default)]
	pub enabled: bool,
	pub interval_seconds: u64,
}

/// Feature flags and cadence for every background worker the supervisor
/// (C13) starts (§4.11, §6).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WorkersConfig {
	/// Task processor loop (C6): `FULFILLMENT_WORKER_ENABLED`.
	pub fulfillment: WorkerConfig,
	/// Scheduled-replay worker (C7): `PROVIDER_REPLAY_WORKER_ENABLED`.
	pub provider_replay: WorkerConfig,
	/// Guardrail/provider-alert sweep: `PROVIDER_AUTOMATION_ALERT_WORKER_ENABLED`.
	pub provider_automation_alert: WorkerConfig,
	/// `WEEKLY_DIGEST_ENABLED`.
	pub weekly_digest: ScheduledFeatureConfig,
	/// `CATALOG_JOB_SCHEDULER_ENABLED`.
	pub catalog_job_scheduler: ScheduledFeatureConfig,
}

/// Configuration for the HTTP API server (§6 "HTTP API").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	/// `API_BIND_ADDR`, default `0.0.0.0:8080`.
	#[serde(default = "default_bind_addr")]
	pub bind_addr: String,
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	pub rate_limiting: Option<RateLimitConfig>,
	pub cors: Option<CorsConfig>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
	pub requests_per_minute: u32,
	pub burst_size: u32,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
	pub allowed_headers: Vec<String>,
	pub allowed_methods: Vec<String>,
}

fn default_bind_addr() -> String {
	"0.0.0.0:8080".to_string()
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable
/// `VAR_NAME`. Supports default values with `${VAR_NAME:-default_value}`.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			}
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(*start..*end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file at the specified path, resolving
	/// `${VAR}` references against the process environment.
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let resolved = resolve_env_vars(&content)?;
		resolved.parse()
	}

	/// Async-ready variant for future secret-store resolvers (Vault, AWS
	/// Secrets Manager). Delegates to the sync path today.
	pub async fn from_file_async(path: &str) -> Result<Self, ConfigError> {
		Self::from_file(path)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.app.checkout_api_key.is_empty() {
			return Err(ConfigError::Validation("CHECKOUT_API_KEY cannot be empty".into()));
		}
		if self.app.payment_provider_secret.is_empty() {
			return Err(ConfigError::Validation("PAYMENT_PROVIDER_SECRET cannot be empty".into()));
		}
		if self.app.database_url.is_empty() {
			return Err(ConfigError::Validation("DATABASE_URL cannot be empty".into()));
		}
		if self.app.frontend_url.is_empty() {
			return Err(ConfigError::Validation("FRONTEND_URL cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation("Storage primary implementation cannot be empty".into()));
		}
		if !self.storage.implementations.contains_key(&self.storage.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation("Storage cleanup_interval_seconds must be greater than 0".into()));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		for (name, worker) in [
			("fulfillment", &self.workers.fulfillment),
			("provider_replay", &self.workers.provider_replay),
			("provider_automation_alert", &self.workers.provider_automation_alert),
		] {
			if worker.enabled && worker.interval_seconds == 0 {
				return Err(ConfigError::Validation(format!(
					"workers.{name}.interval_seconds must be greater than 0 when enabled"
				)));
			}
			if worker.enabled && worker.limit == 0 {
				return Err(ConfigError::Validation(format!(
					"workers.{name}.limit must be greater than 0 when enabled"
				)));
			}
		}
		for (name, feature) in [
			("weekly_digest", &self.workers.weekly_digest),
			("catalog_job_scheduler", &self.workers.catalog_job_scheduler),
		] {
			if feature.enabled && feature.interval_seconds == 0 {
				return Err(ConfigError::Validation(format!(
					"workers.{name}.interval_seconds must be greater than 0 when enabled"
				)));
			}
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config_str(api_key: &str) -> String {
		format!(
			r#"
[app]
checkout_api_key = "{api_key}"
payment_provider_secret = "whsec_test"
database_url = "postgres://localhost/test"
frontend_url = "https://app.example.com"

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[workers.fulfillment]
enabled = true
interval_seconds = 5
limit = 50

[workers.provider_replay]
enabled = true
interval_seconds = 60
limit = 20

[workers.provider_automation_alert]
enabled = false
interval_seconds = 300
limit = 10

[workers.weekly_digest]
enabled = false
interval_seconds = 86400

[workers.catalog_job_scheduler]
enabled = false
interval_seconds = 3600
"#
		)
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_HOST", "localhost");
		std::env::set_var("TEST_PORT", "5432");

		let input = "host = \"${TEST_HOST}:${TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TEST_HOST");
		std::env::remove_var("TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_CHECKOUT_KEY", "sk_live_test");
		let config_str = base_config_str("${TEST_CHECKOUT_KEY}");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.app.checkout_api_key, "sk_live_test");
		std::env::remove_var("TEST_CHECKOUT_KEY");
	}

	#[test]
	fn test_rejects_empty_required_field() {
		let config_str = base_config_str("");
		let result: Result<Config, _> = config_str.parse();
		assert!(result.is_err());
	}

	#[test]
	fn test_rejects_disabled_worker_with_zero_interval() {
		let mut config_str = base_config_str("sk_test").replace(
			"[workers.provider_automation_alert]\nenabled = false\ninterval_seconds = 300\nlimit = 10",
			"[workers.provider_automation_alert]\nenabled = true\ninterval_seconds = 0\nlimit = 10",
		);
		config_str.push('\n');
		let result: Result<Config, _> = config_str.parse();
		assert!(result.is_err());
	}
}
