//! In-memory storage backend.
//!
//! Useful for tests and for the single-process demo deployment. Maintains
//! the same field-value index the file backend persists to disk, kept
//! in-memory instead — the task processor and replay worker both depend
//! on `query` actually returning results against a memory-only deployment.

use crate::{QueryFilter, StorageError, StorageIndexes, StorageInterface};
use async_trait::async_trait;
use fulfillment_types::{ConfigSchema, Schema, ValidationError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct NamespaceIndex {
	/// field -> value -> set of keys
	indexes: HashMap<String, HashMap<serde_json::Value, HashSet<String>>>,
}

/// In-memory storage implementation.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
	indexes: Arc<RwLock<HashMap<String, NamespaceIndex>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self { store: Arc::new(RwLock::new(HashMap::new())), indexes: Arc::new(RwLock::new(HashMap::new())) }
	}

	fn namespace_of(key: &str) -> &str {
		key.split(':').next().unwrap_or("")
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		indexes: Option<StorageIndexes>,
		_ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		drop(store);

		if let Some(indexes) = indexes {
			let namespace = Self::namespace_of(key).to_string();
			let mut all_indexes = self.indexes.write().await;
			let namespace_index = all_indexes.entry(namespace).or_default();
			for value_map in namespace_index.indexes.values_mut() {
				for keys in value_map.values_mut() {
					keys.remove(key);
				}
			}
			for (field, value) in indexes.fields {
				namespace_index.indexes.entry(field).or_default().entry(value).or_default().insert(key.to_string());
			}
		}

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		drop(store);

		let namespace = Self::namespace_of(key).to_string();
		let mut all_indexes = self.indexes.write().await;
		if let Some(namespace_index) = all_indexes.get_mut(&namespace) {
			for value_map in namespace_index.indexes.values_mut() {
				for keys in value_map.values_mut() {
					keys.remove(key);
				}
			}
		}
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn query(&self, namespace: &str, filter: QueryFilter) -> Result<Vec<String>, StorageError> {
		let all_indexes = self.indexes.read().await;
		let Some(namespace_index) = all_indexes.get(namespace) else {
			return Ok(Vec::new());
		};

		let matching: HashSet<String> = match filter {
			QueryFilter::All => {
				let mut keys = HashSet::new();
				for value_map in namespace_index.indexes.values() {
					for ks in value_map.values() {
						keys.extend(ks.clone());
					}
				}
				keys
			}
			QueryFilter::Equals(field, value) => namespace_index
				.indexes
				.get(&field)
				.and_then(|m| m.get(&value))
				.cloned()
				.unwrap_or_default(),
			QueryFilter::NotEquals(field, value) => {
				let mut keys = HashSet::new();
				if let Some(field_index) = namespace_index.indexes.get(&field) {
					for (v, k) in field_index {
						if v != &value {
							keys.extend(k.clone());
						}
					}
				}
				keys
			}
			QueryFilter::In(field, values) => {
				let mut keys = HashSet::new();
				if let Some(field_index) = namespace_index.indexes.get(&field) {
					for value in &values {
						if let Some(k) = field_index.get(value) {
							keys.extend(k.clone());
						}
					}
				}
				keys
			}
			QueryFilter::NotIn(field, values) => {
				let mut keys = HashSet::new();
				if let Some(field_index) = namespace_index.indexes.get(&field) {
					for (value, k) in field_index {
						if !values.contains(value) {
							keys.extend(k.clone());
						}
					}
				}
				keys
			}
		};

		Ok(matching.into_iter().collect())
	}

	async fn get_batch(&self, keys: &[String]) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let store = self.store.read().await;
		Ok(keys.iter().filter_map(|k| store.get(k).map(|v| (k.clone(), v.clone()))).collect())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl MemoryStorageSchema {
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema::validate_config(config)
		.map_err(|e| StorageError::Configuration(format!("Invalid configuration: {e}")))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl fulfillment_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();
		let key = "test_key";
		let value = b"test_value".to_vec();
		storage.set_bytes(key, value.clone(), None, None).await.unwrap();

		let retrieved = storage.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(storage.get_bytes(key).await, Err(StorageError::NotFound)));
	}

	#[tokio::test]
	async fn test_query_by_indexed_field() {
		let storage = MemoryStorage::new();
		let indexes = StorageIndexes::new().with_field("status", "pending");
		storage.set_bytes("orders:1", b"{}".to_vec(), Some(indexes), None).await.unwrap();

		let keys = storage
			.query("orders", QueryFilter::Equals("status".to_string(), serde_json::json!("pending")))
			.await
			.unwrap();
		assert_eq!(keys, vec!["orders:1".to_string()]);
	}
}
