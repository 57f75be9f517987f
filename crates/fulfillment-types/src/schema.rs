//! Configuration validation utilities shared by every pluggable backend
//! (storage implementations, notification backends, delivery clients).
//!
//! A flexible, type-safe framework for validating TOML configuration:
//! hierarchical schemas, custom per-field validators, detailed error
//! reporting. Every backend this core can swap in validates its own TOML
//! section the same way.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch { field: String, expected: String, actual: String },
	/// Error that occurs when deserialization fails.
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

/// The type a configuration field must have.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A field in a configuration schema: name, type, and an optional custom validator.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self { name: name.into(), field_type, validator: None }
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}
}

/// A validation schema for TOML configuration: required fields, optional
/// fields, each with a type and optional custom validation logic. Schemas
/// nest to validate hierarchical configurations.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or_else(|| ValidationError::TypeMismatch {
			field: "root".to_string(),
			expected: "table".to_string(),
			actual: config.type_str().to_string(),
		})?;

		for field in &self.required {
			let value =
				table.get(&field.name).ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			validate_field_type(&field.name, value, &field.field_type)?;
			if let Some(validator) = &field.validator {
				validator(value)
					.map_err(|msg| ValidationError::InvalidValue { field: field.name.clone(), message: msg })?;
			}
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				validate_field_type(&field.name, value, &field.field_type)?;
				if let Some(validator) = &field.validator {
					validator(value).map_err(|msg| ValidationError::InvalidValue {
						field: field.name.clone(),
						message: msg,
					})?;
				}
			}
		}

		Ok(())
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(ValidationError::TypeMismatch {
					field: field_name.to_string(),
					expected: "string".to_string(),
					actual: value.type_str().to_string(),
				});
			}
		}
		FieldType::Integer { min, max } => {
			let int_val = value.as_integer().ok_or_else(|| ValidationError::TypeMismatch {
				field: field_name.to_string(),
				expected: "integer".to_string(),
				actual: value.type_str().to_string(),
			})?;
			if let Some(min_val) = min {
				if int_val < *min_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {int_val} is less than minimum {min_val}"),
					});
				}
			}
			if let Some(max_val) = max {
				if int_val > *max_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {int_val} is greater than maximum {max_val}"),
					});
				}
			}
		}
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(ValidationError::TypeMismatch {
					field: field_name.to_string(),
					expected: "boolean".to_string(),
					actual: value.type_str().to_string(),
				});
			}
		}
		FieldType::Array(inner_type) => {
			let array = value.as_array().ok_or_else(|| ValidationError::TypeMismatch {
				field: field_name.to_string(),
				expected: "array".to_string(),
				actual: value.type_str().to_string(),
			})?;
			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{field_name}[{i}]"), item, inner_type)?;
			}
		}
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| match e {
				ValidationError::MissingField(f) => ValidationError::MissingField(format!("{field_name}.{f}")),
				ValidationError::InvalidValue { field, message } => {
					ValidationError::InvalidValue { field: format!("{field_name}.{field}"), message }
				}
				ValidationError::TypeMismatch { field, expected, actual } => {
					ValidationError::TypeMismatch { field: format!("{field_name}.{field}"), expected, actual }
				}
				other => other,
			})?;
		}
	}

	Ok(())
}

/// Implement to validate a pluggable backend's TOML configuration section.
#[async_trait]
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

/// Self-registering implementation: declares the name used to select it in
/// config and the factory that constructs it.
pub trait ImplementationRegistry {
	const NAME: &'static str;
	type Factory;
	fn factory() -> Self::Factory;
}
