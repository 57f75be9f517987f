//! Template rendering for provider endpoint descriptors and fulfillment
//! task payloads (C2).
//!
//! A template is any JSON value — object, array, or string — that may
//! contain `{{ expression }}` tokens resolved against a JSON context. The
//! renderer walks the structure once at [`compile`] time into a
//! [`Template`] (a lightweight AST), so an endpoint descriptor that is
//! rendered once per retry does not re-run the token regex every time.
//!
//! Two rules drive every edge case here and are deliberately exact rather
//! than "close enough":
//!
//! - A string that is *entirely* one token (ignoring surrounding
//!   whitespace) resolves to the raw context value, preserving its JSON
//!   type instead of stringifying it.
//! - A string that mixes literal text with one or more tokens resolves by
//!   substitution into a string, then [`coerce_scalar`] promotes that
//!   string into `null`/`bool`/number when it looks like one — numeric
//!   promotion only fires when the *original, untokenized* string (after
//!   trimming) starts with `{{` and ends with `}}`, which is a slightly
//!   broader condition than "is a single token" (e.g. `"{{a}}{{b}}"`
//!   qualifies for numeric coercion even though it has two tokens).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use fulfillment_types::{DomainError, ErrorKind};

static TOKEN_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("valid token regex"));

static SINGLE_TOKEN_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\s*\{\{\s*([^}]+?)\s*\}\}\s*$").expect("valid single-token regex"));

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
	#[error("template expression is empty")]
	EmptyExpression,
	#[error("template expression `{0}` must not contain a filter ('|')")]
	FilterUnsupported(String),
	#[error("template expression `{0}` has an empty path segment")]
	EmptySegment(String),
	#[error("context has no key `{key}` (from expression `{expression}`)")]
	MissingKey { expression: String, key: String },
	#[error("list index `{segment}` is not numeric (from expression `{expression}`)")]
	NonNumericIndex { expression: String, segment: String },
	#[error("list index {index} out of range (from expression `{expression}`)")]
	IndexOutOfRange { expression: String, index: i64 },
	#[error("cannot resolve `{segment}` on a scalar value (from expression `{expression}`)")]
	NotIndexable { expression: String, segment: String },
}

impl From<TemplateError> for DomainError {
	fn from(err: TemplateError) -> Self {
		DomainError::Template(err.to_string())
	}
}

impl TemplateError {
	pub fn kind(&self) -> ErrorKind {
		ErrorKind::Template
	}
}

/// One segment of a literal/token split of a template string.
#[derive(Debug, Clone)]
enum StringPart {
	Literal(String),
	Token(String),
}

/// A pre-parsed template string.
#[derive(Debug, Clone)]
struct StringTemplate {
	/// The original, untrimmed source string — kept for the numeric
	/// coercion gate, which inspects the *whole* original string.
	raw: String,
	/// `Some(expression)` when the whole string (modulo surrounding
	/// whitespace) is exactly one `{{ ... }}` token.
	single_token: Option<String>,
	/// Populated when `single_token` is `None` and the string contains at
	/// least one token; used to substitute and re-stringify.
	parts: Vec<StringPart>,
}

impl StringTemplate {
	fn parse(raw: &str) -> Self {
		if !raw.contains("{{") {
			return Self { raw: raw.to_string(), single_token: None, parts: Vec::new() };
		}
		if let Some(caps) = SINGLE_TOKEN_PATTERN.captures(raw) {
			let expr = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
			return Self { raw: raw.to_string(), single_token: Some(expr), parts: Vec::new() };
		}
		let mut parts = Vec::new();
		let mut last = 0;
		for caps in TOKEN_PATTERN.captures_iter(raw) {
			let whole = caps.get(0).unwrap();
			if whole.start() > last {
				parts.push(StringPart::Literal(raw[last..whole.start()].to_string()));
			}
			let expr = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
			parts.push(StringPart::Token(expr));
			last = whole.end();
		}
		if last < raw.len() {
			parts.push(StringPart::Literal(raw[last..].to_string()));
		}
		Self { raw: raw.to_string(), single_token: None, parts }
	}

	fn is_literal(&self) -> bool {
		self.single_token.is_none() && self.parts.is_empty()
	}

	fn render(&self, context: &Value) -> Result<Value, TemplateError> {
		if self.is_literal() {
			return Ok(Value::String(self.raw.clone()));
		}
		if let Some(expr) = &self.single_token {
			return resolve_context_path(context, expr);
		}
		let mut rendered = String::new();
		for part in &self.parts {
			match part {
				StringPart::Literal(text) => rendered.push_str(text),
				StringPart::Token(expr) => {
					let value = resolve_context_path(context, expr)?;
					rendered.push_str(&stringify_for_interpolation(&value));
				}
			}
		}
		Ok(coerce_scalar(&rendered, &self.raw))
	}
}

fn stringify_for_interpolation(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		Value::Object(_) | Value::Array(_) => value.to_string(),
		Value::Bool(b) => b.to_string(),
		Value::Number(n) => n.to_string(),
	}
}

/// `null`/bool/numeric promotion for the output of a multi-token render.
///
/// `original` is the *whole, untokenized* source string this rendered
/// value came from (not just the matched token) — numeric coercion only
/// applies when its trimmed form starts with `{{` and ends with `}}`.
pub fn coerce_scalar(rendered: &str, original: &str) -> Value {
	let trimmed = rendered.trim();
	if trimmed.is_empty() {
		return Value::String(String::new());
	}
	let lowered = trimmed.to_ascii_lowercase();
	if lowered == "null" || lowered == "none" {
		return Value::Null;
	}
	if lowered == "true" {
		return Value::Bool(true);
	}
	if lowered == "false" {
		return Value::Bool(false);
	}
	let original_trimmed = original.trim();
	if original_trimmed.starts_with("{{") && original_trimmed.ends_with("}}") {
		if let Ok(i) = trimmed.parse::<i64>() {
			return Value::Number(Number::from(i));
		}
		if let Ok(f) = trimmed.parse::<f64>() {
			if let Some(n) = Number::from_f64(f) {
				return Value::Number(n);
			}
		}
	}
	Value::String(rendered.to_string())
}

/// Resolves a dotted path (`a.b.0.c`) against a JSON context.
pub fn resolve_context_path(context: &Value, expression: &str) -> Result<Value, TemplateError> {
	let expression_trimmed = expression.trim();
	if expression_trimmed.is_empty() {
		return Err(TemplateError::EmptyExpression);
	}
	if expression_trimmed.contains('|') {
		return Err(TemplateError::FilterUnsupported(expression_trimmed.to_string()));
	}
	let mut current = context.clone();
	for segment in expression_trimmed.split('.') {
		if segment.is_empty() {
			return Err(TemplateError::EmptySegment(expression_trimmed.to_string()));
		}
		current = match current {
			Value::Object(mut map) => map.remove(segment).ok_or_else(|| TemplateError::MissingKey {
				expression: expression_trimmed.to_string(),
				key: segment.to_string(),
			})?,
			Value::Array(list) => {
				let index: i64 = segment.parse().map_err(|_| TemplateError::NonNumericIndex {
					expression: expression_trimmed.to_string(),
					segment: segment.to_string(),
				})?;
				let resolved = if index < 0 { index + list.len() as i64 } else { index };
				if resolved < 0 || resolved as usize >= list.len() {
					return Err(TemplateError::IndexOutOfRange {
						expression: expression_trimmed.to_string(),
						index,
					});
				}
				list[resolved as usize].clone()
			}
			_ => {
				return Err(TemplateError::NotIndexable {
					expression: expression_trimmed.to_string(),
					segment: segment.to_string(),
				})
			}
		};
	}
	Ok(current)
}

/// A pre-parsed structure of nested templates, ready to be rendered
/// repeatedly against different contexts without re-running the token
/// regex each time.
#[derive(Debug, Clone)]
pub enum Template {
	Null,
	Bool(bool),
	Number(Number),
	Str(StringTemplate),
	List(Vec<Template>),
	Map(Vec<(String, Template)>),
}

impl Template {
	/// Parses a JSON value into a reusable template.
	pub fn compile(value: &Value) -> Self {
		match value {
			Value::Null => Template::Null,
			Value::Bool(b) => Template::Bool(*b),
			Value::Number(n) => Template::Number(n.clone()),
			Value::String(s) => Template::Str(StringTemplate::parse(s)),
			Value::Array(items) => Template::List(items.iter().map(Template::compile).collect()),
			Value::Object(map) => {
				Template::Map(map.iter().map(|(k, v)| (k.clone(), Template::compile(v))).collect())
			}
		}
	}

	/// Renders this template against a context, producing a JSON value.
	pub fn render(&self, context: &Value) -> Result<Value, TemplateError> {
		match self {
			Template::Null => Ok(Value::Null),
			Template::Bool(b) => Ok(Value::Bool(*b)),
			Template::Number(n) => Ok(Value::Number(n.clone())),
			Template::Str(s) => s.render(context),
			Template::List(items) => {
				let mut rendered = Vec::with_capacity(items.len());
				for item in items {
					rendered.push(item.render(context)?);
				}
				Ok(Value::Array(rendered))
			}
			Template::Map(entries) => {
				let mut rendered = Map::with_capacity(entries.len());
				for (key, value) in entries {
					rendered.insert(key.clone(), value.render(context)?);
				}
				Ok(Value::Object(rendered))
			}
		}
	}
}

/// Convenience one-shot render: compiles `value` and renders it
/// immediately against `context`. Prefer [`Template::compile`] when the
/// same structure will be rendered more than once (retries, replays).
pub fn render(value: &Value, context: &Value) -> Result<Value, TemplateError> {
	Template::compile(value).render(context)
}

/// Renders a single template string (not a structure) against a context,
/// following the same substitution rules as a multi-token structure
/// field. Returned as a plain `String`, used by callers (e.g. the
/// endpoint invoker's URL field) that require a string regardless of
/// whether the template happened to be a single token.
pub fn render_string(template: &str, context: &Value) -> Result<String, TemplateError> {
	match Template::compile(&Value::String(template.to_string())).render(context)? {
		Value::String(s) => Ok(s),
		other => Ok(stringify_for_interpolation(&other)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn literal_string_passes_through() {
		let context = json!({});
		let rendered = render(&json!("just text"), &context).unwrap();
		assert_eq!(rendered, json!("just text"));
	}

	#[test]
	fn single_token_preserves_type() {
		let context = json!({"order": {"quantity": 500}});
		let rendered = render(&json!("{{ order.quantity }}"), &context).unwrap();
		assert_eq!(rendered, json!(500));
	}

	#[test]
	fn single_token_preserves_object_type() {
		let context = json!({"order": {"meta": {"a": 1}}});
		let rendered = render(&json!("{{order.meta}}"), &context).unwrap();
		assert_eq!(rendered, json!({"a": 1}));
	}

	#[test]
	fn mixed_token_stringifies_and_coerces_when_whole_span_is_braced() {
		// "{{a}}{{b}}" trims to start with "{{" and end with "}}", so the
		// concatenated numeric-looking result is coerced back to a number,
		// even though it is not a single token.
		let context = json!({"a": 1, "b": 2});
		let rendered = render(&json!("{{a}}{{b}}"), &context).unwrap();
		assert_eq!(rendered, json!(12));
	}

	#[test]
	fn mixed_token_with_surrounding_text_stays_a_string() {
		let context = json!({"count": 5});
		let rendered = render(&json!("count: {{count}}"), &context).unwrap();
		assert_eq!(rendered, json!("count: 5"));
	}

	#[test]
	fn null_context_value_interpolates_as_empty_string() {
		let context = json!({"missing": Value::Null});
		let rendered = render(&json!("value=[{{missing}}]"), &context).unwrap();
		assert_eq!(rendered, json!("value=[]"));
	}

	#[test]
	fn nested_structures_render_recursively() {
		let context = json!({"user": {"id": "abc-123"}, "n": 3});
		let rendered = render(
			&json!({"url": "https://api.example.com/users/{{user.id}}", "payload": {"qty": "{{n}}"}}),
			&context,
		)
		.unwrap();
		assert_eq!(
			rendered,
			json!({"url": "https://api.example.com/users/abc-123", "payload": {"qty": 3}})
		);
	}

	#[test]
	fn list_index_resolves() {
		let context = json!({"items": [{"sku": "a"}, {"sku": "b"}]});
		let rendered = render(&json!("{{items.1.sku}}"), &context).unwrap();
		assert_eq!(rendered, json!("b"));
	}

	#[test]
	fn missing_key_is_an_error() {
		let context = json!({});
		let err = render(&json!("{{missing.path}}"), &context).unwrap_err();
		assert!(matches!(err, TemplateError::MissingKey { .. }));
	}

	#[test]
	fn empty_expression_is_an_error() {
		let context = json!({});
		let err = render(&json!("{{ }}"), &context).unwrap_err();
		assert!(matches!(err, TemplateError::EmptyExpression));
	}

	#[test]
	fn filter_syntax_is_rejected() {
		let context = json!({"x": 1});
		let err = render(&json!("{{x|upper}}"), &context).unwrap_err();
		assert!(matches!(err, TemplateError::FilterUnsupported(_)));
	}

	#[test]
	fn out_of_range_index_is_an_error() {
		let context = json!({"items": [1, 2]});
		let err = render(&json!("{{items.5}}"), &context).unwrap_err();
		assert!(matches!(err, TemplateError::IndexOutOfRange { .. }));
	}

	#[test]
	fn compiled_template_can_render_multiple_contexts() {
		let template = Template::compile(&json!("hello {{name}}"));
		assert_eq!(template.render(&json!({"name": "a"})).unwrap(), json!("hello a"));
		assert_eq!(template.render(&json!({"name": "b"})).unwrap(), json!("hello b"));
	}

	#[test]
	fn render_is_idempotent_on_a_fully_resolved_string() {
		let context = json!({"x": "plain text"});
		let once = render(&json!("{{x}}"), &context).unwrap();
		let twice = render(&once, &context).unwrap();
		assert_eq!(once, twice);
	}

	#[test]
	fn bool_and_null_tokens_coerce_in_mixed_strings() {
		let context = json!({"flag": true, "nothing": Value::Null});
		assert_eq!(render(&json!("{{flag}}"), &context).unwrap(), json!(true));
		assert_eq!(render(&json!("v={{flag}}"), &context).unwrap(), json!("v=true"));
		assert_eq!(render(&json!("{{nothing}}"), &context).unwrap(), Value::Null);
	}
}
