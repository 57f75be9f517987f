//! Static `task -> fn` dispatch (§4.9: "Resolve `task` as an in-process
//! async callable reference"). Jobs are registered at startup by
//! `fulfillment-service`'s composition root — there is no dynamic lookup
//! by string path, so an unknown `task` in the schedule file fails fast
//! rather than silently becoming a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use fulfillment_types::DomainError;
use futures::future::BoxFuture;
use serde_json::Value;

pub type JobFuture = BoxFuture<'static, Result<(), DomainError>>;
pub type JobFn = Arc<dyn Fn(Value) -> JobFuture + Send + Sync>;

#[derive(Default, Clone)]
pub struct JobRegistry {
	jobs: HashMap<String, JobFn>,
}

impl JobRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `task` under `name`. A later `register` call with the same
	/// name replaces the earlier one.
	pub fn register<F>(&mut self, name: impl Into<String>, task: F)
	where
		F: Fn(Value) -> JobFuture + Send + Sync + 'static,
	{
		self.jobs.insert(name.into(), Arc::new(task));
	}

	pub fn resolve(&self, name: &str) -> Option<JobFn> {
		self.jobs.get(name).cloned()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.jobs.contains_key(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn registered_job_resolves_and_runs() {
		let mut registry = JobRegistry::new();
		registry.register("noop", |_kwargs| Box::pin(async { Ok(()) }));

		let job = registry.resolve("noop").unwrap();
		job(Value::Null).await.unwrap();
	}

	#[test]
	fn unregistered_job_does_not_resolve() {
		let registry = JobRegistry::new();
		assert!(registry.resolve("missing").is_none());
	}
}
