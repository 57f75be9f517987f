//! TOML schedule file format (§4.9, §6 "Schedule file format"):
//!
//! ```toml
//! timezone = "UTC"
//!
//! [jobs.provider_replay]
//! task = "providers.replay.run_scheduled"
//! cron = "*/1 * * * *"
//! max_attempts = 3
//! base_backoff_seconds = 5
//! backoff_multiplier = 2
//! max_backoff_seconds = 60
//! jitter_seconds = 1
//! kwargs = { limit = 50 }
//! ```
//!
//! §4.9's prose describes each job as `{id, task, cron, kwargs?,
//! maxAttempts?, ...}` (camelCase, with an explicit `id` field), while
//! §6's concrete schedule-file example keys jobs by name under `[jobs.*]`
//! and uses snake_case fields with no `id`. This module follows the §6
//! example as the wire format of record — a job's id is the TOML table
//! key it's declared under — since that section is the one meant to be
//! copy-pasted into an actual config file (see DESIGN.md).

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

fn default_max_attempts() -> u32 {
	3
}
fn default_base_backoff_seconds() -> f64 {
	1.0
}
fn default_backoff_multiplier() -> f64 {
	2.0
}
fn default_max_backoff_seconds() -> f64 {
	30.0
}
fn default_jitter_seconds() -> f64 {
	1.0
}

/// One scheduled job's trigger, target, and retry policy. The job's id
/// is not a field here — it's the key this spec is declared under in
/// `ScheduleFile::jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
	/// Key into the [`crate::registry::JobRegistry`] this job resolves
	/// against — never a dynamically loaded path (§9 design note: "job
	/// dispatch is a static `task -> fn` map, not reflection").
	pub task: String,
	pub cron: String,
	#[serde(default)]
	pub kwargs: Value,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_base_backoff_seconds")]
	pub base_backoff_seconds: f64,
	#[serde(default = "default_backoff_multiplier")]
	pub backoff_multiplier: f64,
	#[serde(default = "default_max_backoff_seconds")]
	pub max_backoff_seconds: f64,
	#[serde(default = "default_jitter_seconds")]
	pub jitter_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleFile {
	#[serde(default = "default_timezone")]
	pub timezone: String,
	#[serde(default)]
	pub jobs: std::collections::BTreeMap<String, JobSpec>,
}

fn default_timezone() -> String {
	"UTC".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
	#[error("failed to parse schedule file: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("unknown timezone {0:?}")]
	UnknownTimezone(String),
	#[error("job {id:?} has an invalid cron expression {cron:?}: {source}")]
	InvalidCron { id: String, cron: String, source: cron::error::Error },
}

impl ScheduleFile {
	pub fn parse(toml_source: &str) -> Result<Self, ScheduleError> {
		let file: ScheduleFile = toml::from_str(toml_source)?;
		file.timezone().map_err(|_| ScheduleError::UnknownTimezone(file.timezone.clone()))?;

		for (id, job) in &file.jobs {
			cron::Schedule::from_str(&job.cron)
				.map_err(|source| ScheduleError::InvalidCron { id: id.clone(), cron: job.cron.clone(), source })?;
		}
		Ok(file)
	}

	pub fn timezone(&self) -> Result<chrono_tz::Tz, chrono_tz::ParseError> {
		self.timezone.parse()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_minimal_schedule() {
		let file = ScheduleFile::parse(
			r#"
			timezone = "UTC"

			[jobs.weekly_digest]
			task = "weekly_digest"
			cron = "0 0 9 * * Mon"
			"#,
		)
		.unwrap();
		assert_eq!(file.jobs.len(), 1);
		let job = &file.jobs["weekly_digest"];
		assert_eq!(job.max_attempts, 3);
		assert_eq!(job.base_backoff_seconds, 1.0);
	}

	#[test]
	fn parses_explicit_retry_policy_and_kwargs() {
		let file = ScheduleFile::parse(
			r#"
			timezone = "UTC"

			[jobs.provider_replay]
			task = "providers.replay.run_scheduled"
			cron = "*/1 * * * *"
			max_attempts = 3
			base_backoff_seconds = 5
			backoff_multiplier = 2
			max_backoff_seconds = 60
			jitter_seconds = 1
			kwargs = { limit = 50 }
			"#,
		)
		.unwrap();
		let job = &file.jobs["provider_replay"];
		assert_eq!(job.max_backoff_seconds, 60.0);
		assert_eq!(job.kwargs["limit"], 50);
	}

	#[test]
	fn rejects_invalid_cron_expression() {
		let err = ScheduleFile::parse(
			r#"
			timezone = "UTC"

			[jobs.broken]
			task = "weekly_digest"
			cron = "not a cron expression"
			"#,
		)
		.unwrap_err();
		assert!(matches!(err, ScheduleError::InvalidCron { .. }));
	}

	#[test]
	fn rejects_unknown_timezone() {
		let err = ScheduleFile::parse(
			r#"
			timezone = "Nowhere/Imaginary"

			[jobs.job]
			task = "weekly_digest"
			cron = "0 0 9 * * Mon"
			"#,
		)
		.unwrap_err();
		assert!(matches!(err, ScheduleError::UnknownTimezone(_)));
	}
}
