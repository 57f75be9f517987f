//! Entry point for the fulfillment orchestration service.
//!
//! Loads configuration, wires every crate's service into one process,
//! and supervises the background workers (C13, §4.11) alongside the
//! optional HTTP API server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fulfillment_automation::ProviderAutomationService;
use fulfillment_config::Config;
use fulfillment_core::{
	shared_state_machine, FulfillmentService, NotificationDispatch, ObservabilityStore, ReplayWorker,
	ReplayWorkerConfig, TaskProcessor, TaskProcessorConfig,
};
use fulfillment_cron::{CronScheduler, JobRegistry, ScheduleFile};
use fulfillment_notify::{InMemoryEmailBackend, NotificationDispatcher};
use fulfillment_payments::PaymentIngestionService;
use fulfillment_storage::{Repositories, StorageError, StorageInterface, StorageService};
use fulfillment_types::NotificationKind;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

mod apis;
mod server;

/// Adapts [`fulfillment_notify::NotificationDispatcher`] to the
/// [`NotificationDispatch`] trait object `fulfillment-core` dispatches
/// through. `fulfillment-notify` has no dependency on `fulfillment-core`
/// by design (see its crate doc comment); this wrapper is the one place
/// in the workspace that bridges the two, kept here rather than in
/// either library crate so the dependency edge stays one-directional.
struct NotifyDispatchAdapter(Arc<NotificationDispatcher>);

#[async_trait::async_trait]
impl NotificationDispatch for NotifyDispatchAdapter {
	async fn dispatch(&self, kind: NotificationKind, recipient: Uuid, context: Value) {
		self.0.dispatch(kind, recipient, context).await;
	}
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to the TOML configuration file.
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Path to the cron schedule TOML file (§6 "Schedule file format").
	#[arg(long, default_value = "schedule.toml")]
	schedule: PathBuf,
}

/// Everything the supervisor needs to start/stop the three supervised
/// background workers (§4.11): the task processor (C6), the scheduled-
/// replay worker (C7), and the cron scheduler (C10).
struct Workers {
	task_processor: Option<Arc<TaskProcessor>>,
	replay_worker: Option<Arc<ReplayWorker>>,
	cron_scheduler: Option<Arc<CronScheduler>>,
	observability: Arc<ObservabilityStore>,
}

fn build_storage(config: &fulfillment_config::StorageConfig) -> Result<Box<dyn StorageInterface>, StorageError> {
	let implementations = fulfillment_storage::get_all_implementations();
	let factory = implementations
		.iter()
		.find(|(name, _)| *name == config.primary)
		.map(|(_, factory)| *factory)
		.ok_or_else(|| StorageError::Configuration(format!("unknown storage backend {:?}", config.primary)))?;
	let backend_config = config
		.implementations
		.get(&config.primary)
		.cloned()
		.unwrap_or(toml::Value::Table(Default::default()));
	factory(&backend_config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let config = match Config::from_file(args.config.to_str().unwrap()) {
		Ok(config) => config,
		Err(err) => {
			eprintln!("fatal: failed to load configuration: {err}");
			std::process::exit(1);
		}
	};

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.app.log_level.clone()));
	fmt().with_env_filter(env_filter).with_target(true).init();

	tracing::info!("loaded configuration, storage backend {:?}", config.storage.primary);

	let storage = match build_storage(&config.storage) {
		Ok(backend) => Arc::new(StorageService::new(backend)),
		Err(err) => {
			tracing::error!(error = %err, "unreachable storage backend at startup");
			std::process::exit(2);
		}
	};
	let repositories = Repositories::new(storage);

	let state_machine = shared_state_machine(repositories.clone());
	let automation = Arc::new(ProviderAutomationService::new(repositories.clone()));
	let email_backend = Arc::new(InMemoryEmailBackend::new());
	let dispatcher = Arc::new(NotificationDispatcher::new(repositories.clone(), email_backend));
	let notifications: Arc<dyn NotificationDispatch> = Arc::new(NotifyDispatchAdapter(dispatcher.clone()));

	let fulfillment_service = Arc::new(FulfillmentService::new(
		repositories.clone(),
		state_machine.clone(),
		automation.clone(),
		notifications.clone(),
	));
	let payments = Arc::new(PaymentIngestionService::new(
		repositories.clone(),
		state_machine.clone(),
		fulfillment_service.clone(),
		notifications.clone(),
		config.app.payment_provider_secret.clone(),
	));

	let workers = build_workers(&config, repositories.clone(), fulfillment_service.clone(), automation.clone(), &args)?;

	let shutdown = Arc::new(Notify::new());
	let mut handles = Vec::new();

	if let Some(task_processor) = workers.task_processor.clone() {
		let shutdown = shutdown.clone();
		handles.push(tokio::spawn(async move { task_processor.run(&shutdown).await }));
	}
	if let Some(replay_worker) = workers.replay_worker.clone() {
		let shutdown = shutdown.clone();
		handles.push(tokio::spawn(async move { replay_worker.run(&shutdown).await }));
	}
	if let Some(cron_scheduler) = workers.cron_scheduler.clone() {
		let shutdown = shutdown.clone();
		handles.push(tokio::spawn(async move { cron_scheduler.run(&shutdown).await }));
	}

	let api_enabled = config.api.as_ref().is_some_and(|api| api.enabled);
	let api_task = if api_enabled {
		let gateway: Arc<dyn fulfillment_payments::PaymentGatewayClient> = Arc::new(fulfillment_payments::gateway::InMemoryGatewayClient);
		let state = server::AppState {
			config: config.clone(),
			repositories,
			state_machine,
			automation,
			fulfillment_service,
			payments,
			gateway,
			observability: workers.observability.clone(),
			cron_scheduler: workers.cron_scheduler.clone(),
		};
		Some(tokio::spawn(server::start_server(config.api.clone().unwrap(), state)))
	} else {
		None
	};

	tracing::info!("fulfillment service started");

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("received shutdown signal");
		}
	}

	shutdown.notify_waiters();
	let grace = tokio::time::sleep(std::time::Duration::from_secs(10));
	tokio::pin!(grace);
	for handle in handles {
		tokio::select! {
			_ = &mut grace => {
				handle.abort();
			}
			_ = handle => {}
		}
	}
	if let Some(api_task) = api_task {
		api_task.abort();
	}

	tracing::info!("fulfillment service stopped");
	Ok(())
}

fn build_workers(
	config: &Config,
	repositories: Repositories,
	fulfillment_service: Arc<FulfillmentService>,
	automation: Arc<ProviderAutomationService>,
	args: &Args,
) -> Result<Workers, Box<dyn std::error::Error>> {
	let observability = Arc::new(ObservabilityStore::new());
	let task_processor = config.workers.fulfillment.enabled.then(|| {
		Arc::new(TaskProcessor::new(
			repositories.clone(),
			fulfillment_service,
			observability.clone(),
			TaskProcessorConfig {
				poll_interval_seconds: config.workers.fulfillment.interval_seconds,
				batch_size: config.workers.fulfillment.limit,
			},
		))
	});

	let replay_worker = Arc::new(ReplayWorker::new(
		repositories,
		automation,
		ReplayWorkerConfig { poll_interval_seconds: config.workers.provider_replay.interval_seconds },
	));

	let cron_scheduler = match std::fs::read_to_string(&args.schedule) {
		Ok(source) => match ScheduleFile::parse(&source) {
			Ok(schedule) => {
				let mut registry = JobRegistry::new();
				let job_worker = replay_worker.clone();
				registry.register("providers.replay.run_scheduled", move |_kwargs: Value| {
					let worker = job_worker.clone();
					Box::pin(async move { worker.run_once().await.map(|_run| ()) })
				});
				match CronScheduler::new(schedule, registry) {
					Ok(scheduler) => Some(Arc::new(scheduler)),
					Err(err) => {
						tracing::warn!(error = %err, "cron schedule references unregistered jobs, cron scheduler disabled");
						None
					}
				}
			}
			Err(err) => {
				tracing::warn!(error = %err, "failed to parse cron schedule file, cron scheduler disabled");
				None
			}
		},
		Err(err) => {
			tracing::info!(error = %err, path = %args.schedule.display(), "no cron schedule file found, cron scheduler disabled");
			None
		}
	};

	let replay_worker = config.workers.provider_replay.enabled.then_some(replay_worker);

	Ok(Workers { task_processor, replay_worker, cron_scheduler, observability })
}
