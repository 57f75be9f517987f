//! Core orchestration for order fulfillment: the order state machine
//! (C8), the fulfillment service (C5), the task processor loop (C6),
//! the scheduled-replay worker (C7), and the observability store (C12)
//! that backs both workers' health endpoints.
//!
//! `fulfillment-core` is deliberately silent on *how* a notification is
//! rendered and delivered (C11) — see [`notifications::NotificationDispatch`]
//! for the seam `fulfillment-service`'s composition root wires at startup.

pub mod fulfillment_service;
pub mod notifications;
pub mod observability;
pub mod replay_worker;
pub mod state_machine;
pub mod task_processor;

pub use fulfillment_service::{FulfillmentProgress, FulfillmentService};
pub use notifications::{NotificationDispatch, NullNotificationDispatch};
pub use observability::{ObservabilityStore, ProcessorHealth, TaskTypeBucket};
pub use replay_worker::{ReplayWorker, ReplayWorkerConfig};
pub use state_machine::{shared as shared_state_machine, OrderStateMachine, TransitionActor};
pub use task_processor::{TaskProcessor, TaskProcessorConfig};
