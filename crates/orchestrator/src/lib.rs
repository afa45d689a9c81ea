//! Per-bill orchestration: activity execution with retries, the serial
//! event loop owning each live bill, and the host registry the gateway
//! dispatches through.

pub mod activity;
pub mod host;
pub mod orchestrator;

pub use activity::{ActivityError, ActivityOptions, RetryPolicy};
pub use host::{BillHost, BillSignal, HostError, InstanceStatus};
pub use orchestrator::{BillCommand, BillOrchestrator, CloseError};
