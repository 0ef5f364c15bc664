//! Endpoint probing: per-endpoint checks and the cycle scheduler.

pub mod executor;
pub mod models;
pub mod scheduler;

pub use executor::ProbeExecutor;
pub use models::ProbeResult;
pub use scheduler::ProbeScheduler;
