//! Batch job execution and periodic maintenance jobs.

mod batch_dispatcher;
mod batch_executor;
mod interrupted_jobs;
mod runtime_gauges;
mod scheduler;
mod throttle;

pub use batch_dispatcher::{BatchDispatcher, DispatchError};
pub use interrupted_jobs::close_interrupted_jobs;
pub use batch_executor::{BatchExecutor, BatchRequest, BatchWork, JobOutcome, RetryPolicy};
pub use runtime_gauges::RuntimeGaugesJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use throttle::ItemThrottle;
