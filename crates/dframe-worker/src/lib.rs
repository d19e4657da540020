//! DanceFrame job worker.
//!
//! Consumes analysis, generation and cleanup jobs from the Redis stream
//! and publishes progress to the status hashes read by the API.

pub mod analysis;
pub mod cleanup;
pub mod composition;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::AnalysisPipeline;
pub use composition::CompositionPipeline;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{failure_action, FailureAction, JobExecutor, ProcessingContext};
pub use logging::JobLogger;
pub use progress::ProgressReporter;
pub use retry::RetryConfig;
