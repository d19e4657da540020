//! Redis-backed job plumbing.
//!
//! This crate provides:
//! - Job enqueueing and consumption via Redis Streams with retry/DLQ
//! - Job status hashes polled by clients
//! - Durable storage of analysis results with a TTL

mod connection;
pub mod error;
pub mod job;
pub mod queue;
pub mod results;
pub mod status;

pub use connection::DEFAULT_REDIS_TIMEOUT;
pub use error::{QueueError, QueueResult};
pub use job::{AnalyzeVideoJob, CleanupJob, CleanupScope, GenerateVideoJob, QueueJob};
pub use queue::{JobQueue, QueueConfig};
pub use results::{result_key, RedisResultStore, ResultStore, RESULT_TTL_SECS};
pub use status::{status_key, RedisStatusStore, StatusSink, STATUS_TTL_SECS};
