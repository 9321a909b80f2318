//! Typed thread pool engine: C1 (job/queue) through C4 (pool lifecycle).

pub mod config;
pub mod job;
pub mod queue;
pub mod thread_pool;
pub mod typed_queue;
pub mod worker;

pub use config::{SchedulingDiscipline, WorkerPolicy};
pub use job::{CancellationToken, Job, JobBody, JobId, JobKind, TypedJob};
pub use queue::{JobQueue, QueueHandle, QueueState};
pub use thread_pool::TypedThreadPool;
pub use typed_queue::TypedJobQueue;
pub use worker::{Worker, WorkerState};
