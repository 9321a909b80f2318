pub mod context;
pub mod error;
pub mod monitoring;
pub mod pool;

pub use context::{Context, Logger, LogLevel, MonitoringSink, NullLogger, NullMonitoringSink, PoolMetrics, ServiceContainer, SystemMetrics, TracingLogger, WorkerMetrics};
pub use error::{ErrorInfo, ErrorKind, PoolResult};
pub use pool::{CancellationToken, Job, JobBody, JobId, JobKind, JobQueue, QueueHandle, QueueState, SchedulingDiscipline, TypedJob, TypedJobQueue, TypedThreadPool, Worker, WorkerPolicy, WorkerState};
