//! Thread body polling a [`TypedJobQueue`] restricted to its affinity set (C3).

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::context::{Context, LogLevel, WorkerMetrics};
use crate::error::{ErrorInfo, ErrorKind, PoolResult};
use crate::pool::config::WorkerPolicy;
use crate::pool::job::next_worker_id;
use crate::pool::typed_queue::TypedJobQueue;

/// Lifecycle state of a [`Worker`]: `Created -> Starting -> Running <-> Idle
/// -> Stopping -> Stopped`, with a `Running -> Failed -> Stopped` branch on
/// an unhandled run error when `continue_on_exception=false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Starting,
    Running,
    Idle,
    Stopping,
    Stopped,
    Failed,
}

#[derive(Debug, Default)]
struct WorkerStats {
    jobs_processed: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    idle_time_ms: AtomicU64,
    busy_time_ms: AtomicU64,
}

/// Owns a thread of execution dedicated to draining a [`TypedJobQueue`]
/// restricted to this worker's affinity set.
pub struct Worker<T: Eq + Hash + Copy + Send + Sync + std::fmt::Debug + 'static> {
    pub id: u64,
    affinity: Vec<T>,
    policy: WorkerPolicy,
    queue: Arc<TypedJobQueue<T>>,
    context: Context,
    state: RwLock<WorkerState>,
    stop_flag: Arc<AtomicBool>,
    consecutive_failures: AtomicU32,
    stats: WorkerStats,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Eq + Hash + Copy + Send + Sync + std::fmt::Debug + 'static> Worker<T> {
    pub fn new(affinity: Vec<T>, policy: WorkerPolicy, queue: Arc<TypedJobQueue<T>>, context: Context) -> Arc<Self> {
        Arc::new(Self {
            id: next_worker_id(),
            affinity,
            policy,
            queue,
            context,
            state: RwLock::new(WorkerState::Created),
            stop_flag: Arc::new(AtomicBool::new(false)),
            consecutive_failures: AtomicU32::new(0),
            stats: WorkerStats::default(),
            thread: Mutex::new(None),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write() = state;
    }

    /// Spawns the worker's thread. Each worker is started exactly once.
    pub fn start(self: &Arc<Self>) -> PoolResult<()> {
        if self.state() != WorkerState::Created {
            return Err(ErrorInfo::new(
                ErrorKind::AlreadyStarted,
                "worker already started",
            ));
        }
        self.set_state(WorkerState::Starting);
        let worker = self.clone();
        let name = format!("{}-{}", self.policy.worker_name_prefix, self.id);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())
            .map_err(|e| ErrorInfo::new(ErrorKind::SystemResourceUnavailable, e.to_string()))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    /// Blocks until the worker's thread has exited.
    pub fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.jobs_processed.load(Ordering::Relaxed),
            self.stats.jobs_succeeded.load(Ordering::Relaxed),
            self.stats.jobs_failed.load(Ordering::Relaxed),
        )
    }

    fn run(self: Arc<Self>) {
        self.set_state(WorkerState::Running);
        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }

            match self.queue.dequeue(&self.affinity, true, Some(self.policy.idle_timeout)) {
                Ok(mut job) => {
                    self.set_state(WorkerState::Running);
                    let started = Instant::now();
                    let result = job.run();
                    self.stats.busy_time_ms.fetch_add(
                        started.elapsed().as_millis() as u64,
                        Ordering::Relaxed,
                    );
                    self.stats.jobs_processed.fetch_add(1, Ordering::Relaxed);
                    match result {
                        Ok(()) => {
                            self.stats.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
                            self.consecutive_failures.store(0, Ordering::Relaxed);
                        }
                        Err(kind) => {
                            self.stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
                            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                            self.context.logger().log(
                                LogLevel::Warning,
                                &format!("job failed on worker {}: {:?}", self.id, kind),
                            );
                            if !self.policy.continue_on_exception
                                && failures >= self.policy.max_consecutive_failures
                            {
                                self.set_state(WorkerState::Failed);
                                break;
                            }
                        }
                    }
                    self.report_metrics();
                }
                Err(err) if err.kind == ErrorKind::Empty || err.kind == ErrorKind::Timeout => {
                    self.set_state(WorkerState::Idle);
                    if self.policy.yield_on_idle {
                        thread::yield_now();
                    }
                    if self.policy.sleep_when_idle {
                        thread::sleep(self.policy.idle_sleep_duration);
                        self.stats.idle_time_ms.fetch_add(
                            self.policy.idle_sleep_duration.as_millis() as u64,
                            Ordering::Relaxed,
                        );
                    }
                }
                Err(_) => {
                    // QueueClosed (or any other terminal error): the pool is
                    // shutting down and there is nothing left to drain.
                    break;
                }
            }
        }

        if self.state() != WorkerState::Failed {
            self.set_state(WorkerState::Stopping);
        }
        self.set_state(WorkerState::Stopped);
    }

    fn report_metrics(&self) {
        let (processed, succeeded, failed) = self.stats();
        self.context.monitoring_sink().update_worker_metrics(
            self.id,
            WorkerMetrics {
                worker_id: self.id,
                jobs_processed: processed,
                jobs_succeeded: succeeded,
                jobs_failed: failed,
                idle_time_ms: self.stats.idle_time_ms.load(Ordering::Relaxed),
                busy_time_ms: self.stats.busy_time_ms.load(Ordering::Relaxed),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::job::{CancellationToken, Job, JobKind, TypedJob};
    use std::time::Duration;

    #[test]
    fn worker_processes_jobs_from_its_affinity_set() {
        let queue = Arc::new(TypedJobQueue::<JobKind>::new());
        let policy = WorkerPolicy {
            idle_timeout: Duration::from_millis(20),
            ..WorkerPolicy::default()
        };
        let worker = Worker::new(vec![JobKind::Critical], policy, queue.clone(), Context::new("test"));
        worker.start().unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let job = Job::new(move |_: &CancellationToken| {
            ran_clone.store(true, Ordering::SeqCst);
            Ok(())
        });
        queue.enqueue(TypedJob::new(job, JobKind::Critical)).unwrap();

        for _ in 0..50 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(ran.load(Ordering::SeqCst));

        worker.request_stop();
        queue.close();
        worker.join();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn worker_fails_after_max_consecutive_failures_when_not_continuing() {
        let queue = Arc::new(TypedJobQueue::<JobKind>::new());
        let policy = WorkerPolicy {
            idle_timeout: Duration::from_millis(20),
            continue_on_exception: false,
            max_consecutive_failures: 2,
            ..WorkerPolicy::default()
        };
        let worker = Worker::new(vec![JobKind::Critical], policy, queue.clone(), Context::new("test"));
        worker.start().unwrap();

        for _ in 0..3 {
            let job = Job::new(|_: &CancellationToken| Err(ErrorKind::JobExecutionFailed));
            queue.enqueue(TypedJob::new(job, JobKind::Critical)).unwrap();
        }

        for _ in 0..50 {
            if worker.state() == WorkerState::Failed || worker.state() == WorkerState::Stopped {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        worker.join();
        assert_eq!(worker.state(), WorkerState::Stopped);
        let (_, _, failed) = worker.stats();
        assert!(failed >= 2);
    }
}
