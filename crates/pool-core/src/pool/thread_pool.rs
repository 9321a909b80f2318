//! Lifecycle, membership, batch enqueue and shutdown modes for a pool of
//! typed workers (C4).

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{Context, PoolMetrics};
use crate::error::{ErrorInfo, ErrorKind, PoolResult};
use crate::pool::job::{next_pool_instance_id, TypedJob};
use crate::pool::typed_queue::TypedJobQueue;
use crate::pool::worker::Worker;

/// Owns a [`TypedJobQueue`] and a collection of [`Worker`]s.
pub struct TypedThreadPool<T: Eq + Hash + Copy + Send + Sync + std::fmt::Debug + 'static> {
    pub title: String,
    pub instance_id: u64,
    queue: Arc<TypedJobQueue<T>>,
    workers: Mutex<Vec<Arc<Worker<T>>>>,
    context: Context,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl<T: Eq + Hash + Copy + Send + Sync + std::fmt::Debug + 'static> TypedThreadPool<T> {
    pub fn new(title: impl Into<String>, context: Context) -> Self {
        Self {
            title: title.into(),
            instance_id: next_pool_instance_id(),
            queue: Arc::new(TypedJobQueue::new()),
            workers: Mutex::new(Vec::new()),
            context,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<TypedJobQueue<T>> {
        &self.queue
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Adds a worker without reordering existing workers' ids. If the pool
    /// has already started, the new worker is started immediately (dynamic
    /// membership); otherwise it waits for `start()`.
    pub fn add_worker(&self, affinity: Vec<T>, policy: crate::pool::config::WorkerPolicy) -> PoolResult<u64> {
        let worker = Worker::new(affinity, policy, self.queue.clone(), self.context.clone());
        let id = worker.id;
        if self.started.load(Ordering::Acquire) {
            worker.start()?;
        }
        self.workers.lock().push(worker);
        Ok(id)
    }

    pub fn add_workers(&self, specs: Vec<(Vec<T>, crate::pool::config::WorkerPolicy)>) -> PoolResult<Vec<u64>> {
        specs
            .into_iter()
            .map(|(affinity, policy)| self.add_worker(affinity, policy))
            .collect()
    }

    pub fn enqueue(&self, job: TypedJob<T>) -> PoolResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ErrorInfo::new(ErrorKind::InvalidState, "pool is stopped"));
        }
        self.queue.enqueue(job)
    }

    pub fn enqueue_batch(&self, jobs: Vec<TypedJob<T>>) -> PoolResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ErrorInfo::new(ErrorKind::InvalidState, "pool is stopped"));
        }
        self.queue.enqueue_batch(jobs)
    }

    /// Launches each worker exactly once. Fails with `AlreadyStarted` or
    /// `NoWorkers`.
    pub fn start(&self) -> PoolResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ErrorInfo::new(ErrorKind::AlreadyStarted, "pool already started"));
        }
        let workers = self.workers.lock();
        if workers.is_empty() {
            self.started.store(false, Ordering::Release);
            return Err(ErrorInfo::new(ErrorKind::NoWorkers, "pool has no workers"));
        }
        for worker in workers.iter() {
            worker.start()?;
        }
        self.report_metrics();
        Ok(())
    }

    /// Idempotent: signals all workers; if `clear`, the queue is emptied
    /// before workers observe the drain. Returns once every worker has
    /// reached `Stopped`.
    pub fn stop(&self, clear: bool) -> PoolResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let workers = self.workers.lock();
        for worker in workers.iter() {
            worker.request_stop();
        }
        if clear {
            self.queue.close();
            self.queue.clear();
        } else {
            self.queue.drain();
        }
        for worker in workers.iter() {
            worker.join();
        }
        self.report_metrics();
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn report_metrics(&self) {
        let workers = self.workers.lock();
        let mut completed = 0u64;
        let mut failed = 0u64;
        for worker in workers.iter() {
            let (_, succeeded, worker_failed) = worker.stats();
            completed += succeeded;
            failed += worker_failed;
        }
        self.context.monitoring_sink().update_pool_metrics(PoolMetrics {
            pool_id: self.instance_id,
            jobs_enqueued: 0,
            jobs_completed: completed,
            jobs_failed: failed,
            queue_size: self.queue.size(),
            worker_count: workers.len(),
        });
    }
}

impl<T: Eq + Hash + Copy + Send + Sync + std::fmt::Debug + 'static> std::fmt::Display for TypedThreadPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypedThreadPool(\"{}\", id={})", self.title, self.instance_id)
    }
}
