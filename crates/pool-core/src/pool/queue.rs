//! Single-priority FIFO job queue (C1).

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{ErrorInfo, ErrorKind, PoolResult};
use crate::pool::job::{Job, JobId};

/// Lifecycle state of a [`JobQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Open,
    Draining,
    Closed,
}

struct Inner {
    items: VecDeque<Job>,
    state: QueueState,
}

/// Thread-safe FIFO of [`Job`]. Blocking dequeue participates in a condition
/// variable; `close()`/`drain()` wake every blocked waiter exactly once.
pub struct JobQueue {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                state: QueueState::Open,
            }),
            condvar: Condvar::new(),
        }
    }

    pub fn enqueue(&self, job: Job) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != QueueState::Open {
            return Err(ErrorInfo::new(ErrorKind::QueueClosed, "queue is not open"));
        }
        inner.items.push_back(job);
        self.condvar.notify_one();
        Ok(())
    }

    /// Atomic: either every job is inserted, or (on a closed/draining queue)
    /// none are.
    pub fn enqueue_batch(&self, jobs: Vec<Job>) -> PoolResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != QueueState::Open {
            return Err(ErrorInfo::new(ErrorKind::QueueClosed, "queue is not open"));
        }
        inner.items.extend(jobs);
        self.condvar.notify_all();
        Ok(())
    }

    /// `block=false`: returns `Empty` immediately if nothing is queued.
    /// `block=true`: waits (optionally bounded by `timeout`) for an item or
    /// for the queue to close.
    pub fn dequeue(&self, block: bool, timeout: Option<Duration>) -> PoolResult<Job> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(job) = inner.items.pop_front() {
                return Ok(job);
            }
            if inner.state == QueueState::Closed || inner.state == QueueState::Draining {
                return Err(ErrorInfo::new(ErrorKind::QueueClosed, "queue is drained"));
            }
            if !block {
                return Err(ErrorInfo::new(ErrorKind::Empty, "queue is empty"));
            }
            match timeout {
                Some(duration) => {
                    let timed_out = self.condvar.wait_for(&mut inner, duration).timed_out();
                    if timed_out && inner.items.is_empty() && inner.state == QueueState::Open {
                        return Err(ErrorInfo::new(ErrorKind::Timeout, "dequeue timed out"));
                    }
                }
                None => self.condvar.wait(&mut inner),
            }
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
    }

    /// Stops new enqueues while letting still-queued jobs be drained by
    /// dequeue callers (used by `stop(clear=false)`).
    pub fn drain(&self) {
        let mut inner = self.inner.lock();
        inner.state = QueueState::Draining;
        self.condvar.notify_all();
    }

    /// Immediate cutoff: stops new enqueues; pairs with `clear()` for
    /// `stop(clear=true)`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.state = QueueState::Closed;
        self.condvar.notify_all();
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }
}

/// Handle a [`Job`] can use to notify its originating queue of cancellation
/// without holding a strong reference back to it.
pub trait QueueHandle: Send + Sync {
    fn notify_job_cancelled(&self, job_id: JobId);
}

impl QueueHandle for JobQueue {
    fn notify_job_cancelled(&self, _job_id: JobId) {
        // No bookkeeping needed at this layer; the job's own token already
        // carries the cancellation bit workers observe.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::job::CancellationToken;

    fn trivial_job() -> Job {
        Job::new(|_: &CancellationToken| Ok(()))
    }

    #[test]
    fn enqueue_then_dequeue_is_fifo() {
        let queue = JobQueue::new();
        let first = trivial_job();
        let first_id = first.id;
        queue.enqueue(first).unwrap();
        queue.enqueue(trivial_job()).unwrap();
        let popped = queue.dequeue(false, None).unwrap();
        assert_eq!(popped.id, first_id);
    }

    #[test]
    fn dequeue_non_blocking_returns_empty() {
        let queue = JobQueue::new();
        let err = queue.dequeue(false, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Empty);
    }

    #[test]
    fn enqueue_after_close_fails() {
        let queue = JobQueue::new();
        queue.close();
        let err = queue.enqueue(trivial_job()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueClosed);
    }

    #[test]
    fn draining_queue_still_drains_existing_jobs() {
        let queue = JobQueue::new();
        queue.enqueue(trivial_job()).unwrap();
        queue.drain();
        assert!(queue.enqueue(trivial_job()).is_err());
        assert!(queue.dequeue(false, None).is_ok());
        let err = queue.dequeue(false, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueClosed);
    }

    #[test]
    fn close_wakes_blocked_dequeue() {
        use std::sync::Arc;
        use std::thread;
        let queue = Arc::new(JobQueue::new());
        let waiter = queue.clone();
        let handle = thread::spawn(move || waiter.dequeue(true, None));
        thread::sleep(Duration::from_millis(50));
        queue.close();
        let result = handle.join().unwrap();
        assert_eq!(result.unwrap_err().kind, ErrorKind::QueueClosed);
    }

    #[test]
    fn clear_drops_pending_jobs() {
        let queue = JobQueue::new();
        queue.enqueue(trivial_job()).unwrap();
        queue.enqueue(trivial_job()).unwrap();
        queue.clear();
        assert_eq!(queue.size(), 0);
    }
}
