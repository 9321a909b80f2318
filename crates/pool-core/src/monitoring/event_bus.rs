//! Priority-ordered in-process pub/sub with bounded back-pressure (C8).

use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

/// Priority of an [`EventEnvelope`]; ordering is strictly by priority
/// descending, then enqueue timestamp ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// An opaque, type-tagged payload moved through the bus.
pub struct EventEnvelope {
    pub type_tag: &'static str,
    pub payload: Arc<dyn Any + Send + Sync>,
    pub priority: EventPriority,
    pub enqueue_timestamp: DateTime<Utc>,
    pub id: u64,
}

impl EventEnvelope {
    pub fn new<T: Send + Sync + 'static>(type_tag: &'static str, payload: T, priority: EventPriority) -> Self {
        Self {
            type_tag,
            payload: Arc::new(payload),
            priority,
            enqueue_timestamp: Utc::now(),
            id: next_event_id(),
        }
    }
}

impl PartialEq for EventEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for EventEnvelope {}

impl PartialOrd for EventEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEnvelope {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; priority descending then timestamp ascending
        // (older first) means: higher priority sorts "greater", and for equal
        // priority, the *older* timestamp must sort "greater" so it pops first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueue_timestamp.cmp(&self.enqueue_timestamp))
            .then_with(|| other.id.cmp(&self.id))
    }
}

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);
fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle returned by [`EventBus::subscribe`]; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken {
    pub type_tag: &'static str,
    pub handler_id: u64,
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, envelope: &EventEnvelope);
}

impl<F> EventHandler for F
where
    F: Fn(&EventEnvelope) + Send + Sync,
{
    fn handle(&self, envelope: &EventEnvelope) {
        self(envelope)
    }
}

struct Subscription {
    handler_id: u64,
    priority: i32,
    handler: Arc<dyn EventHandler>,
}

/// Configuration for [`EventBus::new`].
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub max_queue_size: usize,
    pub worker_thread_count: usize,
    pub processing_interval: Duration,
    pub back_pressure_threshold: usize,
    pub auto_start: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            worker_thread_count: 1,
            processing_interval: Duration::from_millis(50),
            back_pressure_threshold: 8_000,
            auto_start: true,
        }
    }
}

impl EventBusConfig {
    pub fn validate(&self) -> PoolResult<()> {
        if self.worker_thread_count == 0 {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidConfiguration,
                "worker_thread_count must be >= 1",
            ));
        }
        if self.back_pressure_threshold > self.max_queue_size {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidConfiguration,
                "back_pressure_threshold must be <= max_queue_size",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BusStats {
    published: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
}

struct QueueState {
    heap: BinaryHeap<EventEnvelope>,
}

/// Priority-ordered, bounded, back-pressured in-process event bus.
pub struct EventBus {
    config: EventBusConfig,
    queue: Arc<Mutex<QueueState>>,
    condvar: Arc<Condvar>,
    subscribers: Arc<DashMap<&'static str, Vec<Subscription>>>,
    next_handler_id: AtomicU64,
    stats: Arc<BusStats>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            queue: Arc::new(Mutex::new(QueueState {
                heap: BinaryHeap::new(),
            })),
            condvar: Arc::new(Condvar::new()),
            subscribers: Arc::new(DashMap::new()),
            next_handler_id: AtomicU64::new(1),
            stats: Arc::new(BusStats::default()),
            workers: Mutex::new(Vec::new()),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        for _ in 0..self.config.worker_thread_count {
            let queue = self.queue.clone();
            let condvar = self.condvar.clone();
            let subscribers = self.subscribers.clone();
            let stats = self.stats.clone();
            let stopping = self.stopping.clone();
            let processing_interval = self.config.processing_interval;
            workers.push(thread::spawn(move || {
                Self::worker_loop(queue, condvar, subscribers, stats, stopping, processing_interval);
            }));
        }
    }

    fn worker_loop(
        queue: Arc<Mutex<QueueState>>,
        condvar: Arc<Condvar>,
        subscribers: Arc<DashMap<&'static str, Vec<Subscription>>>,
        stats: Arc<BusStats>,
        stopping: Arc<AtomicBool>,
        processing_interval: Duration,
    ) {
        loop {
            let batch = {
                let mut state = queue.lock();
                if state.heap.is_empty() && !stopping.load(Ordering::Acquire) {
                    condvar.wait_for(&mut state, processing_interval);
                }
                if state.heap.is_empty() && stopping.load(Ordering::Acquire) {
                    return;
                }
                let mut batch = Vec::new();
                while batch.len() < 10 {
                    match state.heap.pop() {
                        Some(envelope) => batch.push(envelope),
                        None => break,
                    }
                }
                batch
            };

            for envelope in &batch {
                if let Some(handlers) = subscribers.get(envelope.type_tag) {
                    for sub in handlers.iter() {
                        // Handler panics are caught and counted, never propagated.
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            sub.handler.handle(envelope);
                        }));
                        if result.is_err() {
                            tracing::warn!(handler_id = sub.handler_id, "event handler panicked");
                        }
                    }
                }
                stats.processed.fetch_add(1, Ordering::Relaxed);
            }

            if batch.is_empty() && stopping.load(Ordering::Acquire) {
                let state = queue.lock();
                if state.heap.is_empty() {
                    return;
                }
            }
        }
    }

    /// Drops the event, increments `dropped`, and returns `ResourceExhausted`
    /// once the queue is at capacity; otherwise stalls briefly under
    /// back-pressure before inserting.
    pub fn publish(&self, envelope: EventEnvelope) -> PoolResult<()> {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        {
            let state = self.queue.lock();
            if state.heap.len() >= self.config.max_queue_size {
                drop(state);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(ErrorInfo::new(
                    ErrorKind::ResourceExhausted,
                    "event bus queue is full",
                ));
            }
        }
        if self.queue.lock().heap.len() >= self.config.back_pressure_threshold {
            thread::sleep(Duration::from_millis(5));
        }
        {
            let mut state = self.queue.lock();
            state.heap.push(envelope);
        }
        self.condvar.notify_one();
        Ok(())
    }

    pub fn subscribe(
        &self,
        type_tag: &'static str,
        priority: i32,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionToken {
        let handler_id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.subscribers.entry(type_tag).or_default();
        entry.push(Subscription {
            handler_id,
            priority,
            handler,
        });
        entry.sort_by(|a, b| b.priority.cmp(&a.priority));
        SubscriptionToken {
            type_tag,
            handler_id,
        }
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        if let Some(mut entry) = self.subscribers.get_mut(token.type_tag) {
            entry.retain(|sub| sub.handler_id != token.handler_id);
        }
    }

    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }
    pub fn processed(&self) -> u64 {
        self.stats.processed.load(Ordering::Relaxed)
    }
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
    pub fn pending(&self) -> u64 {
        self.queue.lock().heap.len() as u64
    }

    /// Drains the queue before terminating worker threads.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        self.condvar.notify_all();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn publish_drops_past_capacity_and_counts_it() {
        let bus = EventBus::new(EventBusConfig {
            max_queue_size: 2,
            back_pressure_threshold: 2,
            auto_start: false,
            ..Default::default()
        });
        assert!(bus.publish(EventEnvelope::new("t", 1u32, EventPriority::Low)).is_ok());
        assert!(bus.publish(EventEnvelope::new("t", 2u32, EventPriority::Low)).is_ok());
        let err = bus
            .publish(EventEnvelope::new("t", 3u32, EventPriority::Low))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
        assert_eq!(bus.dropped(), 1);
    }

    #[test]
    fn scenario_s6_back_pressure_and_publish_order() {
        let bus = Arc::new(EventBus::new(EventBusConfig {
            max_queue_size: 10,
            back_pressure_threshold: 8,
            worker_thread_count: 1,
            processing_interval: Duration::from_millis(10),
            auto_start: true,
        }));
        bus.start();

        let observed: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let observed_clone = observed.clone();
        bus.subscribe(
            "s6",
            0,
            Arc::new(move |envelope: &EventEnvelope| {
                let value = *envelope.payload.downcast_ref::<u32>().unwrap();
                observed_clone.lock().push(value);
            }),
        );

        let mut ok_count = 0;
        let mut dropped_count = 0;
        for i in 0..11u32 {
            match bus.publish(EventEnvelope::new("s6", i, EventPriority::Normal)) {
                Ok(()) => ok_count += 1,
                Err(_) => dropped_count += 1,
            }
        }
        assert_eq!(ok_count, 10);
        assert_eq!(dropped_count, 1);
        assert_eq!(bus.dropped(), 1);

        // Let the worker drain.
        for _ in 0..50 {
            if bus.pending() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let seen = observed.lock().clone();
        assert_eq!(seen.len(), 10);
        assert_eq!(seen, (0..10u32).collect::<Vec<_>>());
    }

    #[test]
    fn invariant_published_equals_processed_plus_dropped_plus_pending() {
        let bus = EventBus::new(EventBusConfig {
            max_queue_size: 5,
            back_pressure_threshold: 5,
            auto_start: false,
            ..Default::default()
        });
        for i in 0..7u32 {
            let _ = bus.publish(EventEnvelope::new("t", i, EventPriority::Normal));
        }
        assert_eq!(
            bus.published(),
            bus.processed() + bus.dropped() + bus.pending()
        );
    }

    #[test]
    fn subscribers_are_sorted_by_priority_descending() {
        let bus = EventBus::new(EventBusConfig {
            auto_start: false,
            ..Default::default()
        });
        let order = Arc::new(Mutex::new(Vec::new()));
        let order1 = order.clone();
        bus.subscribe("t", 1, Arc::new(move |_: &EventEnvelope| order1.lock().push(1)));
        let order2 = order.clone();
        bus.subscribe("t", 5, Arc::new(move |_: &EventEnvelope| order2.lock().push(5)));
        let order3 = order.clone();
        bus.subscribe("t", 3, Arc::new(move |_: &EventEnvelope| order3.lock().push(3)));

        bus.start();
        bus.publish(EventEnvelope::new("t", 0u32, EventPriority::Normal)).unwrap();
        for _ in 0..50 {
            if bus.processed() >= 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*order.lock(), vec![5, 3, 1]);
    }

    #[test]
    fn handler_panic_is_caught_and_counted_not_propagated() {
        let bus = EventBus::new(EventBusConfig {
            auto_start: false,
            processing_interval: Duration::from_millis(5),
            ..Default::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.subscribe(
            "panic",
            0,
            Arc::new(move |_: &EventEnvelope| {
                calls_clone.fetch_add(1, Ordering::Relaxed);
                panic!("boom");
            }),
        );
        bus.start();
        bus.publish(EventEnvelope::new("panic", 0u32, EventPriority::Normal)).unwrap();
        for _ in 0..50 {
            if bus.processed() >= 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(bus.processed(), 1);
    }
}
