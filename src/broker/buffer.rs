//! Bounded delivery buffer
//!
//! A `DeliveryBuffer` is the sink a subscription registers with the hub. The
//! hub pushes into it without ever waiting; a single consumer drains it with
//! `next().await`. When the buffer is full the oldest event is evicted, which
//! gives slow connections at-most-once delivery of the most recent state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::broker::message::Event;
use crate::broker::topic::Sink;
use crate::utils::error::SinkUnavailable;

#[derive(Debug)]
pub struct DeliveryBuffer {
    queue: Mutex<VecDeque<Arc<Event>>>,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
    notify: Notify,
}

impl DeliveryBuffer {
    /// Create a buffer holding at most `capacity` events (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event, evicting the oldest one if the buffer is full.
    pub fn push(&self, event: Arc<Event>) -> Result<(), SinkUnavailable> {
        if self.is_closed() {
            return Err(SinkUnavailable);
        }

        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                if let Some(evicted) = queue.pop_front() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(event_id = evicted.id, "delivery buffer full, dropped oldest event");
                }
            }
            queue.push_back(event);
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next buffered event. Returns `None` once the buffer is closed.
    pub async fn next(&self) -> Option<Arc<Event>> {
        loop {
            if let Some(event) = self.try_next() {
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Pop the next buffered event without waiting.
    pub fn try_next(&self) -> Option<Arc<Event>> {
        if self.is_closed() {
            return None;
        }
        self.queue.lock().pop_front()
    }

    /// Close the buffer and discard anything still queued. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.queue.lock().clear();
            self.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Sink for DeliveryBuffer {
    fn deliver(&self, event: Arc<Event>) -> Result<(), SinkUnavailable> {
        self.push(event)
    }
}
