//! Bounded in-memory event log for operators and tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 200;

/// One posted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusEvent {
    pub ts: DateTime<Utc>,
    pub tag: String,
    pub msg: String,
}

/// Ring buffer of recent gate events. Oldest entries fall off first.
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    buf: Mutex<VecDeque<BusEvent>>,
    tx: watch::Sender<Vec<BusEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            capacity: capacity.max(1),
            buf: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            tx,
        }
    }

    pub fn post(&self, tag: &str, msg: impl Into<String>) {
        let event = BusEvent {
            ts: Utc::now(),
            tag: tag.to_string(),
            msg: msg.into(),
        };
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(event);
        // publish under the lock so subscribers never see posts out of order
        self.tx.send_replace(buf.iter().rev().cloned().collect());
    }

    /// Events newest-first.
    pub fn snapshot(&self) -> Vec<BusEvent> {
        self.tx.borrow().clone()
    }

    /// Live newest-first view, replayed to new subscribers.
    pub fn subscribe(&self) -> watch::Receiver<Vec<BusEvent>> {
        self.tx.subscribe()
    }

    /// Events carrying `tag`, newest-first.
    pub fn with_tag(&self, tag: &str) -> Vec<BusEvent> {
        self.tx
            .borrow()
            .iter()
            .filter(|e| e.tag == tag)
            .cloned()
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
