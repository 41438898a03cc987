//! Serial line feed: a bounded replay buffer plus live fan-out.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// Lines kept for replay when a consumer attaches.
pub const MONITOR_BUFFER_LINES: usize = 20;

const CHANNEL_CAPACITY: usize = 256;

/// Holds the most recent serial lines and broadcasts each new one.
///
/// Publishing and attaching both happen under the same lock, so an attaching
/// consumer sees every line exactly once: either in the replay or live.
#[derive(Debug)]
pub struct SerialFeed {
    lines: Mutex<VecDeque<String>>,
    tx: broadcast::Sender<String>,
}

impl Default for SerialFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(MONITOR_BUFFER_LINES)),
            tx,
        }
    }

    pub fn publish(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == MONITOR_BUFFER_LINES {
            lines.pop_front();
        }
        lines.push_back(line.clone());
        // no live subscribers is fine
        let _ = self.tx.send(line);
    }

    /// Buffered lines, oldest first, plus a receiver for everything after them.
    pub fn attach(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let lines = self.lines.lock();
        (lines.iter().cloned().collect(), self.tx.subscribe())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn recent(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}
