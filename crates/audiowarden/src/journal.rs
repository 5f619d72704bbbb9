//! Bounded in-memory event log shown to users.
//!
//! Entries are evicted oldest-first once the rendered text exceeds the byte
//! cap. Every append is also published on a broadcast channel so a UI or
//! notifier can follow the log live without polling.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::broadcast;

use crate::ports::LogSink;

const LIVE_CHANNEL_CAPACITY: usize = 256;

/// One user-facing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    /// `[HH:MM:SS] message`
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }

    /// Bytes this entry occupies in the rendered log, newline included.
    fn rendered_len(&self) -> usize {
        self.render().len() + 1
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<LogEntry>,
    bytes: usize,
}

/// Byte-capped log buffer shared between the daemon and its observers.
#[derive(Debug)]
pub struct LogBuffer {
    inner: Mutex<Inner>,
    capacity_bytes: usize,
    live: broadcast::Sender<LogEntry>,
}

impl LogBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            capacity_bytes,
            live,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.bytes += entry.rendered_len();
            inner.entries.push_back(entry.clone());

            // The newest entry always survives, even when it alone exceeds the cap
            while inner.bytes > self.capacity_bytes && inner.entries.len() > 1 {
                if let Some(evicted) = inner.entries.pop_front() {
                    inner.bytes -= evicted.rendered_len();
                }
            }
        }

        // No receivers is fine
        let _ = self.live.send(entry);
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.iter().cloned().collect()
    }

    /// The whole log as newline-terminated lines.
    pub fn render(&self) -> String {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::with_capacity(inner.bytes);
        for entry in &inner.entries {
            out.push_str(&entry.render());
            out.push('\n');
        }
        out
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).bytes
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Follow new entries as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live.subscribe()
    }
}

impl LogSink for LogBuffer {
    fn append(&self, timestamp: DateTime<Local>, message: String) {
        self.push(LogEntry { timestamp, message });
    }
}
