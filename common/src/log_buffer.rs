//! Diagnostic message log kept in RAM and served read-only by the device's
//! HTTP endpoint. Entries are also forwarded to the `log` facade.

use log::{info, warn};

use crate::ring::RingBuffer;

pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: RingBuffer<String, LOG_CAPACITY>,
    revision: u64,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{message}");
        self.push(format!("[Trace] {message}"));
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!("{message}");
        self.push(format!("[Error] {message}"));
    }

    fn push(&mut self, line: String) {
        self.entries.push(line);
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every append so readers can skip unchanged snapshots.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Oldest-first dump, one entry per line.
    pub fn snapshot(&self) -> String {
        let mut text = String::from("Last log entries:\n");
        for entry in self.entries.iter() {
            text.push_str(entry);
            if !entry.ends_with('\n') {
                text.push('\n');
            }
        }
        text
    }
}
