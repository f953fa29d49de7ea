use crate::{config::PartyConfig, types::ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link was up at this poll.
    Restored,
    /// The link has been down for longer than the grace period.
    Lost(ErrorCode),
}

/// Polls link status on a fixed cadence and only escalates an outage once
/// the device has gone `grace_ms` without seeing the link up.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    interval_ms: u64,
    grace_ms: u64,
    last_poll_ms: Option<u64>,
    last_connected_ms: u64,
    connected: bool,
}

impl NetworkMonitor {
    pub fn new(config: &PartyConfig, now_ms: u64) -> Self {
        Self {
            interval_ms: config.link_poll_interval_ms,
            grace_ms: config.link_grace_ms,
            last_poll_ms: None,
            last_connected_ms: now_ms,
            connected: false,
        }
    }

    pub fn last_connected_ms(&self) -> u64 {
        self.last_connected_ms
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_poll_ms
            .map(|last| now_ms.saturating_sub(last) >= self.interval_ms)
            .unwrap_or(true)
    }

    /// Records an out-of-band sighting of the link, e.g. from the boot check.
    pub fn mark_connected(&mut self, now_ms: u64) {
        self.connected = true;
        self.last_connected_ms = now_ms;
    }

    /// Returns `None` when the poll interval has not elapsed yet or when an
    /// outage is still inside the grace period.
    pub fn poll(&mut self, now_ms: u64, link_up: bool) -> Option<LinkEvent> {
        if !self.is_due(now_ms) {
            return None;
        }
        self.last_poll_ms = Some(now_ms);
        self.connected = link_up;

        if link_up {
            self.last_connected_ms = now_ms;
            return Some(LinkEvent::Restored);
        }

        if now_ms.saturating_sub(self.last_connected_ms) >= self.grace_ms {
            Some(LinkEvent::Lost(ErrorCode::NoWifi))
        } else {
            None
        }
    }
}
