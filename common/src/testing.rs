//! In-memory drivers for exercising the core without hardware.

use std::{collections::VecDeque, net::Ipv4Addr};

use crate::{
    drivers::{Clock, Devices, LedStrip, Link, Platform, SecureTransport, Speech},
    error::TransportError,
    led::LedMask,
    types::Voice,
};

#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: u64,
}

impl ManualClock {
    pub fn set(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn delay_ms(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}

#[derive(Debug, Default)]
pub struct RecordingStrip {
    staged: LedMask,
    pub shown: Vec<LedMask>,
}

impl LedStrip for RecordingStrip {
    fn set_pixels(&mut self, mask: &LedMask, additive: bool) {
        self.staged = if additive {
            self.staged.union(*mask)
        } else {
            *mask
        };
    }

    fn clear(&mut self) {
        self.staged = LedMask::NONE;
    }

    fn show(&mut self) {
        self.shown.push(self.staged);
    }
}

#[derive(Debug, Default)]
pub struct RecordingSpeech {
    pub said: Vec<String>,
    pub voice: Voice,
}

impl Speech for RecordingSpeech {
    fn say(&mut self, text: &str) {
        self.said.push(text.to_string());
    }

    fn set_voice(&mut self, voice: Voice) {
        self.voice = voice;
    }
}

#[derive(Debug)]
pub struct ScriptedLink {
    pub connected: bool,
    pub ip: Option<Ipv4Addr>,
}

impl Default for ScriptedLink {
    fn default() -> Self {
        Self {
            connected: true,
            ip: Some(Ipv4Addr::new(192, 168, 1, 42)),
        }
    }
}

impl Link for ScriptedLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }
}

const STALL_TIMEOUT_MS: u64 = 5_000;

/// Replays the same reply on every successful connect.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub reply: Vec<String>,
    pub failures_before_connect: u32,
    pub connects: u32,
    pub sent: Vec<u8>,
    pub closed: bool,
    /// Once the reply is drained, stay connected and time out on reads.
    pub stall_after_reply: bool,
    pending: VecDeque<String>,
    connected: bool,
}

impl ScriptedTransport {
    pub fn replying(lines: &[&str]) -> Self {
        Self {
            reply: lines.iter().map(|line| line.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            failures_before_connect: u32::MAX,
            ..Self::default()
        }
    }

    /// Reply with a bare body after an empty header block.
    pub fn body(body: &str) -> Self {
        let mut lines = vec!["HTTP/1.1 200 OK\r", "\r"];
        lines.extend(body.lines());
        Self::replying(&lines)
    }
}

impl SecureTransport for ScriptedTransport {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        _fingerprint: &str,
        _timeout_ms: u64,
    ) -> Result<(), TransportError> {
        self.connects += 1;
        if self.failures_before_connect > 0 {
            self.failures_before_connect = self.failures_before_connect.saturating_sub(1);
            return Err(TransportError::ConnectFailed {
                host: host.to_string(),
                port,
            });
        }
        self.connected = true;
        self.closed = false;
        self.pending = self.reply.iter().cloned().collect();
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Closed);
        }
        self.sent.extend_from_slice(bytes);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        match self.pending.pop_front() {
            Some(line) => Ok(line),
            None if self.connected && self.stall_after_reply => {
                Err(TransportError::Timeout(STALL_TIMEOUT_MS))
            }
            None => Err(TransportError::Closed),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && (self.stall_after_reply || !self.pending.is_empty())
    }

    fn available(&self) -> bool {
        !self.pending.is_empty()
    }

    fn close(&mut self) {
        self.connected = false;
        self.closed = true;
        self.pending.clear();
    }
}

pub struct FakePlatform;

impl Platform for FakePlatform {
    type Led = RecordingStrip;
    type Speech = RecordingSpeech;
    type Link = ScriptedLink;
    type Transport = ScriptedTransport;
    type Clock = ManualClock;
}

pub fn fake_devices(transport: ScriptedTransport) -> Devices<FakePlatform> {
    Devices {
        led: RecordingStrip::default(),
        speech: RecordingSpeech::default(),
        link: ScriptedLink::default(),
        transport,
        clock: ManualClock::default(),
    }
}
