//! Hardware seams. The control core only ever talks to the device through
//! these traits; each front-end (host simulation, ESP-IDF) provides one
//! implementation of each.

use std::net::Ipv4Addr;

use crate::{error::TransportError, led::LedMask, types::Voice};

pub trait LedStrip {
    /// Lights every pixel set in `mask`. Unset pixels are blanked unless
    /// `additive` is true.
    fn set_pixels(&mut self, mask: &LedMask, additive: bool);
    fn clear(&mut self);
    /// Flushes the staged pixel colours to the hardware.
    fn show(&mut self);
}

pub trait Speech {
    /// Blocks until the phrase has been spoken.
    fn say(&mut self, text: &str);
    fn set_voice(&mut self, voice: Voice);
}

pub trait Link {
    fn is_connected(&self) -> bool;
    fn local_ip(&self) -> Option<Ipv4Addr>;
}

pub trait SecureTransport {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        fingerprint: &str,
        timeout_ms: u64,
    ) -> Result<(), TransportError>;
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    /// Reads up to and excluding the next `\n`. A trailing `\r` is kept.
    fn read_line(&mut self) -> Result<String, TransportError>;
    fn is_connected(&self) -> bool;
    fn available(&self) -> bool;
    fn close(&mut self);
}

pub trait Clock {
    fn now_ms(&self) -> u64;
    /// Bounded busy wait; the only way the core ever blocks on time.
    fn delay_ms(&mut self, ms: u64);
}

/// Bundles the concrete driver types of one target.
pub trait Platform {
    type Led: LedStrip;
    type Speech: Speech;
    type Link: Link;
    type Transport: SecureTransport;
    type Clock: Clock;
}

pub struct Devices<P: Platform> {
    pub led: P::Led,
    pub speech: P::Speech,
    pub link: P::Link,
    pub transport: P::Transport,
    pub clock: P::Clock,
}
