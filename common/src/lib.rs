pub mod animation;
pub mod app;
pub mod button;
pub mod config;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod gesture;
pub mod led;
pub mod log_buffer;
pub mod monitor;
pub mod ring;
pub mod types;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use animation::{AnimationCursor, AnimationFrame, AnimationScheduler, FrameKind, Playlist};
pub use app::{Effect, Event, PartyEngine};
pub use button::{ButtonDecoder, ButtonEdge};
pub use config::{NetworkConfig, PartyConfig, RuntimeConfig, WebhookConfig};
pub use controller::{Controller, DeviceCommand};
pub use drivers::{Clock, Devices, LedStrip, Link, Platform, SecureTransport, Speech};
pub use error::{ConfigError, TransportError};
pub use gesture::{GestureEvent, GestureRecognizer};
pub use led::{LedMask, Procedure, PIXEL_COUNT};
pub use log_buffer::LogBuffer;
pub use monitor::{LinkEvent, NetworkMonitor};
pub use ring::RingBuffer;
pub use types::{AppState, ErrorCode, SettingsOption, Voice};
pub use webhook::{classify, WebhookClient, WebhookOutcome, WebhookReport};
