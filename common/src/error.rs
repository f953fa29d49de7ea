use thiserror::Error;

/// Failures surfaced by a [`crate::SecureTransport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection to {host}:{port} failed")]
    ConnectFailed { host: String, port: u16 },
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("connection closed by peer")]
    Closed,
    #[error("transport i/o error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("webhook host is empty")]
    EmptyWebhookHost,
    #[error("webhook resource `{0}` must start with '/'")]
    InvalidResource(String),
    #[error("webhook port must be non-zero")]
    InvalidPort,
    #[error("webhook needs at least one connect attempt")]
    ZeroAttempts,
}
