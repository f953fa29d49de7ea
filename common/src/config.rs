use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::Voice};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyConfig {
    pub long_press_stage_ms: [u64; 3],
    pub link_poll_interval_ms: u64,
    pub link_grace_ms: u64,
    pub party_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub standby_timeout_ms: u64,
    pub boot_link_checks: u32,
    pub boot_check_animation_ms: u64,
    /// Treat a delivered request with an unrecognised reply as "party on".
    pub fail_open: bool,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            long_press_stage_ms: [1_000, 2_000, 3_000],
            link_poll_interval_ms: 2_000,
            link_grace_ms: 10_000,
            party_timeout_ms: 14_400_000,
            wait_timeout_ms: 300_000,
            standby_timeout_ms: 1_800_000,
            boot_link_checks: 20,
            boot_check_animation_ms: 500,
            fail_open: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
    pub resource: String,
    pub test_resource: String,
    /// SHA-1 fingerprint of the server certificate, hex with ':' or ' ' separators.
    pub fingerprint: String,
    pub connect_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "maker.ifttt.com".to_string(),
            port: 443,
            resource: "/trigger/party/with/key".to_string(),
            test_resource: "/trigger/party_test/with/key".to_string(),
            fingerprint: String::new(),
            connect_timeout_ms: 10_000,
            max_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub party: PartyConfig,
    pub webhook: WebhookConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub voice: Voice,
}

impl PartyConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        let mut previous = 0;
        for threshold in self.long_press_stage_ms.iter_mut() {
            if *threshold <= previous {
                *threshold = previous + 1_000;
            }
            previous = *threshold;
        }

        if self.link_poll_interval_ms == 0 {
            self.link_poll_interval_ms = defaults.link_poll_interval_ms;
        }
        self.link_grace_ms = self.link_grace_ms.max(self.link_poll_interval_ms);

        if self.party_timeout_ms == 0 {
            self.party_timeout_ms = defaults.party_timeout_ms;
        }
        if self.wait_timeout_ms == 0 {
            self.wait_timeout_ms = defaults.wait_timeout_ms;
        }
        if self.standby_timeout_ms == 0 {
            self.standby_timeout_ms = defaults.standby_timeout_ms;
        }

        self.boot_link_checks = self.boot_link_checks.clamp(1, 120);
        self.boot_check_animation_ms = self.boot_check_animation_ms.clamp(100, 5_000);
    }
}

impl WebhookConfig {
    pub fn sanitize(&mut self) {
        self.max_attempts = self.max_attempts.clamp(1, 10);
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(500, 60_000);
        self.retry_delay_ms = self.retry_delay_ms.min(5_000);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyWebhookHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        for resource in [&self.resource, &self.test_resource] {
            if !resource.starts_with('/') {
                return Err(ConfigError::InvalidResource(resource.clone()));
            }
        }
        Ok(())
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.party.sanitize();
        self.webhook.sanitize();
    }
}
