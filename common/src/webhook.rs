//! One-shot HTTPS webhook call announcing a party.
//!
//! The call blocks the control loop: up to `max_attempts` connects (each
//! bounded by `connect_timeout_ms`, separated by `retry_delay_ms`), then a
//! single request and a full read of the reply.

use crate::{
    config::WebhookConfig,
    drivers::{Clock, SecureTransport},
    error::TransportError,
    log_buffer::LogBuffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    StayActive,
    Deferred,
    Refused,
    Failed,
}

impl WebhookOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StayActive => "STAY_ACTIVE",
            Self::Deferred => "DEFERRED",
            Self::Refused => "REFUSED",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookReport {
    pub outcome: WebhookOutcome,
    /// The request reached the server; `Failed` then means an unrecognised reply.
    pub delivered: bool,
    pub test: bool,
}

const VOCABULARY: [(&str, WebhookOutcome); 3] = [
    ("PARTY", WebhookOutcome::StayActive),
    ("ANNOUNCED", WebhookOutcome::Deferred),
    ("REFUSED", WebhookOutcome::Refused),
];

/// Maps a reply body to an outcome by substring, so chunk-size framing such
/// as `"5\nPARTY\n0"` still matches.
pub fn classify(body: &str) -> WebhookOutcome {
    VOCABULARY
        .iter()
        .find(|(keyword, _)| body.contains(keyword))
        .map(|(_, outcome)| *outcome)
        .unwrap_or(WebhookOutcome::Failed)
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    config: WebhookConfig,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> Self {
        Self { config }
    }

    pub fn request(&self, test: bool) -> String {
        let resource = if test {
            &self.config.test_resource
        } else {
            &self.config.resource
        };
        format!(
            "GET {resource} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.config.host
        )
    }

    pub fn call<T: SecureTransport, C: Clock>(
        &self,
        transport: &mut T,
        clock: &mut C,
        log: &mut LogBuffer,
        test: bool,
    ) -> WebhookReport {
        let failed = WebhookReport {
            outcome: WebhookOutcome::Failed,
            delivered: false,
            test,
        };

        log.trace(format!("Connecting to {}", self.config.host));
        if let Err(err) = self.connect_with_retry(transport, clock, log) {
            log.error(format!("Connection failed: {err}"));
            return failed;
        }
        log.trace("Connected");

        let request = self.request(test);
        log.trace(format!(
            "Requesting {}{}",
            self.config.host,
            request.split_whitespace().nth(1).unwrap_or_default()
        ));
        if let Err(err) = transport.send(request.as_bytes()) {
            log.error(format!("Request failed: {err}"));
            transport.close();
            return failed;
        }

        let body = match read_response(transport, log) {
            Ok(body) => body,
            Err(err) => {
                log.error(format!("Reading response failed: {err}"));
                transport.close();
                return WebhookReport {
                    delivered: true,
                    ..failed
                };
            }
        };
        transport.close();

        let outcome = classify(&body);
        log.trace(format!("Webhook outcome {}", outcome.as_str()));
        WebhookReport {
            outcome,
            delivered: true,
            test,
        }
    }

    fn connect_with_retry<T: SecureTransport, C: Clock>(
        &self,
        transport: &mut T,
        clock: &mut C,
        log: &mut LogBuffer,
    ) -> Result<(), TransportError> {
        let mut last_err = TransportError::ConnectFailed {
            host: self.config.host.clone(),
            port: self.config.port,
        };

        for attempt in 1..=self.config.max_attempts {
            match transport.connect(
                &self.config.host,
                self.config.port,
                &self.config.fingerprint,
                self.config.connect_timeout_ms,
            ) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log.trace(format!(
                        "Connect attempt {attempt}/{} failed: {err}",
                        self.config.max_attempts
                    ));
                    last_err = err;
                }
            }

            if attempt < self.config.max_attempts {
                clock.delay_ms(self.config.retry_delay_ms);
            }
        }

        Err(last_err)
    }
}

/// Skips the header block and returns the body, lines joined with `\n`.
fn read_response<T: SecureTransport>(
    transport: &mut T,
    log: &mut LogBuffer,
) -> Result<String, TransportError> {
    while transport.is_connected() || transport.available() {
        let line = match transport.read_line() {
            Ok(line) => line,
            Err(TransportError::Closed) => break,
            Err(err) => return Err(err),
        };
        log.trace(&line);
        if line.trim_end_matches('\r').is_empty() {
            break;
        }
    }

    // Past the headers a stalled or dropped stream ends the body; whatever
    // arrived is still classified.
    let mut body = String::new();
    while transport.available() || transport.is_connected() {
        match transport.read_line() {
            Ok(line) => {
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(line.trim_end_matches('\r'));
            }
            Err(TransportError::Closed) => break,
            Err(err) => {
                log.trace(format!("Body read ended: {err}"));
                break;
            }
        }
    }
    if !body.is_empty() {
        log.trace(&body);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, ScriptedTransport};
    use pretty_assertions::assert_eq;

    fn client() -> WebhookClient {
        WebhookClient::new(WebhookConfig {
            host: "hooks.example.org".to_string(),
            resource: "/party".to_string(),
            test_resource: "/party?test=1".to_string(),
            ..WebhookConfig::default()
        })
    }

    #[test]
    fn classifies_by_substring() {
        assert_eq!(classify("PARTY"), WebhookOutcome::StayActive);
        assert_eq!(classify("5\nANNOUNCED\n0"), WebhookOutcome::Deferred);
        assert_eq!(classify("REFUSED"), WebhookOutcome::Refused);
        assert_eq!(classify(""), WebhookOutcome::Failed);
        assert_eq!(classify("garbage"), WebhookOutcome::Failed);
    }

    #[test]
    fn builds_fixed_get_request() {
        assert_eq!(
            client().request(false),
            "GET /party HTTP/1.1\r\nHost: hooks.example.org\r\nConnection: close\r\n\r\n"
        );
        assert!(client().request(true).starts_with("GET /party?test=1 "));
    }

    #[test]
    fn skips_headers_and_classifies_chunked_body() {
        let mut transport = ScriptedTransport::replying(&[
            "HTTP/1.1 200 OK\r",
            "Transfer-Encoding: chunked\r",
            "\r",
            "5\r",
            "PARTY\r",
            "0\r",
        ]);
        let mut clock = ManualClock::default();
        let mut log = LogBuffer::new();

        let report = client().call(&mut transport, &mut clock, &mut log, false);

        assert_eq!(
            report,
            WebhookReport {
                outcome: WebhookOutcome::StayActive,
                delivered: true,
                test: false,
            }
        );
        assert_eq!(transport.connects, 1);
        assert_eq!(
            String::from_utf8(transport.sent.clone()).unwrap(),
            client().request(false)
        );
        assert!(transport.closed);
    }

    #[test]
    fn header_text_is_not_classified() {
        let mut transport = ScriptedTransport::replying(&["X-Reason: PARTY\r", "\r", "nope"]);
        let mut clock = ManualClock::default();
        let mut log = LogBuffer::new();

        let report = client().call(&mut transport, &mut clock, &mut log, false);

        assert_eq!(report.outcome, WebhookOutcome::Failed);
        assert!(report.delivered);
    }

    #[test]
    fn read_timeout_after_body_still_classifies() {
        let mut transport = ScriptedTransport::replying(&["HTTP/1.1 200 OK\r", "\r", "PARTY\r"]);
        transport.stall_after_reply = true;
        let mut clock = ManualClock::default();
        let mut log = LogBuffer::new();

        let report = client().call(&mut transport, &mut clock, &mut log, false);

        assert_eq!(
            report,
            WebhookReport {
                outcome: WebhookOutcome::StayActive,
                delivered: true,
                test: false,
            }
        );
        assert!(transport.closed);
    }

    #[test]
    fn read_error_in_headers_still_counts_as_delivered() {
        let mut transport = ScriptedTransport::replying(&[]);
        transport.stall_after_reply = true;
        let mut clock = ManualClock::default();
        let mut log = LogBuffer::new();

        let report = client().call(&mut transport, &mut clock, &mut log, false);

        assert_eq!(report.outcome, WebhookOutcome::Failed);
        assert!(report.delivered);
    }

    #[test]
    fn retries_connect_then_gives_up_without_sending() {
        let mut transport = ScriptedTransport::unreachable();
        let mut clock = ManualClock::default();
        let mut log = LogBuffer::new();

        let report = client().call(&mut transport, &mut clock, &mut log, true);

        assert_eq!(
            report,
            WebhookReport {
                outcome: WebhookOutcome::Failed,
                delivered: false,
                test: true,
            }
        );
        assert_eq!(transport.connects, 3);
        assert!(transport.sent.is_empty());
        // Two gaps between three attempts.
        assert_eq!(clock.now_ms(), 200);
        assert!(log.entries().any(|line| line.starts_with("[Error] Connection failed")));
    }

    #[test]
    fn second_attempt_success_proceeds() {
        let mut transport = ScriptedTransport::replying(&["\r", "REFUSED"]);
        transport.failures_before_connect = 1;
        let mut clock = ManualClock::default();
        let mut log = LogBuffer::new();

        let report = client().call(&mut transport, &mut clock, &mut log, false);

        assert_eq!(report.outcome, WebhookOutcome::Refused);
        assert_eq!(transport.connects, 2);
    }
}
