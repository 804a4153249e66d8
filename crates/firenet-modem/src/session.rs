//! The upload session: one attach, open, send, close, deactivate cycle.
//!
//! ```text
//! IDLE -> AT_PING -> GPRS_ATTACH_CHECK -> APN_CONFIGURED -> DNS_MODE_SET
//!      -> TCP_OPEN_REQUESTED -> TCP_CONNECTED -> SEND_PROMPT_RECEIVED
//!      -> PAYLOAD_SENT -> SEND_CONFIRMED -> CONNECTION_CLOSED
//!      -> CONTEXT_DEACTIVATED -> IDLE
//! ```
//!
//! Every step is attempted in order whatever the outcome of the previous
//! one. A failed exchange is logged and recorded in the [`CycleReport`];
//! nothing is retried and nothing is rolled back.

use std::time::{Duration, Instant};

use firenet_metrics::{metric_defs, MetricLabels};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::LineCodec;
use crate::error::{ModemError, ModemResult};
use crate::responses::{
    parse_attach_state, ResponseLine, SignalQuality, CLOSED_PREFIX, CLOSE_PREFIX, CONNECT_PREFIX,
    DEACT_PREFIX, ERROR_PREFIX, OK_PREFIX, PROMPT_PREFIX, SEND_PREFIX,
};
use crate::{AtCommand, HttpGet, ModemTransport};

/// Default time to wait for a matching reply.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5_000;

/// Longest accepted response timeout.
pub const MAX_RESPONSE_TIMEOUT_MS: u64 = 600_000;

/// Default length of a single transport poll.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

const READ_CHUNK: usize = 128;

// ============================================================================
// Configuration
// ============================================================================

/// Parameters of the upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Access point name.
    pub apn: String,
    /// APN user name.
    pub apn_user: String,
    /// APN password.
    pub apn_password: String,
    /// Telemetry host.
    pub host: String,
    /// Telemetry port.
    pub port: u16,
    /// How long each wait may take, in milliseconds.
    pub response_timeout_ms: u64,
    /// Length of one transport poll, in milliseconds.
    pub poll_interval_ms: u64,
    /// Query SIM, registration and signal quality after the ping.
    pub diagnostics: bool,
    /// Resolve the host with `AT+QIDNSGIP` before opening.
    pub resolve_host: bool,
    /// Send `AT+QICLOSE` after the far end closes.
    pub explicit_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            apn: "internet.t-mobile.cz".to_string(),
            apn_user: "gprs".to_string(),
            apn_password: "gprs".to_string(),
            host: "api.thingspeak.com".to_string(),
            port: 80,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            diagnostics: false,
            resolve_host: false,
            explicit_close: false,
        }
    }
}

impl SessionConfig {
    /// Timeout for a single wait, capped at [`MAX_RESPONSE_TIMEOUT_MS`].
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.min(MAX_RESPONSE_TIMEOUT_MS))
    }

    /// Length of one transport poll.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the configuration for values that would make the session useless.
    pub fn validate(&self) -> ModemResult<()> {
        if self.host.is_empty() {
            return Err(ModemError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.apn.is_empty() {
            return Err(ModemError::InvalidConfig("apn must not be empty".to_string()));
        }
        if self.response_timeout_ms == 0 {
            return Err(ModemError::InvalidConfig(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.response_timeout_ms > MAX_RESPONSE_TIMEOUT_MS {
            return Err(ModemError::InvalidConfig(format!(
                "response_timeout_ms must be at most {}",
                MAX_RESPONSE_TIMEOUT_MS
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ModemError::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Position of the session in the upload script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No cycle in progress.
    Idle,
    /// `AT` issued.
    AtPing,
    /// `AT+CGATT?` issued.
    GprsAttachCheck,
    /// APN configured.
    ApnConfigured,
    /// Domain-name connect mode selected.
    DnsModeSet,
    /// `AT+QIOPEN` accepted or timed out.
    TcpOpenRequested,
    /// `CONNECT` seen or timed out.
    TcpConnected,
    /// `>` prompt seen or timed out.
    SendPromptReceived,
    /// Request line and `SUB` written.
    PayloadSent,
    /// `SEND` seen or timed out.
    SendConfirmed,
    /// `CLOSED` seen or timed out.
    ConnectionClosed,
    /// `DEACT` seen or timed out.
    ContextDeactivated,
}

impl SessionState {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AtPing => "at_ping",
            SessionState::GprsAttachCheck => "gprs_attach_check",
            SessionState::ApnConfigured => "apn_configured",
            SessionState::DnsModeSet => "dns_mode_set",
            SessionState::TcpOpenRequested => "tcp_open_requested",
            SessionState::TcpConnected => "tcp_connected",
            SessionState::SendPromptReceived => "send_prompt_received",
            SessionState::PayloadSent => "payload_sent",
            SessionState::SendConfirmed => "send_confirmed",
            SessionState::ConnectionClosed => "connection_closed",
            SessionState::ContextDeactivated => "context_deactivated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Exchange Records
// ============================================================================

/// Outcome of waiting for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A line started with the expected prefix.
    Matched,
    /// A line started with `ERROR`.
    Rejected,
    /// Nothing matched before the timeout.
    TimedOut,
    /// The transport failed while reading.
    TransportFailed,
}

/// One request written to the modem and the replies it drew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    /// State reached when the exchange finished.
    pub step: SessionState,
    /// What was written, without terminators.
    pub request: String,
    /// Prefixes waited for, in order.
    pub expected: Vec<&'static str>,
    /// True only if every expected prefix was matched.
    pub matched: bool,
    /// Every non-empty line read during the exchange.
    pub replies: Vec<String>,
    /// Wall-clock time of the exchange.
    pub elapsed: Duration,
}

/// Summary of one upload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Exchanges in the order they were issued.
    pub exchanges: Vec<ExchangeRecord>,
    /// State after the cycle; always [`SessionState::Idle`].
    pub final_state: SessionState,
}

impl CycleReport {
    /// True if every exchange matched.
    pub fn succeeded(&self) -> bool {
        self.exchanges.iter().all(|exchange| exchange.matched)
    }

    /// Steps whose exchange did not match.
    pub fn failed_steps(&self) -> Vec<SessionState> {
        self.exchanges
            .iter()
            .filter(|exchange| !exchange.matched)
            .map(|exchange| exchange.step)
            .collect()
    }

    /// GPRS attach state reported by `AT+CGATT?`, if any.
    pub fn attached(&self) -> Option<bool> {
        self.info_value("+CGATT").and_then(|value| parse_attach_state(&value))
    }

    /// Signal quality reported by `AT+CSQ`, if diagnostics ran.
    pub fn signal_quality(&self) -> Option<SignalQuality> {
        self.info_value("+CSQ").and_then(|value| SignalQuality::parse(&value))
    }

    fn info_value(&self, name: &str) -> Option<String> {
        self.exchanges
            .iter()
            .flat_map(|exchange| exchange.replies.iter())
            .find_map(|line| ResponseLine::parse(line).info_value(name).map(str::to_string))
    }
}

// ============================================================================
// Script Steps
// ============================================================================

enum Request {
    Command(AtCommand),
    Payload(String),
}

impl Request {
    fn encode(&self) -> (Vec<u8>, String) {
        match self {
            Request::Command(cmd) => (cmd.encode(), cmd.to_command_string()),
            Request::Payload(line) => (LineCodec::encode_payload(line), line.clone()),
        }
    }
}

struct Step {
    request: Request,
    /// State entered as soon as the request is written.
    on_write: Option<SessionState>,
    /// Prefixes to wait for and the state entered after each wait.
    waits: Vec<(&'static str, SessionState)>,
}

impl Step {
    fn command(cmd: AtCommand, waits: Vec<(&'static str, SessionState)>) -> Self {
        Step {
            request: Request::Command(cmd),
            on_write: None,
            waits,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Drives the modem through the upload script over a byte-stream transport.
pub struct ModemSession<T: ModemTransport> {
    transport: T,
    config: SessionConfig,
    codec: LineCodec,
    state: SessionState,
    labels: MetricLabels,
}

impl<T: ModemTransport> ModemSession<T> {
    /// Create a new session.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        ModemSession {
            transport,
            config,
            codec: LineCodec::new(),
            state: SessionState::Idle,
            labels: MetricLabels::default(),
        }
    }

    /// Set the labels attached to emitted metrics.
    pub fn with_labels(mut self, labels: MetricLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give back the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Write `cmd` and wait for a line starting with `OK`.
    pub fn send_command(&mut self, cmd: &AtCommand) -> bool {
        self.send_command_expecting(cmd, OK_PREFIX)
    }

    /// Write `cmd` and wait for a line starting with `expected`.
    ///
    /// A line starting with `ERROR` ends the wait with `false`.
    pub fn send_command_expecting(&mut self, cmd: &AtCommand, expected: &str) -> bool {
        let text = cmd.to_command_string();
        info!("Sending command: \"{}\"", text);
        if let Err(e) = self.transport.write_all(&cmd.encode()) {
            warn!("write of \"{}\" failed: {}", text, e);
            return false;
        }
        self.wait_for(expected)
    }

    /// Wait for a line starting with `expected` without writing anything.
    pub fn wait_for(&mut self, expected: &str) -> bool {
        let mut replies = Vec::new();
        self.await_prefix(expected, &mut replies) == WaitOutcome::Matched
    }

    /// Run one full upload cycle for `request`.
    ///
    /// Every step is attempted; the session is [`SessionState::Idle`] on return.
    pub fn run_upload_cycle(&mut self, request: &HttpGet) -> CycleReport {
        self.codec.clear();
        self.state = SessionState::Idle;
        if let Err(e) = self.transport.ensure_connected() {
            warn!("modem transport unavailable: {}", e);
        }

        let steps = self.plan(request);
        let mut exchanges = Vec::with_capacity(steps.len());
        for step in steps {
            exchanges.push(self.run_step(step));
        }
        self.state = SessionState::Idle;

        let report = CycleReport {
            exchanges,
            final_state: self.state,
        };
        let outcome = if report.succeeded() { "ok" } else { "partial" };
        metrics::counter!(
            metric_defs::UPLOAD_CYCLES.name,
            &self.labels.with(&[("outcome", outcome.to_string())])
        )
        .increment(1);

        if report.succeeded() {
            info!("upload cycle complete ({} exchanges)", report.exchanges.len());
        } else {
            warn!(
                "upload cycle finished with failed steps: {:?}",
                report.failed_steps()
            );
        }
        report
    }

    fn plan(&self, request: &HttpGet) -> Vec<Step> {
        use SessionState::*;

        let config = &self.config;
        let mut steps = vec![Step::command(AtCommand::Ping, vec![(OK_PREFIX, AtPing)])];
        if config.diagnostics {
            for cmd in [AtCommand::SimPin, AtCommand::Registration, AtCommand::SignalQuality] {
                steps.push(Step::command(cmd, vec![(OK_PREFIX, AtPing)]));
            }
        }
        steps.push(Step::command(
            AtCommand::AttachStatus,
            vec![(OK_PREFIX, GprsAttachCheck)],
        ));
        steps.push(Step::command(
            AtCommand::SetApn {
                apn: config.apn.clone(),
                user: config.apn_user.clone(),
                password: config.apn_password.clone(),
            },
            vec![(OK_PREFIX, ApnConfigured)],
        ));
        steps.push(Step::command(
            AtCommand::DnsMode { use_domain: true },
            vec![(OK_PREFIX, DnsModeSet)],
        ));
        if config.resolve_host {
            steps.push(Step::command(
                AtCommand::ResolveHost {
                    host: config.host.clone(),
                },
                vec![(OK_PREFIX, DnsModeSet)],
            ));
        }
        steps.push(Step::command(
            AtCommand::Open {
                host: config.host.clone(),
                port: config.port,
            },
            vec![(OK_PREFIX, TcpOpenRequested), (CONNECT_PREFIX, TcpConnected)],
        ));
        steps.push(Step::command(
            AtCommand::Send,
            vec![(PROMPT_PREFIX, SendPromptReceived)],
        ));
        steps.push(Step {
            request: Request::Payload(request.request_line()),
            on_write: Some(PayloadSent),
            waits: vec![(SEND_PREFIX, SendConfirmed), (CLOSED_PREFIX, ConnectionClosed)],
        });
        if config.explicit_close {
            steps.push(Step::command(
                AtCommand::Close,
                vec![(CLOSE_PREFIX, ConnectionClosed)],
            ));
        }
        steps.push(Step::command(
            AtCommand::Deactivate,
            vec![(DEACT_PREFIX, ContextDeactivated)],
        ));
        steps
    }

    fn run_step(&mut self, step: Step) -> ExchangeRecord {
        let started = Instant::now();
        let (bytes, text) = step.request.encode();
        info!("Sending command: \"{}\"", text);

        let written = match self.transport.write_all(&bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("write of \"{}\" failed: {}", text, e);
                false
            }
        };
        if let Some(state) = step.on_write {
            self.state = state;
        }

        let mut matched = written;
        let mut replies = Vec::new();
        for &(prefix, next) in &step.waits {
            if written {
                matched &= self.await_prefix(prefix, &mut replies) == WaitOutcome::Matched;
            }
            self.state = next;
        }

        let elapsed = started.elapsed();
        let step_label = ("step", self.state.as_str().to_string());
        let outcome = if matched { "matched" } else { "failed" };
        metrics::counter!(
            metric_defs::MODEM_EXCHANGES.name,
            &self.labels.with(&[step_label.clone(), ("outcome", outcome.to_string())])
        )
        .increment(1);
        metrics::histogram!(
            metric_defs::MODEM_EXCHANGE_TIME.name,
            &self.labels.with(&[step_label])
        )
        .record(elapsed.as_secs_f64() * 1000.0);

        ExchangeRecord {
            step: self.state,
            request: text,
            expected: step.waits.iter().map(|&(prefix, _)| prefix).collect(),
            matched,
            replies,
            elapsed,
        }
    }

    /// Read lines until one starts with `expected` or `ERROR`, or time runs out.
    ///
    /// Lines that match neither are discarded. An unterminated fragment is
    /// tested once the transport goes quiet, which is how the bare `> `
    /// prompt is seen.
    fn await_prefix(&mut self, expected: &str, replies: &mut Vec<String>) -> WaitOutcome {
        let deadline = Instant::now() + self.config.response_timeout();
        let poll = self.config.poll_interval();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            while let Some(line) = self.codec.decode_line() {
                if let Some(outcome) = classify(&line, expected, replies) {
                    return outcome;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            match self.transport.read(&mut buf, poll.min(deadline - now)) {
                Ok(0) => {
                    if let Some(line) = self.codec.take_partial() {
                        if let Some(outcome) = classify(&line, expected, replies) {
                            return outcome;
                        }
                    }
                }
                Ok(n) => self.codec.push(&buf[..n]),
                Err(e) => {
                    warn!("read while waiting for {} failed: {}", expected, e);
                    return WaitOutcome::TransportFailed;
                }
            }
        }

        warn!("Did not receive {}", expected);
        WaitOutcome::TimedOut
    }
}

fn classify(line: &str, expected: &str, replies: &mut Vec<String>) -> Option<WaitOutcome> {
    debug!("Received: \"{}\"", line);
    replies.push(line.to_string());
    if line.starts_with(expected) {
        return Some(WaitOutcome::Matched);
    }
    if line.starts_with(ERROR_PREFIX) {
        return Some(WaitOutcome::Rejected);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedTransport;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            response_timeout_ms: 40,
            poll_interval_ms: 5,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_send_command_ok() {
        let transport = ScriptedTransport::new().expect("AT\r", &["OK"]);
        let mut session = ModemSession::new(transport, fast_config());
        assert!(session.send_command(&AtCommand::Ping));
        assert_eq!(session.transport().written()[0], b"AT\r\n");
    }

    #[test]
    fn test_send_command_error() {
        let transport = ScriptedTransport::new().expect("AT+CGATT?", &["ERROR"]);
        let mut session = ModemSession::new(transport, fast_config());
        assert!(!session.send_command(&AtCommand::AttachStatus));
    }

    #[test]
    fn test_send_command_timeout() {
        let mut session = ModemSession::new(ScriptedTransport::new(), fast_config());
        let started = Instant::now();
        assert!(!session.send_command(&AtCommand::Ping));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_unrelated_lines_are_skipped() {
        let transport = ScriptedTransport::new().expect("AT+CGATT?", &["+CGATT: 1", "OK"]);
        let mut session = ModemSession::new(transport.with_echo(), fast_config());
        assert!(session.send_command(&AtCommand::AttachStatus));
    }

    #[test]
    fn test_startup_banner_is_skipped() {
        let transport = ScriptedTransport::new()
            .unsolicited("\r\nRDY\r\n\r\nCall Ready\r\n")
            .expect("AT\r", &["OK"]);
        let mut session = ModemSession::new(transport, fast_config());
        assert!(session.send_command(&AtCommand::Ping));
    }

    #[test]
    fn test_expecting_custom_prefix() {
        let transport = ScriptedTransport::new().expect("AT+QIOPEN", &["OK", "CONNECT OK"]);
        let mut session = ModemSession::new(transport, fast_config());
        let open = AtCommand::Open {
            host: "api.thingspeak.com".to_string(),
            port: 80,
        };
        assert!(session.send_command_expecting(&open, "CONNECT"));
    }

    #[test]
    fn test_expecting_error_forces_false() {
        let transport = ScriptedTransport::new().expect("AT+QIOPEN", &["ERROR", "CONNECT OK"]);
        let mut session = ModemSession::new(transport, fast_config());
        let open = AtCommand::Open {
            host: "h".to_string(),
            port: 80,
        };
        assert!(!session.send_command_expecting(&open, "CONNECT"));
    }

    #[test]
    fn test_bare_prompt_matches() {
        let transport = ScriptedTransport::new().expect("AT+QISEND", &[">"]);
        let mut session = ModemSession::new(transport, fast_config());
        assert!(session.send_command_expecting(&AtCommand::Send, ">"));
    }

    #[test]
    fn test_config_validate() {
        assert!(SessionConfig::default().validate().is_ok());
        let config = SessionConfig {
            host: String::new(),
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ModemError::InvalidConfig(_))));
    }

    /// Fails every write until reconnected.
    struct DroppedLink {
        connected: bool,
        reconnects: usize,
    }

    impl ModemTransport for DroppedLink {
        fn write_all(&mut self, _data: &[u8]) -> ModemResult<()> {
            if self.connected {
                Ok(())
            } else {
                Err(ModemError::Disconnected)
            }
        }

        fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> ModemResult<usize> {
            Ok(0)
        }

        fn ensure_connected(&mut self) -> ModemResult<()> {
            self.reconnects += 1;
            self.connected = true;
            Ok(())
        }
    }

    #[test]
    fn test_cycle_reconnects_transport_first() {
        let link = DroppedLink {
            connected: false,
            reconnects: 0,
        };
        let mut session = ModemSession::new(link, fast_config());
        assert!(!session.send_command(&AtCommand::Ping));

        let request = HttpGet::new("http://example.com/update", "KEY");
        session.run_upload_cycle(&request);
        assert_eq!(session.transport().reconnects, 1);
        assert!(session.transport().connected);
    }

    #[test]
    fn test_huge_timeout_is_capped() {
        let config = SessionConfig {
            response_timeout_ms: u64::MAX,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ModemError::InvalidConfig(_))));
        assert_eq!(
            config.response_timeout(),
            Duration::from_millis(MAX_RESPONSE_TIMEOUT_MS)
        );
        let _deadline = Instant::now() + config.response_timeout();
    }

    #[test]
    fn test_config_from_yaml_defaults() {
        let config: SessionConfig = serde_yaml::from_str("apn: internet\nport: 8080\n").unwrap();
        assert_eq!(config.apn, "internet");
        assert_eq!(config.port, 8080);
        assert_eq!(config.response_timeout_ms, DEFAULT_RESPONSE_TIMEOUT_MS);
        assert!(!config.explicit_close);
    }
}
