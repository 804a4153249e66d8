//! Integration tests for the upload cycle.
//!
//! These tests drive a full cycle against a scripted modem and check the
//! order of exchanges, their outcomes, and the state the session ends in.

use firenet_modem::{
    HttpGet, ModemSession, ScriptedTransport, SessionConfig, SessionState, CTRL_Z,
};

fn fast_config() -> SessionConfig {
    SessionConfig {
        response_timeout_ms: 30,
        poll_interval_ms: 5,
        ..SessionConfig::default()
    }
}

fn request() -> HttpGet {
    HttpGet::new("https://api.thingspeak.com/update", "TESTKEY")
        .with_field(514)
        .with_field(273)
        .with_field(4021)
        .with_field("0.05")
}

const EXPECTED_WRITES: [&str; 8] = [
    "AT",
    "AT+CGATT?",
    "AT+QICSGP=1,\"internet.t-mobile.cz\",\"gprs\",\"gprs\"",
    "AT+QIDNSIP=1",
    "AT+QIOPEN=\"TCP\",\"api.thingspeak.com\",\"80\"",
    "AT+QISEND",
    "GET https://api.thingspeak.com/update?api_key=TESTKEY&field1=514&field2=273&field3=4021&field4=0.05",
    "AT+QIDEACT",
];

const EXPECTED_STEPS: [SessionState; 8] = [
    SessionState::AtPing,
    SessionState::GprsAttachCheck,
    SessionState::ApnConfigured,
    SessionState::DnsModeSet,
    SessionState::TcpConnected,
    SessionState::SendPromptReceived,
    SessionState::ConnectionClosed,
    SessionState::ContextDeactivated,
];

// ============================================================================
// Full Cycle
// ============================================================================

#[test]
fn test_happy_path_cycle() {
    let config = fast_config();
    let transport = ScriptedTransport::happy_path(&config);
    let mut session = ModemSession::new(transport, config);

    let report = session.run_upload_cycle(&request());

    assert!(report.succeeded(), "failed steps: {:?}", report.failed_steps());
    assert_eq!(report.exchanges.len(), 8);
    assert_eq!(report.final_state, SessionState::Idle);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(report.attached(), Some(true));

    let steps: Vec<_> = report.exchanges.iter().map(|e| e.step).collect();
    assert_eq!(steps, EXPECTED_STEPS);

    let transport = session.into_transport();
    assert!(transport.is_exhausted());
    assert_eq!(transport.written_lines(), EXPECTED_WRITES);
}

#[test]
fn test_silent_modem_still_runs_every_step() {
    let mut session = ModemSession::new(ScriptedTransport::new(), fast_config());

    let report = session.run_upload_cycle(&request());

    assert_eq!(report.exchanges.len(), 8);
    assert!(report.exchanges.iter().all(|e| !e.matched));
    assert_eq!(report.failed_steps(), EXPECTED_STEPS);
    assert_eq!(report.final_state, SessionState::Idle);
    assert_eq!(session.into_transport().written_lines(), EXPECTED_WRITES);
}

#[test]
fn test_failed_apn_does_not_stop_open() {
    let transport = ScriptedTransport::new()
        .expect("AT\r", &["OK"])
        .expect("AT+CGATT?", &["+CGATT: 0", "OK"])
        .expect("AT+QICSGP", &["ERROR"])
        .expect("AT+QIDNSIP", &["OK"])
        .expect("AT+QIOPEN", &["OK", "CONNECT OK"])
        .expect("AT+QISEND", &[">"])
        .expect("GET ", &["SEND OK", "CLOSED"])
        .expect("AT+QIDEACT", &["DEACT OK"]);
    let mut session = ModemSession::new(transport, fast_config());

    let report = session.run_upload_cycle(&request());

    assert_eq!(report.exchanges.len(), 8);
    assert_eq!(report.failed_steps(), vec![SessionState::ApnConfigured]);
    assert_eq!(report.attached(), Some(false));
    assert!(report.exchanges[4].matched);
    assert_eq!(report.exchanges[4].replies, vec!["OK", "CONNECT OK"]);
}

#[test]
fn test_open_error_fails_the_open_exchange() {
    let transport = ScriptedTransport::new()
        .expect("AT\r", &["OK"])
        .expect("AT+CGATT?", &["OK"])
        .expect("AT+QICSGP", &["OK"])
        .expect("AT+QIDNSIP", &["OK"])
        .expect("AT+QIOPEN", &["ERROR"])
        .expect("AT+QISEND", &["ERROR"])
        .expect("GET ", &[])
        .expect("AT+QIDEACT", &["DEACT OK"]);
    let mut session = ModemSession::new(transport, fast_config());

    let report = session.run_upload_cycle(&request());

    assert_eq!(
        report.failed_steps(),
        vec![
            SessionState::TcpConnected,
            SessionState::SendPromptReceived,
            SessionState::ConnectionClosed,
        ]
    );
    assert!(report.exchanges[7].matched);
    assert_eq!(report.final_state, SessionState::Idle);
}

#[test]
fn test_payload_is_terminated_with_sub() {
    let config = fast_config();
    let mut session = ModemSession::new(ScriptedTransport::happy_path(&config), config);

    session.run_upload_cycle(&request());

    let transport = session.into_transport();
    let payload = &transport.written()[6];
    assert!(payload.starts_with(b"GET https://api.thingspeak.com/update?api_key=TESTKEY"));
    assert!(payload.ends_with(&[b'\r', b'\n', CTRL_Z]));
}

#[test]
fn test_echo_mode_cycle() {
    let config = fast_config();
    let transport = ScriptedTransport::happy_path(&config).with_echo();
    let mut session = ModemSession::new(transport, config);

    let report = session.run_upload_cycle(&request());

    assert!(report.succeeded(), "failed steps: {:?}", report.failed_steps());
}

// ============================================================================
// Optional Steps
// ============================================================================

#[test]
fn test_optional_steps_extend_the_script() {
    let config = SessionConfig {
        diagnostics: true,
        resolve_host: true,
        explicit_close: true,
        ..fast_config()
    };
    let transport = ScriptedTransport::happy_path(&config);
    let mut session = ModemSession::new(transport, config);

    let report = session.run_upload_cycle(&request());

    assert!(report.succeeded(), "failed steps: {:?}", report.failed_steps());
    assert_eq!(report.exchanges.len(), 13);
    assert_eq!(report.signal_quality().map(|csq| csq.rssi), Some(21));

    let requests: Vec<_> = report.exchanges.iter().map(|e| e.request.as_str()).collect();
    assert_eq!(&requests[..4], ["AT", "AT+CPIN?", "AT+CREG?", "AT+CSQ"]);
    assert_eq!(requests[7], "AT+QIDNSGIP=\"api.thingspeak.com\"");
    assert_eq!(requests[11], "AT+QICLOSE");
    assert_eq!(requests[12], "AT+QIDEACT");
}

#[test]
fn test_consecutive_cycles_start_fresh() {
    let config = fast_config();
    let mut session = ModemSession::new(ScriptedTransport::happy_path(&config), config);

    let first = session.run_upload_cycle(&request());
    let second = session.run_upload_cycle(&request());

    assert!(first.succeeded());
    assert_eq!(second.exchanges.len(), 8);
    assert!(!second.succeeded());
    assert_eq!(second.final_state, SessionState::Idle);
    assert_eq!(session.into_transport().written().len(), 16);
}
