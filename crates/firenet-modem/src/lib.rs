//! # firenet-modem
//!
//! Uploads sensor readings through a Quectel M95-family GSM/GPRS modem by
//! driving its AT command interface over a serial byte stream.
//!
//! ## Components
//!
//! - [`LineCodec`]: splits the modem's output into response lines
//! - [`AtCommand`] and [`ResponseLine`]: typed commands and replies
//! - [`ModemTransport`]: the byte stream, with [`ScriptedTransport`] for tests
//! - [`ModemSession`]: the attach, open, send, close, deactivate cycle
//!
//! ## Example
//!
//! ```
//! use firenet_modem::{HttpGet, ModemSession, ScriptedTransport, SessionConfig, SessionState};
//!
//! let config = SessionConfig { response_timeout_ms: 50, poll_interval_ms: 5, ..Default::default() };
//! let transport = ScriptedTransport::happy_path(&config);
//! let mut session = ModemSession::new(transport, config);
//!
//! let request = HttpGet::new("https://api.thingspeak.com/update", "KEY").with_field(273);
//! let report = session.run_upload_cycle(&request);
//! assert!(report.succeeded());
//! assert_eq!(session.state(), SessionState::Idle);
//! ```

mod codec;
mod commands;
mod error;
mod http;
mod responses;
mod session;
mod transport;

pub use codec::{LineCodec, COMMAND_TERMINATOR, CTRL_Z, MAX_LINE_LENGTH};
pub use commands::AtCommand;
pub use error::{ModemError, ModemResult};
pub use http::{HttpGet, DEFAULT_BASE_URL};
pub use responses::{
    parse_attach_state, ResponseLine, SignalQuality, CLOSED_PREFIX, CLOSE_PREFIX, CONNECT_PREFIX,
    DEACT_PREFIX, ERROR_PREFIX, OK_PREFIX, PROMPT_PREFIX, SEND_PREFIX,
};
pub use session::{
    CycleReport, ExchangeRecord, ModemSession, SessionConfig, SessionState, WaitOutcome,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESPONSE_TIMEOUT_MS, MAX_RESPONSE_TIMEOUT_MS,
};
pub use transport::{ModemTransport, ScriptedTransport};
