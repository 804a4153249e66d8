//! Response line parsing.
//!
//! The modem answers with CRLF-terminated lines:
//! - Final results: `OK`, `ERROR`
//! - Connection notifications: `CONNECT OK`, `SEND OK`, `CLOSED`, `DEACT OK`
//! - The data prompt `> ` (sent without a line terminator)
//! - Information responses: `+CGATT: 1`, `+CSQ: 21,0`, ...
//!
//! The session matches lines by prefix; this module gives the lines a type
//! for logging and for pulling values out of information responses.

/// Success prefix.
pub const OK_PREFIX: &str = "OK";
/// Failure prefix, which ends any wait with a negative result.
pub const ERROR_PREFIX: &str = "ERROR";
/// TCP connection established.
pub const CONNECT_PREFIX: &str = "CONNECT";
/// Data prompt after `AT+QISEND`.
pub const PROMPT_PREFIX: &str = ">";
/// Payload accepted by the modem.
pub const SEND_PREFIX: &str = "SEND";
/// Remote end closed the socket.
pub const CLOSED_PREFIX: &str = "CLOSED";
/// Result of `AT+QICLOSE`.
pub const CLOSE_PREFIX: &str = "CLOSE";
/// GPRS context deactivated.
pub const DEACT_PREFIX: &str = "DEACT";

/// A parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine {
    /// `OK`.
    Ok,
    /// `ERROR`, possibly with detail.
    Error(String),
    /// `CONNECT ...`.
    Connect(String),
    /// `SEND OK` / `SEND FAIL`.
    Send(String),
    /// `CLOSED`.
    Closed,
    /// `DEACT OK`.
    Deact,
    /// The `>` data prompt.
    Prompt,
    /// Information response, `+NAME: value`.
    Info {
        /// Name including the `+`.
        name: String,
        /// Everything after `: `.
        value: String,
    },
    /// Anything else (echo, URCs, banners).
    Other(String),
}

impl ResponseLine {
    /// Parse a single line (without terminator).
    pub fn parse(text: &str) -> ResponseLine {
        let text = text.trim();

        if text == OK_PREFIX {
            return ResponseLine::Ok;
        }
        if text.starts_with(ERROR_PREFIX) {
            return ResponseLine::Error(text.to_string());
        }
        if text.starts_with(CONNECT_PREFIX) {
            return ResponseLine::Connect(text.to_string());
        }
        if text.starts_with(SEND_PREFIX) {
            return ResponseLine::Send(text.to_string());
        }
        if text == CLOSED_PREFIX {
            return ResponseLine::Closed;
        }
        if text.starts_with(DEACT_PREFIX) {
            return ResponseLine::Deact;
        }
        if text.starts_with(PROMPT_PREFIX) {
            return ResponseLine::Prompt;
        }
        if text.starts_with('+') {
            if let Some((name, value)) = text.split_once(':') {
                return ResponseLine::Info {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                };
            }
        }

        ResponseLine::Other(text.to_string())
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, ResponseLine::Error(_))
    }

    /// Get the value of an information response with the given name.
    pub fn info_value(&self, wanted: &str) -> Option<&str> {
        match self {
            ResponseLine::Info { name, value } if name == wanted => Some(value),
            _ => None,
        }
    }
}

/// Signal quality from `+CSQ: <rssi>,<ber>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    /// RSSI index 0-31, 99 = unknown.
    pub rssi: u8,
    /// Bit error rate index 0-7, 99 = unknown.
    pub ber: u8,
}

impl SignalQuality {
    /// Parse the value part of a `+CSQ` response.
    pub fn parse(value: &str) -> Option<SignalQuality> {
        let (rssi, ber) = value.split_once(',')?;
        Some(SignalQuality {
            rssi: rssi.trim().parse().ok()?,
            ber: ber.trim().parse().ok()?,
        })
    }

    /// Approximate RSSI in dBm, if known.
    pub fn rssi_dbm(&self) -> Option<i16> {
        match self.rssi {
            0..=31 => Some(-113 + 2 * i16::from(self.rssi)),
            _ => None,
        }
    }
}

/// Parse the value part of a `+CGATT` response.
pub fn parse_attach_state(value: &str) -> Option<bool> {
    match value.trim() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_finals() {
        assert_eq!(ResponseLine::parse("OK"), ResponseLine::Ok);
        assert!(ResponseLine::parse("ERROR").is_error());
        assert_eq!(ResponseLine::parse("CLOSED"), ResponseLine::Closed);
        assert_eq!(ResponseLine::parse("DEACT OK"), ResponseLine::Deact);
    }

    #[test]
    fn test_parse_notifications() {
        assert_eq!(
            ResponseLine::parse("CONNECT OK"),
            ResponseLine::Connect("CONNECT OK".to_string())
        );
        assert_eq!(ResponseLine::parse("SEND OK"), ResponseLine::Send("SEND OK".to_string()));
        assert_eq!(ResponseLine::parse("> "), ResponseLine::Prompt);
    }

    #[test]
    fn test_parse_info() {
        let line = ResponseLine::parse("+CGATT: 1");
        assert_eq!(line.info_value("+CGATT"), Some("1"));
        assert_eq!(line.info_value("+CSQ"), None);
        assert_eq!(parse_attach_state("1"), Some(true));
    }

    #[test]
    fn test_parse_echo_is_other() {
        assert_eq!(
            ResponseLine::parse("AT+QISEND"),
            ResponseLine::Other("AT+QISEND".to_string())
        );
    }

    #[test]
    fn test_signal_quality() {
        let csq = SignalQuality::parse("21,0").unwrap();
        assert_eq!(csq.rssi, 21);
        assert_eq!(csq.rssi_dbm(), Some(-71));
        assert_eq!(SignalQuality::parse("99,99").unwrap().rssi_dbm(), None);
        assert!(SignalQuality::parse("garbage").is_none());
    }
}
