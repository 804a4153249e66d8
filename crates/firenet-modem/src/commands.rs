//! AT commands understood by the Quectel M95 family.
//!
//! Commands are sent as text terminated with `\r\n`. Only the subset used by
//! the upload cycle and its optional diagnostics is modelled; anything else
//! can go through [`AtCommand::Raw`].

use crate::codec::LineCodec;

/// Commands that can be sent to the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    // ========== Basic ==========
    /// Liveness check (`AT`).
    Ping,

    /// SIM PIN status (`AT+CPIN?`).
    SimPin,

    /// Network registration status (`AT+CREG?`).
    Registration,

    /// Signal quality report (`AT+CSQ`).
    SignalQuality,

    // ========== GPRS Context ==========
    /// GPRS attach status (`AT+CGATT?`).
    AttachStatus,

    /// Configure the APN for the foreground context.
    SetApn {
        /// Access point name.
        apn: String,
        /// APN user name.
        user: String,
        /// APN password.
        password: String,
    },

    /// Select whether `Open` takes a domain name (`1`) or a dotted IP (`0`).
    DnsMode {
        /// Connect by domain name.
        use_domain: bool,
    },

    /// Resolve a host name through the modem's DNS (`AT+QIDNSGIP`).
    ResolveHost {
        /// Host to resolve.
        host: String,
    },

    /// Deactivate the GPRS context (`AT+QIDEACT`).
    Deactivate,

    // ========== TCP ==========
    /// Open a TCP connection.
    Open {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
    },

    /// Ask for the send prompt (`AT+QISEND`).
    Send,

    /// Close the TCP connection (`AT+QICLOSE`).
    Close,

    // ========== Raw ==========
    /// Send a raw command string.
    Raw {
        /// The raw command text, without terminator.
        command: String,
    },
}

impl AtCommand {
    /// Encode the command with its `\r\n` terminator.
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_command(&self.to_command_string())
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            AtCommand::Ping => "AT".to_string(),
            AtCommand::SimPin => "AT+CPIN?".to_string(),
            AtCommand::Registration => "AT+CREG?".to_string(),
            AtCommand::SignalQuality => "AT+CSQ".to_string(),

            AtCommand::AttachStatus => "AT+CGATT?".to_string(),
            AtCommand::SetApn { apn, user, password } => {
                format!("AT+QICSGP=1,\"{}\",\"{}\",\"{}\"", apn, user, password)
            }
            AtCommand::DnsMode { use_domain } => format!("AT+QIDNSIP={}", u8::from(*use_domain)),
            AtCommand::ResolveHost { host } => format!("AT+QIDNSGIP=\"{}\"", host),
            AtCommand::Deactivate => "AT+QIDEACT".to_string(),

            AtCommand::Open { host, port } => format!("AT+QIOPEN=\"TCP\",\"{}\",\"{}\"", host, port),
            AtCommand::Send => "AT+QISEND".to_string(),
            AtCommand::Close => "AT+QICLOSE".to_string(),

            AtCommand::Raw { command } => command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ping() {
        assert_eq!(AtCommand::Ping.encode(), b"AT\r\n");
    }

    #[test]
    fn test_encode_set_apn() {
        let cmd = AtCommand::SetApn {
            apn: "internet.t-mobile.cz".to_string(),
            user: "gprs".to_string(),
            password: "gprs".to_string(),
        };
        assert_eq!(
            cmd.to_command_string(),
            "AT+QICSGP=1,\"internet.t-mobile.cz\",\"gprs\",\"gprs\""
        );
    }

    #[test]
    fn test_encode_open() {
        let cmd = AtCommand::Open {
            host: "api.thingspeak.com".to_string(),
            port: 80,
        };
        assert_eq!(cmd.encode(), b"AT+QIOPEN=\"TCP\",\"api.thingspeak.com\",\"80\"\r\n");
    }

    #[test]
    fn test_encode_dns_mode() {
        assert_eq!(AtCommand::DnsMode { use_domain: true }.to_command_string(), "AT+QIDNSIP=1");
        assert_eq!(AtCommand::DnsMode { use_domain: false }.to_command_string(), "AT+QIDNSIP=0");
    }
}
