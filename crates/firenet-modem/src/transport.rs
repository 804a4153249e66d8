//! Byte-stream transports for talking to the modem.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use crate::error::ModemResult;
use crate::SessionConfig;

/// A bidirectional byte stream connected to the modem's UART.
pub trait ModemTransport {
    /// Write all bytes to the modem.
    fn write_all(&mut self, data: &[u8]) -> ModemResult<()>;

    /// Read whatever arrives within `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in the window. Implementations
    /// must not block much longer than `timeout`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> ModemResult<usize>;

    /// Re-establish the link if it was lost. Called before every upload cycle.
    fn ensure_connected(&mut self) -> ModemResult<()> {
        Ok(())
    }
}

impl<T: ModemTransport + ?Sized> ModemTransport for &mut T {
    fn write_all(&mut self, data: &[u8]) -> ModemResult<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> ModemResult<usize> {
        (**self).read(buf, timeout)
    }

    fn ensure_connected(&mut self) -> ModemResult<()> {
        (**self).ensure_connected()
    }
}

impl<T: ModemTransport + ?Sized> ModemTransport for Box<T> {
    fn write_all(&mut self, data: &[u8]) -> ModemResult<()> {
        (**self).write_all(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> ModemResult<usize> {
        (**self).read(buf, timeout)
    }

    fn ensure_connected(&mut self) -> ModemResult<()> {
        (**self).ensure_connected()
    }
}

// ============================================================================
// Scripted Transport
// ============================================================================

#[derive(Debug)]
struct Expectation {
    trigger: Vec<u8>,
    replies: Vec<u8>,
}

/// A transport that answers writes from a fixed script.
///
/// Each expectation is consumed in order: when a write starts with the
/// front expectation's trigger, its replies become readable. A write that
/// does not match gets no answer, which the session sees as a timeout.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    expectations: VecDeque<Expectation>,
    pending: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    echo: bool,
}

impl ScriptedTransport {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a full successful upload cycle for `config`.
    pub fn happy_path(config: &SessionConfig) -> Self {
        let mut script = Self::new().expect("AT\r", &["OK"]);
        if config.diagnostics {
            script = script
                .expect("AT+CPIN?", &["+CPIN: READY", "OK"])
                .expect("AT+CREG?", &["+CREG: 0,1", "OK"])
                .expect("AT+CSQ", &["+CSQ: 21,0", "OK"]);
        }
        script = script
            .expect("AT+CGATT?", &["+CGATT: 1", "OK"])
            .expect("AT+QICSGP", &["OK"])
            .expect("AT+QIDNSIP", &["OK"]);
        if config.resolve_host {
            script = script.expect("AT+QIDNSGIP", &["OK", "93.184.216.34"]);
        }
        script = script
            .expect("AT+QIOPEN", &["OK", "CONNECT OK"])
            .expect("AT+QISEND", &[">"])
            .expect("GET ", &["SEND OK", "CLOSED"]);
        if config.explicit_close {
            script = script.expect("AT+QICLOSE", &["CLOSE OK"]);
        }
        script.expect("AT+QIDEACT", &["DEACT OK"])
    }

    /// Queue an expectation. A reply of `">"` is sent as the bare prompt.
    pub fn expect(mut self, trigger: &str, replies: &[&str]) -> Self {
        let mut bytes = Vec::new();
        for reply in replies {
            if *reply == ">" {
                bytes.extend_from_slice(b"\r\n> ");
            } else {
                bytes.extend_from_slice(b"\r\n");
                bytes.extend_from_slice(reply.as_bytes());
                bytes.extend_from_slice(b"\r\n");
            }
        }
        self.expectations.push_back(Expectation {
            trigger: trigger.as_bytes().to_vec(),
            replies: bytes,
        });
        self
    }

    /// Make bytes readable immediately, independent of any write.
    pub fn unsolicited(mut self, text: &str) -> Self {
        self.pending.extend(text.as_bytes());
        self
    }

    /// Echo every write back, as a modem in `ATE1` mode does.
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Every write, in order.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Every write as text with terminators stripped.
    pub fn written_lines(&self) -> Vec<String> {
        self.written
            .iter()
            .map(|data| {
                String::from_utf8_lossy(data)
                    .trim_end_matches(|c: char| c == '\r' || c == '\n' || c == '\u{1a}')
                    .to_string()
            })
            .collect()
    }

    /// True once every expectation has been triggered.
    pub fn is_exhausted(&self) -> bool {
        self.expectations.is_empty()
    }
}

impl ModemTransport for ScriptedTransport {
    fn write_all(&mut self, data: &[u8]) -> ModemResult<()> {
        self.written.push(data.to_vec());
        if self.echo {
            self.pending.extend(data.iter().filter(|&&b| b != crate::codec::CTRL_Z));
        }
        let matched = self
            .expectations
            .front()
            .is_some_and(|expectation| data.starts_with(&expectation.trigger));
        if matched {
            if let Some(expectation) = self.expectations.pop_front() {
                self.pending.extend(expectation.replies);
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> ModemResult<usize> {
        if self.pending.is_empty() {
            thread::sleep(timeout);
            return Ok(0);
        }
        let count = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}
