//! Line-based codec for the modem's serial stream.
//!
//! Commands go out terminated with `\r\n`. Replies come back as lines
//! terminated by any mix of `\r` and `\n`, with blank lines between them.
//! The one exception is the data prompt `> `, which the modem sends without
//! a terminator; [`LineCodec::take_partial`] lets the reader flush it once
//! the line goes quiet.

use bytes::{Buf, BytesMut};

/// Maximum buffered reply length before the buffer is discarded.
pub const MAX_LINE_LENGTH: usize = 512;

/// Command terminator.
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// ASCII SUB, ends the payload after `AT+QISEND`.
pub const CTRL_Z: u8 = 0x1A;

/// Accumulates received bytes and splits them into non-empty lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_LINE_LENGTH && !self.buffer.iter().any(|&b| is_eol(b)) {
            log::warn!(
                "discarding {} bytes of unterminated modem output",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    /// Try to decode the next non-empty line.
    pub fn decode_line(&mut self) -> Option<String> {
        loop {
            self.skip_line_endings();
            let end = self.buffer.iter().position(|&b| is_eol(b))?;
            let line_data = self.buffer.split_to(end);
            let line = String::from_utf8_lossy(&line_data).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Take whatever unterminated text is buffered, if it is not blank.
    pub fn take_partial(&mut self) -> Option<String> {
        self.skip_line_endings();
        if self.buffer.is_empty() {
            return None;
        }
        let data = self.buffer.split();
        let line = String::from_utf8_lossy(&data).trim().to_string();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }

    /// Encode a command for transmission, appending `\r\n`.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + COMMAND_TERMINATOR.len());
        buf.extend_from_slice(cmd.as_bytes());
        buf.extend_from_slice(COMMAND_TERMINATOR);
        buf
    }

    /// Encode a data payload: the text, `\r\n`, then [`CTRL_Z`].
    pub fn encode_payload(text: &str) -> Vec<u8> {
        let mut buf = Self::encode_command(text);
        buf.push(CTRL_Z);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn skip_line_endings(&mut self) {
        let leading = self.buffer.iter().take_while(|&&b| is_eol(b)).count();
        self.buffer.advance(leading);
    }
}

fn is_eol(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}
