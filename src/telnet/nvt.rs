//! NVT output policy: local line editing in line mode, immediate transmission
//! in character mode.

use super::codes::{escape_iac_into, TelnetCommand, IAC};

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const CTRL_R: u8 = 0x12;
const CTRL_U: u8 = 0x15;
const CTRL_V: u8 = 0x16;
const CTRL_W: u8 = 0x17;
const CTRL_BACKSLASH: u8 = 0x1c;
const DEL: u8 = 0x7f;

/// A piece of outbound NVT traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireChunk {
    /// Data bytes, not yet IAC-escaped
    Data(Vec<u8>),
    /// A two-byte TELNET command
    Command(TelnetCommand),
}

/// Result of feeding typed bytes through the NVT policy
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NvtOutput {
    /// Bytes to echo locally to the NVT consumer
    pub echo: Vec<u8>,
    /// Traffic for the host
    pub wire: Vec<WireChunk>,
}

impl NvtOutput {
    fn push_data(&mut self, data: &[u8]) {
        if let Some(WireChunk::Data(existing)) = self.wire.last_mut() {
            existing.extend_from_slice(data);
        } else {
            self.wire.push(WireChunk::Data(data.to_vec()));
        }
    }

    /// Render the wire chunks as raw TELNET bytes
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in &self.wire {
            match chunk {
                WireChunk::Data(data) => escape_iac_into(&mut out, data),
                WireChunk::Command(cmd) => out.extend_from_slice(&[IAC, *cmd as u8]),
            }
        }
        out
    }

    /// Data chunks only, concatenated and unescaped
    pub fn data_bytes(&self) -> Vec<u8> {
        self.wire
            .iter()
            .filter_map(|c| match c {
                WireChunk::Data(d) => Some(d.as_slice()),
                WireChunk::Command(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}

/// Local line buffer used while the host is not echoing.
#[derive(Debug, Default)]
pub struct LineEditor {
    line: Vec<u8>,
    literal_next: bool,
    last_was_cr: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes typed but not yet transmitted
    pub fn pending(&self) -> &[u8] {
        &self.line
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.literal_next = false;
        self.last_was_cr = false;
    }

    /// Feed typed bytes in line mode.
    pub fn feed(&mut self, input: &[u8], out: &mut NvtOutput) {
        for &byte in input {
            self.feed_byte(byte, out);
        }
    }

    fn feed_byte(&mut self, byte: u8, out: &mut NvtOutput) {
        if self.literal_next {
            self.literal_next = false;
            self.line.push(byte);
            out.echo.push(byte);
            return;
        }

        let after_cr = std::mem::replace(&mut self.last_was_cr, false);
        match byte {
            b'\r' | b'\n' => {
                if byte == b'\n' && after_cr {
                    return;
                }
                self.last_was_cr = byte == b'\r';
                let mut line = std::mem::take(&mut self.line);
                line.extend_from_slice(b"\r\n");
                out.push_data(&line);
                out.echo.extend_from_slice(b"\r\n");
            }
            BACKSPACE | DEL => {
                if self.line.pop().is_some() {
                    out.echo.extend_from_slice(b"\x08 \x08");
                }
            }
            CTRL_U => {
                for _ in 0..self.line.len() {
                    out.echo.extend_from_slice(b"\x08 \x08");
                }
                self.line.clear();
            }
            CTRL_W => {
                while self.line.last() == Some(&b' ') {
                    self.line.pop();
                    out.echo.extend_from_slice(b"\x08 \x08");
                }
                while matches!(self.line.last(), Some(&c) if c != b' ') {
                    self.line.pop();
                    out.echo.extend_from_slice(b"\x08 \x08");
                }
            }
            CTRL_R => {
                out.echo.extend_from_slice(b"^R\r\n");
                out.echo.extend_from_slice(&self.line);
            }
            CTRL_V => {
                self.literal_next = true;
            }
            CTRL_C => {
                self.line.clear();
                out.echo.extend_from_slice(b"^C\r\n");
                out.wire.push(WireChunk::Command(TelnetCommand::IP));
            }
            CTRL_BACKSLASH => {
                self.line.clear();
                out.echo.extend_from_slice(b"^\\\r\n");
                out.wire.push(WireChunk::Command(TelnetCommand::BRK));
            }
            CTRL_D => {
                if self.line.is_empty() {
                    out.wire.push(WireChunk::Command(TelnetCommand::XEOF));
                } else {
                    // Flush what is typed without a line terminator
                    let line = std::mem::take(&mut self.line);
                    out.push_data(&line);
                }
            }
            _ => {
                self.line.push(byte);
                out.echo.push(byte);
            }
        }
    }
}

/// Character-mode translation: bytes go out at once, CR becomes CR NUL unless
/// the BINARY option is in effect on our side.
pub fn char_mode_output(input: &[u8], binary: bool, out: &mut NvtOutput) {
    let mut data = Vec::with_capacity(input.len());
    for &byte in input {
        data.push(byte);
        if byte == b'\r' && !binary {
            data.push(0);
        }
    }
    out.push_data(&data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_is_sent_on_cr() {
        let mut editor = LineEditor::new();
        let mut out = NvtOutput::default();
        editor.feed(b"ls -l\r", &mut out);
        assert_eq!(out.wire, vec![WireChunk::Data(b"ls -l\r\n".to_vec())]);
        assert_eq!(out.echo, b"ls -l\r\n");
        assert!(editor.pending().is_empty());
    }

    #[test]
    fn test_crlf_sends_once() {
        let mut editor = LineEditor::new();
        let mut out = NvtOutput::default();
        editor.feed(b"a\r\nb\n", &mut out);
        assert_eq!(out.data_bytes(), b"a\r\nb\r\n");
    }

    #[test]
    fn test_erase_and_kill() {
        let mut editor = LineEditor::new();
        let mut out = NvtOutput::default();
        editor.feed(b"helo\x08lo", &mut out);
        assert_eq!(editor.pending(), b"hello");
        editor.feed(&[CTRL_U], &mut out);
        assert!(editor.pending().is_empty());
        assert!(out.wire.is_empty());
    }

    #[test]
    fn test_word_erase() {
        let mut editor = LineEditor::new();
        let mut out = NvtOutput::default();
        editor.feed(b"one two  ", &mut out);
        editor.feed(&[CTRL_W], &mut out);
        assert_eq!(editor.pending(), b"one ");
    }

    #[test]
    fn test_interrupt_sends_ip() {
        let mut editor = LineEditor::new();
        let mut out = NvtOutput::default();
        editor.feed(&[b'x', CTRL_C], &mut out);
        assert_eq!(out.wire, vec![WireChunk::Command(TelnetCommand::IP)]);
        assert_eq!(out.to_wire_bytes(), vec![255, 244]);
    }

    #[test]
    fn test_literal_next_keeps_control_char() {
        let mut editor = LineEditor::new();
        let mut out = NvtOutput::default();
        editor.feed(&[CTRL_V, CTRL_C], &mut out);
        assert_eq!(editor.pending(), &[CTRL_C]);
    }

    #[test]
    fn test_char_mode_cr_nul() {
        let mut out = NvtOutput::default();
        char_mode_output(b"a\r", false, &mut out);
        assert_eq!(out.data_bytes(), b"a\r\0");

        let mut out = NvtOutput::default();
        char_mode_output(&[b'\r', 0xff], true, &mut out);
        assert_eq!(out.to_wire_bytes(), vec![b'\r', 0xff, 0xff]);
    }
}
