//! Telnet proxy: a `connect` command typed at the proxy's prompt

use super::{Outbox, ProxyOutcome};
use crate::socket::ReadWrite;

const KIND: &str = "TELNET";

#[derive(Debug, Clone)]
pub struct TelnetProxy {
    request: String,
    outbox: Outbox,
}

impl TelnetProxy {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            request: format!("connect {host} {port}\r\n"),
            outbox: Outbox::default(),
        }
    }

    /// The proxy's own banner and prompt are left in the stream.
    pub fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        self.outbox.clear();
        self.outbox.queue(KIND, self.request.as_bytes());
        self.resume(socket)
    }

    /// Done once the whole request line has been written
    pub fn resume(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        match self.outbox.drain(socket, KIND) {
            Some(outcome) => outcome,
            None => ProxyOutcome::Success,
        }
    }

    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    pub fn close(&mut self) {
        self.outbox.clear();
    }
}
