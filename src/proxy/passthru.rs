//! Sun telnet-passthru: one request line, no reply

use super::{Outbox, ProxyOutcome};
use crate::socket::ReadWrite;

const KIND: &str = "passthru";

#[derive(Debug, Clone)]
pub struct PassthruProxy {
    request: String,
    outbox: Outbox,
}

impl PassthruProxy {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            request: format!("{host} {port}\r\n"),
            outbox: Outbox::default(),
        }
    }

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
