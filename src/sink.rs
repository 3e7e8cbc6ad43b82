//! The consumer side of a connection: where de-framed host data goes.
//!
//! The 3270 data-stream interpreter and the NVT display live outside this crate.
//! They plug in through [`HostDataSink`], and the decode result decides how the
//! TN3270E layer answers requests for a response.

use crate::tn3270e::bind::BindImage;

/// Result of interpreting one 3270 record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Processed, nothing to send back
    OkNoOutput,
    /// Processed, and the interpreter produced an inbound record (e.g. a
    /// Read Buffer reply) to send to the host
    OkWithOutput(Vec<u8>),
    /// Unknown or invalid command
    BadCommand,
    /// Buffer address out of range
    BadAddress,
}

impl DecodeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, DecodeOutcome::OkNoOutput | DecodeOutcome::OkWithOutput(_))
    }
}

/// Receives host data once the TELNET and TN3270E layers have removed their
/// framing.
pub trait HostDataSink {
    /// A complete 3270 record (TN3270E header already stripped)
    fn process_3270(&mut self, data: &[u8]) -> DecodeOutcome;

    /// NVT text, or local echo of typed NVT input
    fn process_nvt(&mut self, data: &[u8]);

    /// SSCP-LU data, in TN3270E SSCP submode
    fn process_sscp(&mut self, data: &[u8]) -> DecodeOutcome {
        self.process_3270(data)
    }

    /// A BIND was accepted; the screen should be reset to the bound sizes.
    fn bind(&mut self, _image: &BindImage) {}

    /// The session was unbound; BIND-induced sizing should be reverted.
    fn unbind(&mut self) {}
}

/// Sink that discards everything. Useful while only negotiation matters.
#[derive(Debug, Default)]
pub struct NullSink;

impl HostDataSink for NullSink {
    fn process_3270(&mut self, _data: &[u8]) -> DecodeOutcome {
        DecodeOutcome::OkNoOutput
    }

    fn process_nvt(&mut self, _data: &[u8]) {}
}
