//! TELNET option negotiation FSM
//!
//! Bytes from the host are fed through [`TelnetSession::process`] in whatever
//! chunks the socket returns. The automaton separates data from commands,
//! answers option requests, dispatches sub-negotiations and, after every option
//! change that matters, re-evaluates which mode the connection is in.

use super::codes::*;
use super::environ::Environment;
use super::nvt::{char_mode_output, LineEditor, NvtOutput, WireChunk};
use super::options::OptionTable;
use crate::error::{NetError, TelnetError, TelnetResult};
use crate::sink::{DecodeOutcome, HostDataSink};
use crate::state::ConnectionState;
use crate::tn3270e::codes::FUNC_SYSREQ;
use crate::tn3270e::{Negotiation, Submode, Tn3270eOptions, Tn3270eSession};

/// Largest sub-negotiation we keep; anything longer is discarded at `IAC SE`
pub const SB_BUFFER_MAX: usize = 1024;

const OPT_BINARY: u8 = TelnetOption::Binary as u8;
const OPT_ECHO: u8 = TelnetOption::Echo as u8;
const OPT_SGA: u8 = TelnetOption::SuppressGoAhead as u8;
const OPT_TM: u8 = TelnetOption::TimingMark as u8;
const OPT_TTYPE: u8 = TelnetOption::TerminalType as u8;
const OPT_EOR: u8 = TelnetOption::EndOfRecord as u8;
const OPT_NAWS: u8 = TelnetOption::NAWS as u8;
const OPT_NEW_ENVIRON: u8 = TelnetOption::NewEnvironment as u8;
const OPT_TN3270E: u8 = TelnetOption::TN3270E as u8;
const OPT_STARTTLS: u8 = TelnetOption::StartTls as u8;

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetState {
    Data,
    Iac,
    Will,
    Wont,
    Do,
    Dont,
    Sb,
    SbIac,
}

/// What the FSM needs to know about the local terminal
#[derive(Debug, Clone)]
pub struct TelnetSettings {
    pub tn3270e: Tn3270eOptions,
    pub allow_tn3270e: bool,
    pub allow_starttls: bool,
    pub environment: Environment,
}

impl Default for TelnetSettings {
    fn default() -> Self {
        Self {
            tn3270e: Tn3270eOptions::default(),
            allow_tn3270e: true,
            allow_starttls: false,
            environment: Environment::default(),
        }
    }
}

/// Result of one [`TelnetSession::process`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Processed {
    /// Bytes of the input that were consumed
    pub consumed: usize,
    /// The host sent `SB STARTTLS FOLLOWS`; bytes after `consumed` belong to
    /// the TLS handshake
    pub start_tls: bool,
}

/// Options whose state change can move the connection between modes
fn affects_mode(option: u8) -> bool {
    matches!(
        option,
        OPT_BINARY | OPT_EOR | OPT_TTYPE | OPT_TN3270E | OPT_ECHO | OPT_SGA | OPT_NAWS
    )
}

/// Options whose change may take a fresh connection into NVT mode
fn nvt_trigger(option: u8) -> bool {
    matches!(option, OPT_ECHO | OPT_SGA | OPT_NAWS)
}

/// Per-connection TELNET state
pub struct TelnetSession {
    settings: TelnetSettings,
    state: TelnetState,
    options: OptionTable,
    sbbuf: Vec<u8>,
    sb_overflow: bool,
    /// 3270 record being accumulated until `IAC EOR`
    ibuf: Vec<u8>,
    /// NVT text not yet handed to the sink
    nvt_pending: Vec<u8>,
    output: Vec<u8>,
    line_editor: LineEditor,
    tn3270e: Tn3270eSession,
    mode: ConnectionState,
}

impl TelnetSession {
    pub fn new(settings: TelnetSettings) -> Self {
        let tn3270e = Tn3270eSession::new(settings.tn3270e.clone());
        Self {
            settings,
            state: TelnetState::Data,
            options: OptionTable::new(),
            sbbuf: Vec::new(),
            sb_overflow: false,
            ibuf: Vec::new(),
            nvt_pending: Vec::new(),
            output: Vec::new(),
            line_editor: LineEditor::new(),
            tn3270e,
            mode: ConnectionState::TelnetPending,
        }
    }

    /// Return to the state of a fresh connection
    pub fn reset(&mut self) {
        self.state = TelnetState::Data;
        self.options.reset();
        self.sbbuf.clear();
        self.sb_overflow = false;
        self.ibuf.clear();
        self.nvt_pending.clear();
        self.output.clear();
        self.line_editor.clear();
        self.tn3270e.reset();
        self.mode = ConnectionState::TelnetPending;
    }

    pub fn state(&self) -> TelnetState {
        self.state
    }

    /// Mode derived from the negotiated options; `TelnetPending` until the
    /// first decision is made
    pub fn mode(&self) -> ConnectionState {
        self.mode
    }

    pub fn options(&self) -> &OptionTable {
        &self.options
    }

    pub fn tn3270e(&self) -> &Tn3270eSession {
        &self.tn3270e
    }

    pub fn settings(&self) -> &TelnetSettings {
        &self.settings
    }

    /// NVT with local line editing (the host is not echoing)
    pub fn line_mode(&self) -> bool {
        self.mode.in_nvt() && !self.options.his(OPT_ECHO)
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// Bytes queued for the host since the last call
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Feed bytes received from the host.
    ///
    /// Stops early only when the host starts TLS; the caller must then pass
    /// `data[consumed..]` to the TLS handshake. A TN3270E protocol violation is
    /// returned as an error and ends the connection.
    pub fn process(
        &mut self,
        data: &[u8],
        sink: &mut dyn HostDataSink,
    ) -> Result<Processed, NetError> {
        for (i, &byte) in data.iter().enumerate() {
            match self.state {
                TelnetState::Data => {
                    if byte == IAC {
                        self.state = TelnetState::Iac;
                    } else {
                        self.data_byte(byte);
                    }
                }
                TelnetState::Iac => {
                    self.flush_nvt(sink);
                    self.command_byte(byte, sink);
                }
                TelnetState::Will => {
                    self.state = TelnetState::Data;
                    self.handle_will(byte);
                }
                TelnetState::Wont => {
                    self.state = TelnetState::Data;
                    self.handle_wont(byte);
                }
                TelnetState::Do => {
                    self.state = TelnetState::Data;
                    self.handle_do(byte);
                }
                TelnetState::Dont => {
                    self.state = TelnetState::Data;
                    self.handle_dont(byte);
                }
                TelnetState::Sb => {
                    if byte == IAC {
                        self.state = TelnetState::SbIac;
                    } else {
                        self.sb_push(byte);
                    }
                }
                TelnetState::SbIac => {
                    if byte == TelnetCommand::SE as u8 {
                        self.state = TelnetState::Data;
                        if self.dispatch_subnegotiation()? {
                            self.flush_nvt(sink);
                            return Ok(Processed {
                                consumed: i + 1,
                                start_tls: true,
                            });
                        }
                    } else if byte == IAC {
                        self.state = TelnetState::Sb;
                        self.sb_push(IAC);
                    } else {
                        log::debug!(
                            "Malformed subnegotiation ({} bytes) ended by IAC {}, discarded",
                            self.sbbuf.len(),
                            command_name(byte)
                        );
                        self.sbbuf.clear();
                        self.state = TelnetState::Data;
                    }
                }
            }
        }
        self.flush_nvt(sink);
        Ok(Processed {
            consumed: data.len(),
            start_tls: false,
        })
    }

    fn collecting_records(&self) -> bool {
        self.mode.in_3270() || self.options.mine(OPT_TN3270E)
    }

    fn data_byte(&mut self, byte: u8) {
        if self.collecting_records() {
            self.ibuf.push(byte);
            return;
        }
        if self.mode == ConnectionState::TelnetPending {
            self.check_in3270(true);
        }
        self.nvt_pending.push(byte);
    }

    fn flush_nvt(&mut self, sink: &mut dyn HostDataSink) {
        if !self.nvt_pending.is_empty() {
            let text = std::mem::take(&mut self.nvt_pending);
            sink.process_nvt(&text);
        }
    }

    fn sb_push(&mut self, byte: u8) {
        if self.sbbuf.len() < SB_BUFFER_MAX {
            self.sbbuf.push(byte);
        } else {
            self.sb_overflow = true;
        }
    }

    fn command_byte(&mut self, byte: u8, sink: &mut dyn HostDataSink) {
        self.state = TelnetState::Data;
        match TelnetCommand::from_u8(byte) {
            Some(TelnetCommand::WILL) => self.state = TelnetState::Will,
            Some(TelnetCommand::WONT) => self.state = TelnetState::Wont,
            Some(TelnetCommand::DO) => self.state = TelnetState::Do,
            Some(TelnetCommand::DONT) => self.state = TelnetState::Dont,
            Some(TelnetCommand::SB) => {
                self.sbbuf.clear();
                self.sb_overflow = false;
                self.state = TelnetState::Sb;
            }
            Some(TelnetCommand::IAC) => self.data_byte(IAC),
            Some(TelnetCommand::EOR) => {
                log::debug!("RCVD EOR");
                self.end_of_record(sink);
            }
            Some(cmd) => log::debug!("RCVD {}", cmd.name()),
            None => log::debug!("RCVD {}", command_name(byte)),
        }
    }

    fn end_of_record(&mut self, sink: &mut dyn HostDataSink) {
        let record = std::mem::take(&mut self.ibuf);
        if !self.collecting_records() {
            log::debug!("EOR outside 3270 mode, ignored");
            return;
        }

        if self.options.mine(OPT_TN3270E) {
            match self.tn3270e.process_record(&record, sink) {
                Ok(reply) => self.output.extend(reply),
                Err(e) => log::debug!("Discarding TN3270E record: {e}"),
            }
            self.check_in3270(false);
        } else {
            match sink.process_3270(&record) {
                DecodeOutcome::OkWithOutput(out) => self.queue_plain_record(&out),
                DecodeOutcome::OkNoOutput => {}
                other => log::debug!("3270 record not processed: {other:?}"),
            }
        }
    }

    fn queue_plain_record(&mut self, payload: &[u8]) {
        escape_iac_into(&mut self.output, payload);
        self.output.extend_from_slice(&build_command(TelnetCommand::EOR));
    }

    fn send_negotiation(&mut self, command: TelnetCommand, option: u8) {
        log::debug!("SENT {} {}", command.name(), option_name(option));
        self.output
            .extend_from_slice(&build_negotiation(command, option));
    }

    fn send_subnegotiation(&mut self, option: u8, body: &[u8]) {
        log::debug!("SENT SB {} ({} bytes) SE", option_name(option), body.len());
        self.output.extend(build_subnegotiation(option, body));
    }

    fn send_naws(&mut self) {
        let opts = &self.settings.tn3270e;
        let mut body = Vec::with_capacity(4);
        body.extend_from_slice(&opts.max_cols.to_be_bytes());
        body.extend_from_slice(&opts.max_rows.to_be_bytes());
        self.send_subnegotiation(OPT_NAWS, &body);
    }

    fn handle_will(&mut self, option: u8) {
        log::debug!("RCVD WILL {}", option_name(option));
        let accept = match option {
            OPT_BINARY | OPT_EOR | OPT_SGA | OPT_ECHO | OPT_TTYPE => true,
            OPT_TN3270E => self.settings.allow_tn3270e,
            _ => false,
        };
        if !accept {
            self.send_negotiation(TelnetCommand::DONT, option);
            return;
        }
        if self.options.set_his(option, true) {
            self.send_negotiation(TelnetCommand::DO, option);
            if affects_mode(option) {
                self.check_in3270(nvt_trigger(option));
            }
        }
    }

    fn handle_wont(&mut self, option: u8) {
        log::debug!("RCVD WONT {}", option_name(option));
        if self.options.set_his(option, false) {
            self.send_negotiation(TelnetCommand::DONT, option);
            if affects_mode(option) {
                self.check_in3270(nvt_trigger(option));
            }
        }
    }

    fn handle_do(&mut self, option: u8) {
        log::debug!("RCVD DO {}", option_name(option));
        let accept = match option {
            OPT_TM => {
                // Answer without recording the option
                self.send_negotiation(TelnetCommand::WILL, option);
                return;
            }
            OPT_BINARY | OPT_EOR | OPT_TTYPE | OPT_SGA | OPT_NAWS | OPT_NEW_ENVIRON => true,
            OPT_TN3270E => self.settings.allow_tn3270e,
            OPT_STARTTLS => self.settings.allow_starttls,
            _ => false,
        };
        if !accept {
            self.send_negotiation(TelnetCommand::WONT, option);
            return;
        }
        if !self.options.set_mine(option, true) {
            return;
        }

        self.send_negotiation(TelnetCommand::WILL, option);
        match option {
            OPT_NAWS => self.send_naws(),
            OPT_STARTTLS => self.send_subnegotiation(OPT_STARTTLS, &[STARTTLS_FOLLOWS]),
            OPT_TN3270E => self.tn3270e.reset(),
            _ => {}
        }
        if affects_mode(option) {
            self.check_in3270(nvt_trigger(option));
        }
    }

    fn handle_dont(&mut self, option: u8) {
        log::debug!("RCVD DONT {}", option_name(option));
        if self.options.set_mine(option, false) {
            self.send_negotiation(TelnetCommand::WONT, option);
            if option == OPT_TN3270E {
                self.tn3270e.reset();
            }
            if affects_mode(option) {
                self.check_in3270(nvt_trigger(option));
            }
        }
    }

    /// Terminal type for TTYPE IS, with `@LU` while an LU is being tried
    pub fn terminal_type_answer(&self) -> String {
        let term = &self.settings.tn3270e.terminal_type;
        match self.tn3270e.current_lu() {
            Some(lu) => format!("{term}@{lu}"),
            None => term.clone(),
        }
    }

    /// Returns true if TLS must start now
    fn dispatch_subnegotiation(&mut self) -> Result<bool, NetError> {
        let sb = std::mem::take(&mut self.sbbuf);
        if self.sb_overflow {
            self.sb_overflow = false;
            log::debug!("Subnegotiation longer than {SB_BUFFER_MAX} bytes, discarded");
            return Ok(false);
        }
        let Some((&option, body)) = sb.split_first() else {
            log::debug!("Empty subnegotiation, ignored");
            return Ok(false);
        };

        match option {
            OPT_TTYPE if self.options.mine(OPT_TTYPE) => {
                if body.first() == Some(&TTYPE_SEND) {
                    let answer = self.terminal_type_answer();
                    log::debug!("RCVD SB TTYPE SEND, answering {answer}");
                    let mut reply = vec![TTYPE_IS];
                    reply.extend_from_slice(answer.as_bytes());
                    self.send_subnegotiation(OPT_TTYPE, &reply);
                }
            }
            OPT_TN3270E if self.options.mine(OPT_TN3270E) => {
                match self.tn3270e.handle_subnegotiation(body) {
                    Negotiation::Ignored => {}
                    Negotiation::Reply(reply) => self.send_subnegotiation(OPT_TN3270E, &reply),
                    Negotiation::Complete(reply) => {
                        if let Some(reply) = reply {
                            self.send_subnegotiation(OPT_TN3270E, &reply);
                        }
                        self.check_in3270(false);
                    }
                    Negotiation::Abandon => {
                        self.send_negotiation(TelnetCommand::WONT, OPT_TN3270E);
                        self.options.set_mine(OPT_TN3270E, false);
                        self.tn3270e.reset();
                        self.ibuf.clear();
                        self.check_in3270(false);
                    }
                    Negotiation::Fatal(e) => return Err(e.into()),
                }
            }
            OPT_STARTTLS if self.options.mine(OPT_STARTTLS) => {
                if body.first() == Some(&STARTTLS_FOLLOWS) {
                    log::info!("RCVD SB START-TLS FOLLOWS, starting TLS");
                    return Ok(true);
                }
                log::debug!("RCVD SB START-TLS {body:02x?}, ignored");
            }
            OPT_NEW_ENVIRON if self.options.mine(OPT_NEW_ENVIRON) => {
                match self.settings.environment.reply(body) {
                    Some(reply) => self.send_subnegotiation(OPT_NEW_ENVIRON, &reply),
                    None => log::debug!("RCVD SB NEW-ENVIRON {body:02x?}, ignored"),
                }
            }
            _ => {
                let err = TelnetError::MalformedSubnegotiation {
                    option,
                    data: body.to_vec(),
                };
                log::debug!("{err}, ignored");
            }
        }
        Ok(false)
    }

    /// Recompute the connection mode from the option table and TN3270E state.
    ///
    /// A connection that has not yet left `TelnetPending` only drops into NVT
    /// when `nvt_ok` is set (data arrived, or an NVT-only option changed).
    fn check_in3270(&mut self, nvt_ok: bool) {
        let opts = &self.options;
        let new_mode = if opts.mine(OPT_TN3270E) {
            if !self.tn3270e.negotiated() {
                ConnectionState::ConnectedUnbound
            } else {
                match self.tn3270e.submode() {
                    Submode::Unbound => ConnectionState::ConnectedUnbound,
                    Submode::Nvt => ConnectionState::ConnectedEnvt,
                    Submode::Mode3270 => ConnectionState::ConnectedTn3270e,
                    Submode::Sscp => ConnectionState::ConnectedSscp,
                }
            }
        } else if opts.mine(OPT_BINARY)
            && opts.mine(OPT_EOR)
            && opts.mine(OPT_TTYPE)
            && opts.his(OPT_BINARY)
            && opts.his(OPT_EOR)
        {
            ConnectionState::Connected3270
        } else if self.mode == ConnectionState::TelnetPending && !nvt_ok {
            return;
        } else if opts.his(OPT_ECHO) {
            ConnectionState::ConnectedNvtChar
        } else {
            ConnectionState::ConnectedNvt
        };

        if new_mode == self.mode {
            return;
        }
        log::info!("Now operating in {new_mode} mode");
        if self.mode.in_nvt() && !new_mode.in_nvt() {
            self.line_editor.clear();
        }
        self.mode = new_mode;
        if !self.collecting_records() {
            self.ibuf.clear();
        }
    }

    fn wrong_mode(&self, operation: &str) -> TelnetError {
        TelnetError::WrongMode {
            operation: operation.to_string(),
            state: self.mode.name().to_string(),
        }
    }

    /// Queue one outbound 3270 record.
    pub fn send_3270_record(&mut self, payload: &[u8]) -> TelnetResult<()> {
        if !self.mode.in_3270() {
            return Err(self.wrong_mode("send a 3270 record"));
        }
        if self.options.mine(OPT_TN3270E) {
            let record = self.tn3270e.frame_3270(payload);
            self.output.extend(record);
        } else {
            log::debug!("SENT 3270 record, {} bytes", payload.len());
            self.queue_plain_record(payload);
        }
        Ok(())
    }

    /// Queue NVT text typed by the user. In line mode the text is edited
    /// locally and echoed through `sink`; in character mode it goes out at once.
    pub fn send_nvt(&mut self, text: &[u8], sink: &mut dyn HostDataSink) -> TelnetResult<()> {
        if !self.mode.in_nvt() && self.mode != ConnectionState::TelnetPending {
            return Err(self.wrong_mode("send NVT text"));
        }

        let mut out = NvtOutput::default();
        if self.line_mode() {
            self.line_editor.feed(text, &mut out);
        } else {
            char_mode_output(text, self.options.mine(OPT_BINARY), &mut out);
        }
        if !out.echo.is_empty() {
            sink.process_nvt(&out.echo);
        }

        if self.options.mine(OPT_TN3270E) && self.tn3270e.negotiated() {
            for chunk in out.wire {
                match chunk {
                    WireChunk::Data(data) => {
                        let record = self.tn3270e.frame_nvt(&data);
                        self.output.extend(record);
                    }
                    WireChunk::Command(cmd) => self.send_command(cmd),
                }
            }
        } else {
            self.output.extend(out.to_wire_bytes());
        }
        Ok(())
    }

    /// Queue a bare `IAC <cmd>`
    pub fn send_command(&mut self, command: TelnetCommand) {
        log::debug!("SENT {}", command.name());
        self.output.extend_from_slice(&build_command(command));
    }

    pub fn send_break(&mut self) {
        self.send_command(TelnetCommand::BRK);
    }

    pub fn send_interrupt(&mut self) {
        self.send_command(TelnetCommand::IP);
    }

    pub fn send_nop(&mut self) {
        self.send_command(TelnetCommand::NOP);
    }

    /// SYSREQ key: needs the TN3270E SYSREQ function. From SSCP submode it
    /// returns to the LU session with `IAC ABORT`; from 3270 submode it asks
    /// for the SSCP session with `IAC IP`.
    pub fn send_sysreq(&mut self) -> TelnetResult<()> {
        if !self.options.mine(OPT_TN3270E) || !self.tn3270e.has_function(FUNC_SYSREQ) {
            return Err(self.wrong_mode("send SYSREQ"));
        }
        match self.tn3270e.submode() {
            Submode::Sscp => self.send_command(TelnetCommand::ABORT),
            _ => self.send_command(TelnetCommand::IP),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;

    fn session() -> TelnetSession {
        TelnetSession::new(TelnetSettings::default())
    }

    #[test]
    fn test_unknown_option_refused() {
        let mut s = session();
        s.process(&[IAC, TelnetCommand::DO as u8, 99], &mut NullSink).unwrap();
        assert_eq!(s.take_output(), vec![IAC, TelnetCommand::WONT as u8, 99]);
        s.process(&[IAC, TelnetCommand::WILL as u8, 99], &mut NullSink).unwrap();
        assert_eq!(s.take_output(), vec![IAC, TelnetCommand::DONT as u8, 99]);
    }

    #[test]
    fn test_reannounce_is_silent() {
        let mut s = session();
        let will_binary = [IAC, TelnetCommand::WILL as u8, OPT_BINARY];
        s.process(&will_binary, &mut NullSink).unwrap();
        assert_eq!(s.take_output(), vec![IAC, TelnetCommand::DO as u8, OPT_BINARY]);
        s.process(&will_binary, &mut NullSink).unwrap();
        assert!(s.take_output().is_empty());
    }

    #[test]
    fn test_split_command_across_calls() {
        let mut s = session();
        s.process(&[IAC], &mut NullSink).unwrap();
        assert_eq!(s.state(), TelnetState::Iac);
        s.process(&[TelnetCommand::DO as u8], &mut NullSink).unwrap();
        assert_eq!(s.state(), TelnetState::Do);
        s.process(&[OPT_EOR], &mut NullSink).unwrap();
        assert_eq!(s.state(), TelnetState::Data);
        assert!(s.options().mine(OPT_EOR));
    }

    #[test]
    fn test_timing_mark_not_recorded() {
        let mut s = session();
        s.process(&[IAC, TelnetCommand::DO as u8, OPT_TM], &mut NullSink).unwrap();
        assert_eq!(s.take_output(), vec![IAC, TelnetCommand::WILL as u8, OPT_TM]);
        assert!(!s.options().mine(OPT_TM));
    }

    #[test]
    fn test_naws_sends_size() {
        let mut s = session();
        s.process(&[IAC, TelnetCommand::DO as u8, OPT_NAWS], &mut NullSink).unwrap();
        let mut expected = vec![IAC, TelnetCommand::WILL as u8, OPT_NAWS];
        expected.extend(build_subnegotiation(OPT_NAWS, &[0, 80, 0, 24]));
        assert_eq!(s.take_output(), expected);
        assert_eq!(s.mode(), ConnectionState::ConnectedNvt);
    }

    #[test]
    fn test_partial_3270_options_stay_pending() {
        let mut s = session();
        s.process(&[IAC, TelnetCommand::DO as u8, OPT_BINARY], &mut NullSink).unwrap();
        assert_eq!(s.mode(), ConnectionState::TelnetPending);
    }

    #[test]
    fn test_ttype_answer() {
        let mut s = session();
        let mut input = vec![IAC, TelnetCommand::DO as u8, OPT_TTYPE];
        input.extend_from_slice(&[IAC, TelnetCommand::SB as u8, OPT_TTYPE, TTYPE_SEND]);
        input.extend_from_slice(&[IAC, TelnetCommand::SE as u8]);
        s.process(&input, &mut NullSink).unwrap();
        let mut expected = vec![IAC, TelnetCommand::WILL as u8, OPT_TTYPE];
        let mut body = vec![TTYPE_IS];
        body.extend_from_slice(b"IBM-3278-2-E");
        expected.extend(build_subnegotiation(OPT_TTYPE, &body));
        assert_eq!(s.take_output(), expected);
    }

    #[test]
    fn test_malformed_subnegotiation_is_dropped() {
        let mut s = session();
        let input = [
            IAC,
            TelnetCommand::SB as u8,
            OPT_TTYPE,
            TTYPE_SEND,
            IAC,
            TelnetCommand::NOP as u8,
        ];
        s.process(&input, &mut NullSink).unwrap();
        assert_eq!(s.state(), TelnetState::Data);
        assert!(s.take_output().is_empty());
    }

    #[test]
    fn test_wrong_mode_for_3270_record() {
        let mut s = session();
        assert!(matches!(
            s.send_3270_record(&[0xf5]),
            Err(TelnetError::WrongMode { .. })
        ));
    }
}
