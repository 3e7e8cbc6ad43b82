//! TN3270E negotiation and record processing (RFC 2355)
//!
//! Two negotiation rounds ride inside `SB TN3270E` sub-negotiations: the
//! device-type round (terminal type plus optional LU) and the functions round.
//! Once both are complete every record carries a five-byte header, and the
//! session decides per record which consumer gets the payload and whether an
//! acknowledgement goes back.

use std::fmt;
use std::str::FromStr;

use super::bind::BindImage;
use super::codes::*;
use super::header::{frame_record, Tn3270eHeader};
use crate::error::{ConfigError, Tn3270eError, Tn3270eResult};
use crate::sink::{DecodeOutcome, HostDataSink};

/// A set of TN3270E function codes. Codes 0 through 6 are meaningful, but the
/// set covers the whole byte range so that anything the host sends can be held
/// and compared.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FunctionSet([u64; 4]);

impl FunctionSet {
    pub const fn new() -> Self {
        Self([0; 4])
    }

    pub fn from_codes(codes: &[u8]) -> Self {
        let mut set = Self::new();
        for &code in codes {
            set.insert(code);
        }
        set
    }

    pub fn insert(&mut self, function: u8) {
        self.0[usize::from(function >> 6)] |= 1u64 << (function & 63);
    }

    pub fn remove(&mut self, function: u8) {
        self.0[usize::from(function >> 6)] &= !(1u64 << (function & 63));
    }

    pub fn contains(&self, function: u8) -> bool {
        self.0[usize::from(function >> 6)] & (1u64 << (function & 63)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    pub fn is_subset(&self, other: &FunctionSet) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & !b == 0)
    }

    pub fn intersection(&self, other: &FunctionSet) -> FunctionSet {
        let mut out = [0u64; 4];
        for (i, word) in out.iter_mut().enumerate() {
            *word = self.0[i] & other.0[i];
        }
        FunctionSet(out)
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |f| self.contains(*f))
    }

    pub fn to_codes(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl fmt::Display for FunctionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .iter()
            .map(|code| match function_name(code) {
                "??" => format!("<{code}>"),
                name => name.to_string(),
            })
            .collect();
        f.write_str(&names.join(" "))
    }
}

impl fmt::Debug for FunctionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionSet[{self}]")
    }
}

/// Interpretation of the data stream once TN3270E is negotiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Submode {
    #[default]
    Unbound,
    Nvt,
    Mode3270,
    Sscp,
}

/// What to do with an incoming BID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BidPolicy {
    #[default]
    Grant,
    Reject,
}

impl FromStr for BidPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grant" | "" => Ok(BidPolicy::Grant),
            "reject" => Ok(BidPolicy::Reject),
            other => Err(ConfigError::InvalidParameter {
                parameter: "connection.bidPolicy".to_string(),
                value: other.to_string(),
                reason: "expected 'grant' or 'reject'".to_string(),
            }),
        }
    }
}

/// LU candidates with a cursor at the one currently being tried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LuList {
    names: Vec<String>,
    cursor: usize,
}

impl LuList {
    pub fn new(names: Vec<String>) -> Self {
        let names = names.into_iter().filter(|n| !n.is_empty()).collect();
        Self { names, cursor: 0 }
    }

    pub fn current(&self) -> Option<&str> {
        self.names.get(self.cursor).map(String::as_str)
    }

    /// Move to the next candidate. Returns false once the list is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.names.len() {
            self.cursor += 1;
        }
        self.cursor < self.names.len()
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Static inputs to TN3270E negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tn3270eOptions {
    /// Terminal type as announced over TTYPE, e.g. `IBM-3279-2-E`
    pub terminal_type: String,
    pub lu_names: Vec<String>,
    pub contention_resolution: bool,
    pub bid_policy: BidPolicy,
    pub max_rows: u16,
    pub max_cols: u16,
}

impl Default for Tn3270eOptions {
    fn default() -> Self {
        Self {
            terminal_type: "IBM-3278-2-E".to_string(),
            lu_names: Vec::new(),
            contention_resolution: false,
            bid_policy: BidPolicy::Grant,
            max_rows: 24,
            max_cols: 80,
        }
    }
}

/// Device type for a TN3270E request: RFC 2355 only defines 3278 names, so a
/// color 3279 is requested as the equivalent 3278.
pub fn tn3270e_device_type(terminal_type: &str) -> String {
    terminal_type.replacen("3279", "3278", 1)
}

/// Result of one `SB TN3270E` exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Nothing to send
    Ignored,
    /// Send this sub-negotiation body (everything after the option byte)
    Reply(Vec<u8>),
    /// Negotiation finished, optionally sending one last body
    Complete(Option<Vec<u8>>),
    /// Give up on TN3270E and fall back to plain TELNET
    Abandon,
    /// Protocol violation that ends the connection
    Fatal(Tn3270eError),
}

/// Per-connection TN3270E state
#[derive(Debug, Clone)]
pub struct Tn3270eSession {
    options: Tn3270eOptions,
    lus: LuList,
    requested: FunctionSet,
    functions: FunctionSet,
    negotiated: bool,
    bound: bool,
    submode: Submode,
    xmit_seq: u16,
    response_required: u8,
    confirmed_type: Option<String>,
    connected_lu: Option<String>,
    bind: Option<BindImage>,
}

impl Tn3270eSession {
    pub fn new(options: Tn3270eOptions) -> Self {
        let lus = LuList::new(options.lu_names.clone());
        let mut session = Self {
            options,
            lus,
            requested: FunctionSet::new(),
            functions: FunctionSet::new(),
            negotiated: false,
            bound: false,
            submode: Submode::Unbound,
            xmit_seq: 0,
            response_required: RSF_NO_RESPONSE,
            confirmed_type: None,
            connected_lu: None,
            bind: None,
        };
        session.requested = session.wanted_functions();
        session
    }

    /// Functions we ask for at the start of the functions round
    pub fn wanted_functions(&self) -> FunctionSet {
        let mut wanted = FunctionSet::from_codes(&[FUNC_BIND_IMAGE, FUNC_RESPONSES, FUNC_SYSREQ]);
        if self.options.contention_resolution {
            wanted.insert(FUNC_CONTENTION_RESOLUTION);
        }
        wanted
    }

    /// Forget everything negotiated. Called when TN3270E is turned off and on
    /// disconnect; the LU cursor goes back to the first candidate.
    pub fn reset(&mut self) {
        self.lus.rewind();
        self.requested = self.wanted_functions();
        self.functions = FunctionSet::new();
        self.negotiated = false;
        self.bound = false;
        self.submode = Submode::Unbound;
        self.xmit_seq = 0;
        self.response_required = RSF_NO_RESPONSE;
        self.confirmed_type = None;
        self.connected_lu = None;
        self.bind = None;
    }

    pub fn options(&self) -> &Tn3270eOptions {
        &self.options
    }

    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    pub fn bound(&self) -> bool {
        self.bound
    }

    pub fn submode(&self) -> Submode {
        self.submode
    }

    pub fn functions(&self) -> FunctionSet {
        self.functions
    }

    pub fn has_function(&self, function: u8) -> bool {
        self.negotiated && self.functions.contains(function)
    }

    pub fn xmit_seq(&self) -> u16 {
        self.xmit_seq
    }

    /// Response flag of the 3270-DATA record being processed, if it asked
    /// for one and no answer has gone out yet
    pub fn response_required(&self) -> u8 {
        self.response_required
    }

    pub fn lu_list(&self) -> &LuList {
        &self.lus
    }

    /// LU currently being requested, if any
    pub fn current_lu(&self) -> Option<&str> {
        self.lus.current()
    }

    /// Device type confirmed by the host's `DEVICE-TYPE IS`
    pub fn confirmed_type(&self) -> Option<&str> {
        self.confirmed_type.as_deref()
    }

    /// LU the host connected us to
    pub fn connected_lu(&self) -> Option<&str> {
        self.connected_lu.as_deref()
    }

    pub fn bind_image(&self) -> Option<&BindImage> {
        self.bind.as_ref()
    }

    fn device_type_request(&self) -> Vec<u8> {
        let mut body = vec![OP_DEVICE_TYPE, OP_REQUEST];
        body.extend_from_slice(tn3270e_device_type(&self.options.terminal_type).as_bytes());
        if let Some(lu) = self.lus.current() {
            body.push(OP_CONNECT);
            body.extend_from_slice(lu.as_bytes());
        }
        body
    }

    fn functions_body(op: u8, set: &FunctionSet) -> Vec<u8> {
        let mut body = vec![OP_FUNCTIONS, op];
        body.extend(set.iter());
        body
    }

    /// Handle one `SB TN3270E ... SE`. `body` excludes the option byte.
    pub fn handle_subnegotiation(&mut self, body: &[u8]) -> Negotiation {
        match body {
            [OP_SEND, OP_DEVICE_TYPE, ..] => {
                let reply = self.device_type_request();
                log::debug!(
                    "RCVD SB TN3270E SEND DEVICE-TYPE, requesting {}{}",
                    tn3270e_device_type(&self.options.terminal_type),
                    self.lus.current().map(|lu| format!(" CONNECT {lu}")).unwrap_or_default()
                );
                Negotiation::Reply(reply)
            }
            [OP_DEVICE_TYPE, OP_IS, rest @ ..] => {
                let (device, lu) = match rest.iter().position(|&b| b == OP_CONNECT) {
                    Some(at) => (&rest[..at], Some(&rest[at + 1..])),
                    None => (rest, None),
                };
                self.confirmed_type = Some(String::from_utf8_lossy(device).into_owned());
                self.connected_lu = lu
                    .filter(|l| !l.is_empty())
                    .map(|l| String::from_utf8_lossy(l).into_owned());
                log::debug!(
                    "RCVD SB TN3270E DEVICE-TYPE IS {}{}",
                    self.confirmed_type.as_deref().unwrap_or_default(),
                    self.connected_lu.as_deref().map(|l| format!(" CONNECT {l}")).unwrap_or_default()
                );
                self.requested = self.wanted_functions();
                Negotiation::Reply(Self::functions_body(OP_REQUEST, &self.requested))
            }
            [OP_DEVICE_TYPE, OP_REJECT, rest @ ..] => {
                let reason = match rest {
                    [OP_REASON, reason, ..] => *reason,
                    [reason, ..] => *reason,
                    [] => REASON_UNKNOWN_ERROR,
                };
                log::debug!("RCVD SB TN3270E DEVICE-TYPE REJECT REASON {}", reason_name(reason));
                if reason == REASON_UNSUPPORTED_REQ {
                    log::warn!("Host does not support the TN3270E device-type request, falling back");
                    return Negotiation::Abandon;
                }
                if self.lus.advance() {
                    log::info!(
                        "Retrying TN3270E with LU {}",
                        self.lus.current().unwrap_or_default()
                    );
                    Negotiation::Reply(self.device_type_request())
                } else {
                    log::warn!("TN3270E device type rejected ({}), falling back", reason_name(reason));
                    Negotiation::Abandon
                }
            }
            [OP_FUNCTIONS, OP_REQUEST, rest @ ..] => {
                let host = FunctionSet::from_codes(rest);
                log::debug!("RCVD SB TN3270E FUNCTIONS REQUEST {host}");
                if host == self.requested {
                    self.functions = host;
                    self.complete_negotiation();
                    Negotiation::Complete(Some(Self::functions_body(OP_IS, &host)))
                } else {
                    self.requested = self.requested.intersection(&host);
                    Negotiation::Reply(Self::functions_body(OP_REQUEST, &self.requested))
                }
            }
            [OP_FUNCTIONS, OP_IS, rest @ ..] => {
                let host = FunctionSet::from_codes(rest);
                log::debug!("RCVD SB TN3270E FUNCTIONS IS {host}");
                if !host.is_subset(&self.requested) {
                    return Negotiation::Fatal(Tn3270eError::IllegalFunctions {
                        offered: self.requested.to_codes(),
                        received: host.to_codes(),
                    });
                }
                self.functions = host;
                self.complete_negotiation();
                Negotiation::Complete(None)
            }
            _ => {
                log::debug!(
                    "RCVD SB TN3270E {}, ignored",
                    body.iter().map(|&b| op_name(b)).collect::<Vec<_>>().join(" ")
                );
                Negotiation::Ignored
            }
        }
    }

    fn complete_negotiation(&mut self) {
        self.negotiated = true;
        self.xmit_seq = 0;
        if !self.functions.contains(FUNC_BIND_IMAGE) {
            self.submode = Submode::Mode3270;
        }
        log::info!("TN3270E negotiated, functions: {}", self.functions);
    }

    /// Process one complete inbound record (IAC escaping already removed).
    /// Returns the wire bytes to send in reply, which may be empty.
    pub fn process_record(
        &mut self,
        record: &[u8],
        sink: &mut dyn HostDataSink,
    ) -> Tn3270eResult<Vec<u8>> {
        let header = Tn3270eHeader::parse(record)?;
        let payload = &record[HEADER_LEN..];
        log::debug!("RCVD TN3270E({}) {} bytes", header.describe(), payload.len());

        let mut reply = Vec::new();
        match header.data_type {
            DT_3270_DATA => {
                if self.has_function(FUNC_BIND_IMAGE) && !self.bound {
                    log::debug!("3270-DATA before BIND, dropped");
                    return Ok(reply);
                }
                self.submode = Submode::Mode3270;
                let outcome = sink.process_3270(payload);
                self.answer(&header, outcome, &mut reply);
            }
            DT_SSCP_LU_DATA => {
                if !self.has_function(FUNC_BIND_IMAGE) {
                    log::debug!("SSCP-LU-DATA without the BIND-IMAGE function, ignored");
                    return Ok(reply);
                }
                self.submode = Submode::Sscp;
                let outcome = sink.process_sscp(payload);
                self.answer(&header, outcome, &mut reply);
            }
            DT_BIND_IMAGE => {
                if !self.has_function(FUNC_BIND_IMAGE) {
                    log::debug!("BIND-IMAGE without the BIND-IMAGE function, ignored");
                    return Ok(reply);
                }
                match BindImage::decode(payload, self.options.max_rows, self.options.max_cols) {
                    Some(image) => {
                        log::info!(
                            "BIND PLU={} default {}x{} alternate {}x{}",
                            image.plu_name.as_deref().unwrap_or("?"),
                            image.default_rows,
                            image.default_cols,
                            image.alternate_rows,
                            image.alternate_cols
                        );
                        self.bound = true;
                        self.submode = Submode::Mode3270;
                        sink.bind(&image);
                        self.bind = Some(image);
                    }
                    None => log::debug!("BIND-IMAGE is not a BIND RU, ignored"),
                }
            }
            DT_UNBIND => {
                if !self.has_function(FUNC_BIND_IMAGE) {
                    log::debug!("UNBIND without the BIND-IMAGE function, ignored");
                    return Ok(reply);
                }
                self.bound = false;
                self.bind = None;
                self.submode = Submode::Unbound;
                sink.unbind();
            }
            DT_NVT_DATA => {
                self.submode = Submode::Nvt;
                sink.process_nvt(payload);
            }
            DT_BID => {
                if !self.has_function(FUNC_CONTENTION_RESOLUTION) {
                    log::debug!("BID without CONTENTION-RESOLUTION, ignored");
                    return Ok(reply);
                }
                match self.options.bid_policy {
                    BidPolicy::Grant => {
                        reply = response_record(header.seq_number, true, POS_DEVICE_END)
                    }
                    BidPolicy::Reject => {
                        reply = response_record(
                            header.seq_number,
                            false,
                            NEG_INTERVENTION_REQUIRED,
                        )
                    }
                }
            }
            DT_RESPONSE | DT_REQUEST | DT_SCS_DATA | DT_PRINT_EOJ => {
                log::debug!("{} record ignored", data_type_name(header.data_type));
            }
            other => {
                log::debug!("Unknown TN3270E data type 0x{other:02x}, ignored");
            }
        }
        Ok(reply)
    }

    /// Turn a decode result into the host's requested response, if any.
    fn answer(&mut self, header: &Tn3270eHeader, outcome: DecodeOutcome, reply: &mut Vec<u8>) {
        self.response_required = if self.has_function(FUNC_RESPONSES) {
            header.response_flag
        } else {
            RSF_NO_RESPONSE
        };

        match outcome {
            DecodeOutcome::OkNoOutput => {
                if self.response_required == RSF_ALWAYS_RESPONSE {
                    reply.extend(response_record(header.seq_number, true, POS_DEVICE_END));
                }
            }
            DecodeOutcome::OkWithOutput(output) => {
                reply.extend(self.frame_3270(&output));
            }
            DecodeOutcome::BadCommand | DecodeOutcome::BadAddress => {
                if self.response_required != RSF_NO_RESPONSE {
                    let reason = if outcome == DecodeOutcome::BadCommand {
                        NEG_COMMAND_REJECT
                    } else {
                        NEG_OPERATION_CHECK
                    };
                    reply.extend(response_record(header.seq_number, false, reason));
                }
            }
        }
        self.response_required = RSF_NO_RESPONSE;
    }

    /// Sequence number for the next outbound record
    fn next_seq(&mut self) -> u16 {
        if !self.has_function(FUNC_RESPONSES) {
            return 0;
        }
        let seq = self.xmit_seq;
        self.xmit_seq = (self.xmit_seq + 1) % SEQ_MODULUS;
        seq
    }

    /// Frame an outbound payload with an explicit data type
    pub fn frame(&mut self, data_type: u8, payload: &[u8]) -> Vec<u8> {
        let header = Tn3270eHeader::new(data_type, self.next_seq());
        log::debug!("SENT TN3270E({}) {} bytes", header.describe(), payload.len());
        frame_record(&header, payload)
    }

    /// Frame an outbound 3270 record: SSCP-LU-DATA in SSCP submode,
    /// 3270-DATA otherwise.
    pub fn frame_3270(&mut self, payload: &[u8]) -> Vec<u8> {
        let data_type = if self.submode == Submode::Sscp {
            DT_SSCP_LU_DATA
        } else {
            DT_3270_DATA
        };
        self.frame(data_type, payload)
    }

    pub fn frame_nvt(&mut self, text: &[u8]) -> Vec<u8> {
        self.frame(DT_NVT_DATA, text)
    }
}

/// A RESPONSE record answering the request numbered `seq`
pub fn response_record(seq: u16, positive: bool, reason: u8) -> Vec<u8> {
    let header = Tn3270eHeader {
        data_type: DT_RESPONSE,
        request_flag: 0,
        response_flag: if positive {
            RSF_POSITIVE_RESPONSE
        } else {
            RSF_NEGATIVE_RESPONSE
        },
        seq_number: seq,
    };
    log::debug!(
        "SENT TN3270E({}) {} 0x{reason:02x}",
        header.describe(),
        if positive { "ACK" } else { "NAK" }
    );
    frame_record(&header, &[reason])
}
