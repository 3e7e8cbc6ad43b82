//! In-memory sockets, connector and TLS session for driving a `Connection`
//! without a network.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use tn3270r::error::{TlsError, TlsResult};
use tn3270r::proxy::HostResolver;
use tn3270r::socket::{Connector, NetSocket, ReadWrite};
use tn3270r::tls::{TlsOutcome, TlsSession};
use tn3270r::tn3270e::BindImage;
use tn3270r::{ConnectionEvent, ConnectionListener, DecodeOutcome, HostDataSink};

/// How a scripted connect attempt behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPlan {
    /// `open` itself fails
    OpenError,
    /// The connect completes with ECONNREFUSED
    Refuse,
    /// Never completes
    Hang,
    /// Completes on the first poll
    Succeed,
}

#[derive(Debug)]
struct SocketState {
    plan: ConnectPlan,
    input: VecDeque<u8>,
    output: Vec<u8>,
    input_closed: bool,
    shut_down: bool,
    /// Bytes `write` accepts before returning `WouldBlock`; `None` is unlimited
    write_budget: Option<usize>,
}

/// Shared handle to one scripted socket. Clones see the same state.
#[derive(Debug, Clone)]
pub struct MockSocket(Rc<RefCell<SocketState>>);

impl MockSocket {
    fn new(plan: ConnectPlan) -> Self {
        Self(Rc::new(RefCell::new(SocketState {
            plan,
            input: VecDeque::new(),
            output: Vec::new(),
            input_closed: false,
            shut_down: false,
            write_budget: None,
        })))
    }

    /// A socket that is already connected, for driving protocol code directly
    pub fn connected() -> Self {
        Self::new(ConnectPlan::Succeed)
    }

    /// Queue bytes from the host
    pub fn feed(&self, data: &[u8]) {
        self.0.borrow_mut().input.extend(data.iter().copied());
    }

    pub fn close_input(&self) {
        self.0.borrow_mut().input_closed = true;
    }

    pub fn sent(&self) -> Vec<u8> {
        self.0.borrow().output.clone()
    }

    /// Queued input nobody has read yet
    pub fn unread(&self) -> Vec<u8> {
        self.0.borrow().input.iter().copied().collect()
    }

    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().output)
    }

    pub fn is_shut_down(&self) -> bool {
        self.0.borrow().shut_down
    }

    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.0.borrow_mut().write_budget = budget;
    }

    pub fn set_plan(&self, plan: ConnectPlan) {
        self.0.borrow_mut().plan = plan;
    }
}

impl Read for MockSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        if state.input.is_empty() {
            return if state.input_closed {
                Ok(0)
            } else {
                Err(ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        if state.shut_down {
            return Err(ErrorKind::BrokenPipe.into());
        }
        let n = match state.write_budget {
            Some(0) => return Err(ErrorKind::WouldBlock.into()),
            Some(budget) => {
                let n = budget.min(buf.len());
                state.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };
        state.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl NetSocket for MockSocket {
    fn poll_connected(&mut self) -> io::Result<bool> {
        match self.0.borrow().plan {
            ConnectPlan::Succeed => Ok(true),
            ConnectPlan::Hang => Ok(false),
            ConnectPlan::Refuse => Err(ErrorKind::ConnectionRefused.into()),
            ConnectPlan::OpenError => Err(ErrorKind::AddrNotAvailable.into()),
        }
    }

    fn shutdown(&mut self) {
        self.0.borrow_mut().shut_down = true;
    }
}

/// Resolver answering from a fixed table; unknown names fail
#[derive(Debug, Clone, Default)]
pub struct FixedResolver(HashMap<String, Vec<IpAddr>>);

impl FixedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ips: &[IpAddr]) -> Self {
        self.0.insert(host.to_string(), ips.to_vec());
        self
    }
}

impl HostResolver for FixedResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        match self.0.get(host) {
            Some(ips) => Ok(ips.iter().map(|&ip| SocketAddr::new(ip, port)).collect()),
            None => Err(io::Error::new(ErrorKind::NotFound, format!("unknown host {host}"))),
        }
    }
}

/// Behaviour of the scripted TLS sessions a [`MockConnector`] hands out.
///
/// The "handshake" is the host sending [`TLS_HELLO`]; the client answers
/// [`TLS_DONE`]. After that data passes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct MockTlsConfig {
    /// Password the private key needs, if any
    pub password: Option<String>,
    /// Fail the handshake outright
    pub fail: bool,
}

pub const TLS_HELLO: &[u8] = b"HELO";
pub const TLS_DONE: &[u8] = b"DONE";

pub struct MockTls {
    config: MockTlsConfig,
    received: Vec<u8>,
    supplied: Option<String>,
    established: bool,
}

impl MockTls {
    pub fn new(config: MockTlsConfig) -> Self {
        Self {
            config,
            received: Vec::new(),
            supplied: None,
            established: false,
        }
    }
}

impl TlsSession for MockTls {
    fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> TlsOutcome {
        if self.config.fail {
            return TlsOutcome::Failed(TlsError::Handshake {
                message: "certificate verify failed".to_string(),
            });
        }
        if let Some(password) = &self.config.password {
            if self.supplied.as_ref() != Some(password) {
                return TlsOutcome::NeedPassword;
            }
        }
        while self.received.len() < TLS_HELLO.len() {
            let mut buf = vec![0u8; TLS_HELLO.len() - self.received.len()];
            match socket.read(&mut buf) {
                Ok(0) => {
                    return TlsOutcome::Failed(TlsError::Handshake {
                        message: "closed".to_string(),
                    })
                }
                Ok(n) => self.received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return TlsOutcome::WantMore,
                Err(e) => {
                    return TlsOutcome::Failed(TlsError::Handshake {
                        message: e.to_string(),
                    })
                }
            }
        }
        if self.received != TLS_HELLO {
            return TlsOutcome::Failed(TlsError::Handshake {
                message: "bad hello".to_string(),
            });
        }
        if !self.established {
            if let Err(e) = socket.write_all(TLS_DONE) {
                return TlsOutcome::Failed(TlsError::Handshake {
                    message: e.to_string(),
                });
            }
            self.established = true;
        }
        TlsOutcome::Ok
    }

    fn read(&mut self, socket: &mut dyn ReadWrite, buf: &mut [u8]) -> io::Result<usize> {
        socket.read(buf)
    }

    fn write(&mut self, socket: &mut dyn ReadWrite, data: &[u8]) -> io::Result<usize> {
        socket.write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self, socket: &mut dyn ReadWrite) -> io::Result<()> {
        socket.flush()
    }

    fn has_buffered_plaintext(&self) -> bool {
        false
    }

    fn close(&mut self, _socket: &mut dyn ReadWrite) {}

    fn supply_password(&mut self, password: &str) -> bool {
        self.supplied = Some(password.to_string());
        true
    }

    fn description(&self) -> String {
        "mock TLS".to_string()
    }
}

/// Connector whose sockets follow a per-address [`ConnectPlan`]
#[derive(Default)]
pub struct MockConnector {
    plans: HashMap<SocketAddr, ConnectPlan>,
    pub opened: Vec<SocketAddr>,
    pub sockets: Vec<MockSocket>,
    pub tls: Option<MockTlsConfig>,
    pub tls_hosts: Vec<String>,
    pub passwords: VecDeque<String>,
    pub prompts: usize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, addr: SocketAddr, plan: ConnectPlan) -> Self {
        self.plans.insert(addr, plan);
        self
    }

    pub fn with_tls(mut self, config: MockTlsConfig) -> Self {
        self.tls = Some(config);
        self
    }

    /// The most recently opened socket
    pub fn last_socket(&self) -> MockSocket {
        self.sockets.last().cloned().expect("no socket opened")
    }
}

impl Connector for MockConnector {
    type Socket = MockSocket;

    fn open(&mut self, addr: SocketAddr) -> io::Result<MockSocket> {
        self.opened.push(addr);
        let plan = self.plans.get(&addr).copied().unwrap_or(ConnectPlan::Succeed);
        if plan == ConnectPlan::OpenError {
            return Err(ErrorKind::AddrNotAvailable.into());
        }
        let socket = MockSocket::new(plan);
        self.sockets.push(socket.clone());
        Ok(socket)
    }

    fn tls_session(&mut self, host: &str) -> TlsResult<Box<dyn TlsSession>> {
        self.tls_hosts.push(host.to_string());
        match &self.tls {
            Some(config) => Ok(Box::new(MockTls::new(config.clone()))),
            None => Err(TlsError::Setup {
                message: "TLS not available".to_string(),
            }),
        }
    }

    fn prompt_password(&mut self) -> Option<String> {
        self.prompts += 1;
        self.passwords.pop_front()
    }
}

/// Sink that records everything it is given
#[derive(Debug)]
pub struct RecordingSink {
    pub records: Vec<Vec<u8>>,
    pub sscp: Vec<Vec<u8>>,
    pub nvt: Vec<u8>,
    pub binds: Vec<BindImage>,
    pub unbinds: usize,
    /// Returned for every 3270 record
    pub outcome: DecodeOutcome,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            sscp: Vec::new(),
            nvt: Vec::new(),
            binds: Vec::new(),
            unbinds: 0,
            outcome: DecodeOutcome::OkNoOutput,
        }
    }
}

impl HostDataSink for RecordingSink {
    fn process_3270(&mut self, data: &[u8]) -> DecodeOutcome {
        self.records.push(data.to_vec());
        self.outcome.clone()
    }

    fn process_nvt(&mut self, data: &[u8]) {
        self.nvt.extend_from_slice(data);
    }

    fn process_sscp(&mut self, data: &[u8]) -> DecodeOutcome {
        self.sscp.push(data.to_vec());
        DecodeOutcome::OkNoOutput
    }

    fn bind(&mut self, image: &BindImage) {
        self.binds.push(image.clone());
    }

    fn unbind(&mut self) {
        self.unbinds += 1;
    }
}

/// Listener that keeps every event in a shared list
#[derive(Debug, Clone, Default)]
pub struct RecordingListener(pub Rc<RefCell<Vec<ConnectionEvent>>>);

impl RecordingListener {
    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.0.borrow().clone()
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connection_event(&mut self, event: &ConnectionEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}
