//! Connection manager
//!
//! A [`Connection`] takes one session from a resolved address list to a
//! negotiated TELNET connection: a non-blocking TCP connect with failover across
//! the addresses, then the proxy handshake, then TLS, then TELNET and TN3270E.
//! Nothing here blocks. The caller waits for socket readiness and calls
//! [`Connection::advance_on_socket_event`], and calls [`Connection::on_timeout`]
//! once [`Connection::deadline`] has passed.

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::Instant;

use uuid::Uuid;

use crate::config::NetSettings;
use crate::error::{ConfigError, NetError, NetResult, NetworkError, TlsError};
use crate::proxy::{HostResolver, ProxyNegotiator, ProxyOutcome, ProxyType, SystemResolver};
use crate::sink::HostDataSink;
use crate::socket::{Connector, NetSocket, Prefixed};
use crate::state::{ConnectionEvent, ConnectionListener, ConnectionState};
use crate::telnet::TelnetSession;
use crate::tls::{TlsOutcome, TlsSession};
use crate::tn3270e::FunctionSet;
use crate::trace::{hex_dump, Direction};

const READ_CHUNK: usize = 4096;

/// Where a connection stands after a call into the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Waiting for the socket
    Pending,
    /// TELNET is running (possibly still negotiating options)
    Connected,
    /// The attempt or the session ended; the state is `NotConnected`
    Failed(NetError),
}

/// Flags reported to listeners when they change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Indicators {
    connected: bool,
    in_3270: bool,
    secure: bool,
    line_mode: bool,
}

/// One host session
pub struct Connection<C: Connector, S: HostDataSink> {
    id: String,
    connector: C,
    sink: S,
    resolver: Box<dyn HostResolver>,
    settings: NetSettings,
    listeners: Vec<Box<dyn ConnectionListener>>,
    state: ConnectionState,
    indicators: Indicators,

    host: String,
    port: u16,
    addresses: Vec<SocketAddr>,
    cursor: usize,
    socket: Option<C::Socket>,
    deadline: Option<Instant>,

    proxy: Option<ProxyNegotiator>,

    tls_requested: bool,
    tls: Option<Box<dyn TlsSession>>,
    secure: bool,
    password_prompted: bool,
    /// Phase to return to once a STARTTLS handshake completes
    resume_state: Option<ConnectionState>,
    /// Handshake bytes that arrived in the same read as `SB STARTTLS FOLLOWS`
    tls_replay: Vec<u8>,

    telnet: TelnetSession,
    /// Bytes for the host not yet accepted by the socket
    outbound: Vec<u8>,
}

impl<C: Connector, S: HostDataSink> Connection<C, S> {
    pub fn new(connector: C, sink: S, settings: NetSettings) -> Self {
        let telnet = TelnetSession::new(settings.telnet.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            connector,
            sink,
            resolver: Box::new(SystemResolver),
            settings,
            listeners: Vec::new(),
            state: ConnectionState::NotConnected,
            indicators: Indicators::default(),
            host: String::new(),
            port: 0,
            addresses: Vec::new(),
            cursor: 0,
            socket: None,
            deadline: None,
            proxy: None,
            tls_requested: false,
            tls: None,
            secure: false,
            password_prompted: false,
            resume_state: None,
            tls_replay: Vec::new(),
            telnet,
            outbound: Vec::new(),
        }
    }

    /// Replace the resolver SOCKS proxies use for the target host
    pub fn with_resolver(mut self, resolver: Box<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn ConnectionListener>) {
        self.listeners.push(listener);
    }

    /// Start connecting to `host:port`.
    ///
    /// `addresses` is the resolved list for the name actually dialed: the
    /// proxy's when a proxy is configured (see [`NetSettings::dial_target`]).
    /// The proxy spec is turned into a negotiator before any socket is opened.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        addresses: Vec<SocketAddr>,
        tls: bool,
    ) -> Progress {
        if self.state != ConnectionState::NotConnected {
            return Progress::Failed(
                NetworkError::AlreadyConnected {
                    state: self.state.name().to_string(),
                }
                .into(),
            );
        }
        if host.is_empty() {
            return Progress::Failed(
                ConfigError::MissingRequired {
                    parameter: "host".to_string(),
                }
                .into(),
            );
        }
        if addresses.is_empty() {
            return Progress::Failed(
                NetworkError::NoAddresses {
                    host: host.to_string(),
                }
                .into(),
            );
        }

        self.proxy = match &self.settings.proxy {
            Some(spec) => match ProxyNegotiator::new(spec, host, port, self.resolver.as_ref()) {
                Ok(negotiator) => Some(negotiator),
                Err(e) => return Progress::Failed(e.into()),
            },
            None => None,
        };

        self.id = Uuid::new_v4().to_string();
        self.host = host.to_string();
        self.port = port;
        self.addresses = addresses;
        self.cursor = 0;
        self.tls_requested = tls;
        self.password_prompted = false;
        self.resume_state = None;
        self.tls_replay.clear();
        self.outbound.clear();

        // STARTTLS makes no sense on a session that is already encrypted
        let mut telnet_settings = self.settings.telnet.clone();
        if tls {
            telnet_settings.allow_starttls = false;
        }
        self.telnet = TelnetSession::new(telnet_settings);

        match &self.settings.proxy {
            Some(spec) => log::info!(
                "[{}] Connecting to {host}:{port} via {} proxy {}:{}",
                self.id,
                spec.kind,
                spec.host,
                spec.port
            ),
            None => log::info!("[{}] Connecting to {host}:{port}", self.id),
        }

        self.set_state(ConnectionState::TcpPending);
        let result = self.open_current_address();
        self.settle(result)
    }

    /// Drive the connection after the socket became readable or writable.
    pub fn advance_on_socket_event(&mut self) -> Progress {
        let result = match self.state {
            ConnectionState::NotConnected | ConnectionState::Resolving => {
                return Progress::Failed(NetworkError::NotConnected.into())
            }
            ConnectionState::TcpPending => self.poll_tcp(),
            ConnectionState::ProxyPending => self.run_proxy(false),
            ConnectionState::TlsPending => self.continue_tls(),
            _ => self.read_host_data(),
        };
        self.settle(result)
    }

    /// When the current attempt must complete by
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check the connect deadline. An attempt that expires before TELNET starts
    /// (TCP connect, proxy handshake or immediate TLS) moves on to the next
    /// address. On the last address it ends the attempt.
    pub fn on_timeout(&mut self, now: Instant) -> Progress {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return self.progress(),
        }
        self.deadline = None;
        log::warn!(
            "[{}] {} timed out after {}s",
            self.id,
            self.state,
            self.settings.connect_timeout.as_secs()
        );

        let failover = match self.state {
            ConnectionState::TcpPending | ConnectionState::ProxyPending => true,
            ConnectionState::TlsPending => self.resume_state.is_none(),
            _ => false,
        };
        let result = if failover && self.cursor + 1 < self.addresses.len() {
            self.restart_on_next_address()
        } else {
            Err(self.timeout_error())
        };
        self.settle(result)
    }

    /// Drop the current attempt's socket, proxy and TLS state and dial the
    /// next address from scratch.
    fn restart_on_next_address(&mut self) -> NetResult<()> {
        self.tls = None;
        self.close_socket();
        if let Some(mut proxy) = self.proxy.take() {
            proxy.close();
        }
        if let Some(spec) = &self.settings.proxy {
            self.proxy = Some(ProxyNegotiator::new(
                spec,
                &self.host,
                self.port,
                self.resolver.as_ref(),
            )?);
        }
        self.tls_replay.clear();
        self.outbound.clear();
        self.password_prompted = false;
        if self.state != ConnectionState::TcpPending {
            self.set_state(ConnectionState::TcpPending);
        }
        if !self.next_address() {
            return Err(self.timeout_error());
        }
        self.open_current_address()
    }

    /// Close the connection from any phase
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::NotConnected {
            return;
        }
        log::info!("[{}] Disconnecting from {}:{}", self.id, self.host, self.port);
        self.teardown();
    }

    fn timeout_error(&self) -> NetError {
        NetworkError::Timeout {
            host: self.host.clone(),
            port: self.port,
            timeout_seconds: self.settings.connect_timeout.as_secs(),
        }
        .into()
    }

    fn progress(&self) -> Progress {
        if self.state.is_connected() {
            Progress::Connected
        } else {
            Progress::Pending
        }
    }

    /// Turn a step result into a [`Progress`], flushing queued output.
    fn settle(&mut self, result: NetResult<()>) -> Progress {
        if let Err(e) = result {
            return self.fail(e);
        }
        if let Err(e) = self.flush_outbound() {
            return self.fail(NetworkError::ConnectionLost { reason: e.to_string() }.into());
        }
        self.progress()
    }

    fn fail(&mut self, err: NetError) -> Progress {
        log::warn!("[{}] {err}", self.id);
        self.teardown();
        Progress::Failed(err)
    }

    fn teardown(&mut self) {
        if let (Some(tls), Some(socket)) = (self.tls.as_mut(), self.socket.as_mut()) {
            if self.secure {
                tls.close(socket);
            }
        }
        self.tls = None;
        self.close_socket();
        if let Some(mut proxy) = self.proxy.take() {
            proxy.close();
        }
        self.tls_replay.clear();
        self.resume_state = None;
        self.deadline = None;
        self.outbound.clear();
        self.secure = false;
        self.telnet.reset();
        self.set_state(ConnectionState::NotConnected);
    }

    fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.shutdown();
        }
    }

    /// Advance the address cursor. Only valid while the TCP connect is pending.
    fn next_address(&mut self) -> bool {
        if self.state != ConnectionState::TcpPending || self.cursor + 1 >= self.addresses.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    fn open_current_address(&mut self) -> NetResult<()> {
        loop {
            let addr = self.addresses[self.cursor];
            log::info!(
                "[{}] Trying {addr} ({} of {})",
                self.id,
                self.cursor + 1,
                self.addresses.len()
            );
            match self.connector.open(addr) {
                Ok(socket) => {
                    self.socket = Some(socket);
                    self.deadline = Some(Instant::now() + self.settings.connect_timeout);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("[{}] Connect to {addr} failed: {e}", self.id);
                    if !self.next_address() {
                        return Err(self.exhausted(e.to_string()));
                    }
                }
            }
        }
    }

    fn exhausted(&self, last_error: String) -> NetError {
        NetworkError::AddressesExhausted {
            host: self.host.clone(),
            attempts: self.cursor + 1,
            last_error,
        }
        .into()
    }

    fn poll_tcp(&mut self) -> NetResult<()> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(NetworkError::NotConnected.into());
        };
        match socket.poll_connected() {
            Ok(false) => Ok(()),
            Ok(true) => self.tcp_connected(),
            Err(e) => {
                let addr = self.addresses[self.cursor];
                log::warn!("[{}] Connection to {addr} failed: {e}", self.id);
                self.close_socket();
                if self.next_address() {
                    self.open_current_address()
                } else {
                    Err(self.exhausted(e.to_string()))
                }
            }
        }
    }

    fn tcp_connected(&mut self) -> NetResult<()> {
        log::info!("[{}] TCP connection to {} established", self.id, self.addresses[self.cursor]);
        if self.proxy.is_some() {
            self.set_state(ConnectionState::ProxyPending);
            self.run_proxy(true)
        } else {
            self.after_proxy()
        }
    }

    fn run_proxy(&mut self, first: bool) -> NetResult<()> {
        let (Some(proxy), Some(socket)) = (self.proxy.as_mut(), self.socket.as_mut()) else {
            return Err(NetworkError::NotConnected.into());
        };
        let outcome = if first {
            proxy.negotiate(socket)
        } else {
            proxy.resume(socket)
        };
        match outcome {
            ProxyOutcome::WantMore => Ok(()),
            ProxyOutcome::Failure(e) => Err(e.into()),
            ProxyOutcome::Success => {
                if let Some(mut proxy) = self.proxy.take() {
                    proxy.close();
                }
                self.after_proxy()
            }
        }
    }

    fn after_proxy(&mut self) -> NetResult<()> {
        if self.tls_requested {
            self.begin_tls(None)
        } else {
            self.enter_telnet()
        }
    }

    fn begin_tls(&mut self, resume: Option<ConnectionState>) -> NetResult<()> {
        let session = self.connector.tls_session(&self.host)?;
        self.tls = Some(session);
        self.resume_state = resume;
        self.password_prompted = false;
        self.set_state(ConnectionState::TlsPending);
        self.continue_tls()
    }

    fn continue_tls(&mut self) -> NetResult<()> {
        loop {
            let (Some(tls), Some(socket)) = (self.tls.as_mut(), self.socket.as_mut()) else {
                return Err(NetworkError::NotConnected.into());
            };
            let mut stream = Prefixed::new(&mut self.tls_replay, socket);
            let outcome = tls.negotiate(&mut stream);
            match outcome {
                TlsOutcome::Ok => return self.tls_established(),
                TlsOutcome::WantMore => return Ok(()),
                TlsOutcome::Failed(e) => return Err(e.into()),
                TlsOutcome::NeedPassword => {
                    if self.password_prompted {
                        return Err(TlsError::PasswordRejected.into());
                    }
                    self.password_prompted = true;
                    log::info!("[{}] TLS private key needs a password", self.id);
                    let Some(password) = self.connector.prompt_password() else {
                        return Err(TlsError::PasswordRejected.into());
                    };
                    let accepted = self
                        .tls
                        .as_mut()
                        .map(|tls| tls.supply_password(&password))
                        .unwrap_or(false);
                    if !accepted {
                        return Err(TlsError::PasswordRejected.into());
                    }
                }
            }
        }
    }

    fn tls_established(&mut self) -> NetResult<()> {
        if let Some(tls) = &self.tls {
            log::info!("[{}] TLS established: {}", self.id, tls.description());
        }
        self.secure = true;
        match self.resume_state.take() {
            Some(state) => {
                log::debug!("[{}] Resuming in {state} after STARTTLS", self.id);
                self.set_state(state);
                self.read_host_data()
            }
            None => self.enter_telnet(),
        }
    }

    fn enter_telnet(&mut self) -> NetResult<()> {
        self.deadline = None;
        self.set_state(ConnectionState::TelnetPending);
        self.read_host_data()
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(ErrorKind::NotConnected.into());
        };
        match self.tls.as_mut() {
            Some(tls) => {
                let mut stream = Prefixed::new(&mut self.tls_replay, socket);
                tls.read(&mut stream, buf)
            }
            None => socket.read(buf),
        }
    }

    /// Read and process everything the host has sent, including plaintext the
    /// TLS session already holds.
    fn read_host_data(&mut self) -> NetResult<()> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = match self.read_some(&mut buf) {
                Ok(0) => {
                    return Err(NetworkError::ConnectionLost {
                        reason: "host closed the connection".to_string(),
                    }
                    .into())
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(NetworkError::ConnectionLost {
                        reason: e.to_string(),
                    }
                    .into())
                }
            };
            hex_dump(&self.id, Direction::Received, &buf[..n]);

            let processed = self.telnet.process(&buf[..n], &mut self.sink)?;
            self.collect_output();
            self.sync_mode();

            if processed.start_tls {
                self.tls_replay.extend_from_slice(&buf[processed.consumed..n]);
                let resume = self.state;
                self.flush_outbound().map_err(|e| NetworkError::ConnectionLost {
                    reason: e.to_string(),
                })?;
                return self.begin_tls(Some(resume));
            }
        }
    }

    fn sync_mode(&mut self) {
        if self.state.is_connected() {
            let mode = self.telnet.mode();
            if mode != self.state {
                self.set_state(mode);
            } else {
                self.update_indicators();
            }
        }
    }

    fn collect_output(&mut self) {
        let out = self.telnet.take_output();
        if !out.is_empty() {
            hex_dump(&self.id, Direction::Sent, &out);
            self.outbound.extend(out);
        }
    }

    /// Push queued bytes to the socket. Whatever the socket cannot take now
    /// stays queued for the next writable event.
    fn flush_outbound(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::TlsPending {
            return Ok(());
        }
        let Some(socket) = self.socket.as_mut() else {
            return Ok(());
        };

        if let Some(tls) = self.tls.as_mut() {
            let mut stream = Prefixed::new(&mut self.tls_replay, socket);
            if !self.outbound.is_empty() {
                tls.write(&mut stream, &self.outbound)?;
                self.outbound.clear();
            }
            return match tls.flush(&mut stream) {
                Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
                other => other,
            };
        }

        while !self.outbound.is_empty() {
            match socket.write(&self.outbound) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if new_state != self.state {
            let from = self.state;
            self.state = new_state;
            log::debug!("[{}] State {from} -> {new_state}", self.id);
            self.emit(ConnectionEvent::StateChanged {
                from,
                to: new_state,
            });
        }
        self.update_indicators();
    }

    fn update_indicators(&mut self) {
        let connected = self.state.is_connected() || self.resume_state.is_some();
        let now = Indicators {
            connected,
            in_3270: self.state.in_3270(),
            secure: self.secure,
            line_mode: connected && self.telnet.line_mode(),
        };
        let old = std::mem::replace(&mut self.indicators, now);
        if old.connected != now.connected {
            self.emit(ConnectionEvent::Connected(now.connected));
        }
        if old.in_3270 != now.in_3270 {
            self.emit(ConnectionEvent::Mode3270(now.in_3270));
        }
        if old.secure != now.secure {
            self.emit(ConnectionEvent::Secure(now.secure));
        }
        if old.line_mode != now.line_mode {
            self.emit(ConnectionEvent::LineMode(now.line_mode));
        }
    }

    fn emit(&mut self, event: ConnectionEvent) {
        for listener in &mut self.listeners {
            listener.on_connection_event(&event);
        }
    }

    fn require_connected(&self) -> NetResult<()> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(NetworkError::NotConnected.into())
        }
    }

    fn push_output(&mut self) -> NetResult<()> {
        self.collect_output();
        if let Err(e) = self.flush_outbound() {
            let err: NetError = NetworkError::ConnectionLost { reason: e.to_string() }.into();
            self.fail(err.clone());
            return Err(err);
        }
        self.update_indicators();
        Ok(())
    }

    /// Send one outbound 3270 record (framed for TN3270E when negotiated)
    pub fn send_3270_record(&mut self, payload: &[u8]) -> NetResult<()> {
        self.require_connected()?;
        self.telnet.send_3270_record(payload)?;
        self.push_output()
    }

    /// Send NVT text, through the local line editor while in line mode
    pub fn send_nvt_text(&mut self, text: &[u8]) -> NetResult<()> {
        self.require_connected()?;
        self.telnet.send_nvt(text, &mut self.sink)?;
        self.push_output()
    }

    pub fn send_break(&mut self) -> NetResult<()> {
        self.require_connected()?;
        self.telnet.send_break();
        self.push_output()
    }

    pub fn send_interrupt(&mut self) -> NetResult<()> {
        self.require_connected()?;
        self.telnet.send_interrupt();
        self.push_output()
    }

    /// TELNET NOP, as a keepalive
    pub fn send_nop(&mut self) -> NetResult<()> {
        self.require_connected()?;
        self.telnet.send_nop();
        self.push_output()
    }

    pub fn send_sysreq(&mut self) -> NetResult<()> {
        self.require_connected()?;
        self.telnet.send_sysreq()?;
        self.push_output()
    }

    /// Log id of the current (or last) attempt
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address of the socket in use
    pub fn current_address(&self) -> Option<SocketAddr> {
        self.socket.as_ref().map(|_| self.addresses[self.cursor])
    }

    /// LU the host confirmed in TN3270E device-type negotiation
    pub fn connected_lu(&self) -> Option<&str> {
        self.telnet.tn3270e().connected_lu()
    }

    pub fn functions(&self) -> FunctionSet {
        self.telnet.tn3270e().functions()
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_line_mode(&self) -> bool {
        self.indicators.line_mode
    }

    pub fn proxy_type(&self) -> Option<ProxyType> {
        self.settings.proxy.as_ref().map(|p| p.kind)
    }

    pub fn proxy_host(&self) -> Option<&str> {
        self.settings.proxy.as_ref().map(|p| p.host.as_str())
    }

    pub fn proxy_port(&self) -> Option<u16> {
        self.settings.proxy.as_ref().map(|p| p.port)
    }

    pub fn settings(&self) -> &NetSettings {
        &self.settings
    }

    pub fn telnet(&self) -> &TelnetSession {
        &self.telnet
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Bytes waiting for the socket to become writable, including a proxy
    /// request the socket has not taken in full
    pub fn pending_output(&self) -> usize {
        self.outbound.len() + self.proxy.as_ref().map_or(0, ProxyNegotiator::pending_output)
    }
}

impl<C: Connector, S: HostDataSink> Drop for Connection<C, S> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
