//! Proxy negotiation
//!
//! A proxy spec has the form `type:[user[:password]@]host[:port]`, with the host
//! in brackets for a literal IPv6 address. The TCP connection goes to the proxy;
//! once it is up, [`ProxyNegotiator`] runs the proxy's own handshake to reach the
//! real host. Every driver is resumable: `WantMore` means "call
//! [`ProxyNegotiator::resume`] again when the socket is readable".

pub mod http;
pub mod passthru;
pub mod socks4;
pub mod socks5;
pub mod telnet;

use std::fmt;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{ProxyError, ProxyResult};
use crate::socket::ReadWrite;

/// Supported proxy protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Passthru,
    Http,
    Telnet,
    Socks4,
    Socks4a,
    Socks5,
    Socks5d,
}

impl ProxyType {
    pub const ALL: [ProxyType; 7] = [
        ProxyType::Passthru,
        ProxyType::Http,
        ProxyType::Telnet,
        ProxyType::Socks4,
        ProxyType::Socks4a,
        ProxyType::Socks5,
        ProxyType::Socks5d,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.name() == lower)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProxyType::Passthru => "passthru",
            ProxyType::Http => "http",
            ProxyType::Telnet => "telnet",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks4a => "socks4a",
            ProxyType::Socks5 => "socks5",
            ProxyType::Socks5d => "socks5d",
        }
    }

    /// Port used when the spec gives none. Telnet proxies have no default.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            ProxyType::Passthru => Some(3514),
            ProxyType::Http => Some(3128),
            ProxyType::Telnet => None,
            ProxyType::Socks4 | ProxyType::Socks4a | ProxyType::Socks5 | ProxyType::Socks5d => {
                Some(1080)
            }
        }
    }

    pub fn accepts_user(&self) -> bool {
        !matches!(self, ProxyType::Passthru | ProxyType::Telnet)
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed proxy specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub kind: ProxyType,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
}

impl FromStr for ProxySpec {
    type Err = ProxyError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        parse_proxy_spec(spec)
    }
}

fn invalid(spec: &str, reason: &str) -> ProxyError {
    ProxyError::InvalidSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `type:[user[:password]@]host[:port]`
pub fn parse_proxy_spec(spec: &str) -> ProxyResult<ProxySpec> {
    let (type_name, rest) = spec
        .split_once(':')
        .ok_or_else(|| invalid(spec, "missing ':' after the proxy type"))?;
    let kind = ProxyType::from_name(type_name).ok_or_else(|| ProxyError::UnknownType {
        name: type_name.to_string(),
    })?;

    let (userinfo, hostport) = match rest.rsplit_once('@') {
        Some((userinfo, hostport)) => (Some(userinfo), hostport),
        None => (None, rest),
    };

    let (user, password) = match userinfo {
        Some(info) => {
            if !kind.accepts_user() {
                return Err(ProxyError::UsernameNotSupported {
                    kind: kind.name().to_string(),
                });
            }
            let (user, password) = match info.split_once(':') {
                Some((u, p)) => (u, Some(p.to_string())),
                None => (info, None),
            };
            if user.is_empty() {
                return Err(invalid(spec, "empty username"));
            }
            (Some(user.to_string()), password)
        }
        None => (None, None),
    };

    let (host, port_text) = if let Some(bracketed) = hostport.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid(spec, "missing ']' after IPv6 address"))?;
        let port_text = match after {
            "" => None,
            other => Some(
                other
                    .strip_prefix(':')
                    .ok_or_else(|| invalid(spec, "unexpected text after ']'"))?,
            ),
        };
        (host, port_text)
    } else {
        match hostport.split_once(':') {
            Some((_, p)) if p.contains(':') => {
                return Err(invalid(spec, "IPv6 addresses must be in brackets"))
            }
            Some((h, p)) => (h, Some(p)),
            None => (hostport, None),
        }
    };

    if host.is_empty() {
        return Err(invalid(spec, "missing host"));
    }

    let port = match port_text {
        Some(text) => text
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| invalid(spec, "bad port"))?,
        None => kind.default_port().ok_or_else(|| ProxyError::PortRequired {
            kind: kind.name().to_string(),
        })?,
    };

    Ok(ProxySpec {
        kind,
        user,
        password,
        host: host.to_string(),
        port,
    })
}

/// Name resolution used by the SOCKS drivers before they fall back to
/// letting the proxy resolve.
pub trait HostResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok((host, port).to_socket_addrs()?.collect())
    }
}

/// Result of a negotiation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success,
    Failure(ProxyError),
    WantMore,
}

/// Read one byte without blocking. `Ok(None)` means no data yet; end of stream
/// is an error because every proxy reply has a known length.
pub(crate) fn read_byte(socket: &mut dyn ReadWrite, kind: &str) -> ProxyResult<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match socket.read(&mut byte) {
            Ok(0) => {
                return Err(ProxyError::Io {
                    kind: kind.to_string(),
                    reason: "proxy closed the connection".to_string(),
                })
            }
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ProxyError::Io {
                    kind: kind.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Request bytes the socket has not accepted yet. A short or would-block
/// write leaves the rest queued for the next writable event.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outbox {
    pending: Vec<u8>,
}

impl Outbox {
    pub fn queue(&mut self, kind: &str, data: &[u8]) {
        crate::trace::hex_dump(kind, crate::trace::Direction::Sent, data);
        self.pending.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Write as much as the socket takes. `Ok(true)` once nothing is left.
    pub fn flush(&mut self, socket: &mut dyn ReadWrite, kind: &str) -> ProxyResult<bool> {
        let send_failed = |e: io::Error| ProxyError::Io {
            kind: kind.to_string(),
            reason: format!("send failed: {e}"),
        };
        while !self.pending.is_empty() {
            match socket.write(&self.pending) {
                Ok(0) => return Err(send_failed(ErrorKind::WriteZero.into())),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(send_failed(e)),
            }
        }
        match socket.flush() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(true),
            Err(e) => Err(send_failed(e)),
        }
    }

    /// Flush, mapping "still pending" and errors to an early outcome
    pub fn drain(&mut self, socket: &mut dyn ReadWrite, kind: &str) -> Option<ProxyOutcome> {
        match self.flush(socket, kind) {
            Ok(true) => None,
            Ok(false) => Some(ProxyOutcome::WantMore),
            Err(e) => Some(ProxyOutcome::Failure(e)),
        }
    }
}

/// Target host as it appears in a request line: IPv6 literals in brackets
pub(crate) fn host_port_text(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// One proxy handshake in progress
#[derive(Debug)]
pub enum ProxyNegotiator {
    Passthru(passthru::PassthruProxy),
    Http(http::HttpProxy),
    Telnet(telnet::TelnetProxy),
    Socks4(socks4::Socks4Proxy),
    Socks5(socks5::Socks5Proxy),
}

impl ProxyNegotiator {
    /// Prepare the handshake for reaching `target_host:target_port` through
    /// the proxy described by `spec`. SOCKS variants that resolve locally do
    /// so here.
    pub fn new(
        spec: &ProxySpec,
        target_host: &str,
        target_port: u16,
        resolver: &dyn HostResolver,
    ) -> ProxyResult<Self> {
        let user = spec.user.clone();
        Ok(match spec.kind {
            ProxyType::Passthru => {
                ProxyNegotiator::Passthru(passthru::PassthruProxy::new(target_host, target_port))
            }
            ProxyType::Telnet => {
                ProxyNegotiator::Telnet(telnet::TelnetProxy::new(target_host, target_port))
            }
            ProxyType::Http => ProxyNegotiator::Http(http::HttpProxy::new(
                user,
                spec.password.clone(),
                target_host,
                target_port,
            )),
            ProxyType::Socks4 | ProxyType::Socks4a => {
                ProxyNegotiator::Socks4(socks4::Socks4Proxy::new(
                    spec.kind == ProxyType::Socks4a,
                    user,
                    target_host,
                    target_port,
                    resolver,
                )?)
            }
            ProxyType::Socks5 | ProxyType::Socks5d => {
                ProxyNegotiator::Socks5(socks5::Socks5Proxy::new(
                    spec.kind == ProxyType::Socks5d,
                    user,
                    spec.password.clone(),
                    target_host,
                    target_port,
                    resolver,
                )?)
            }
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ProxyNegotiator::Passthru(_) => "passthru",
            ProxyNegotiator::Http(_) => "HTTP",
            ProxyNegotiator::Telnet(_) => "TELNET",
            ProxyNegotiator::Socks4(p) => p.kind_name(),
            ProxyNegotiator::Socks5(p) => p.kind_name(),
        }
    }

    /// Send the opening request and process whatever reply is already there.
    pub fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        let outcome = match self {
            ProxyNegotiator::Passthru(p) => p.negotiate(socket),
            ProxyNegotiator::Http(p) => p.negotiate(socket),
            ProxyNegotiator::Telnet(p) => p.negotiate(socket),
            ProxyNegotiator::Socks4(p) => p.negotiate(socket),
            ProxyNegotiator::Socks5(p) => p.negotiate(socket),
        };
        self.log_outcome(&outcome);
        outcome
    }

    /// Continue after the socket became readable or writable
    pub fn resume(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        let outcome = match self {
            ProxyNegotiator::Passthru(p) => p.resume(socket),
            ProxyNegotiator::Telnet(p) => p.resume(socket),
            ProxyNegotiator::Http(p) => p.resume(socket),
            ProxyNegotiator::Socks4(p) => p.resume(socket),
            ProxyNegotiator::Socks5(p) => p.resume(socket),
        };
        self.log_outcome(&outcome);
        outcome
    }

    /// Request bytes still waiting for the socket
    pub fn pending_output(&self) -> usize {
        match self {
            ProxyNegotiator::Passthru(p) => p.pending_output(),
            ProxyNegotiator::Http(p) => p.pending_output(),
            ProxyNegotiator::Telnet(p) => p.pending_output(),
            ProxyNegotiator::Socks4(p) => p.pending_output(),
            ProxyNegotiator::Socks5(p) => p.pending_output(),
        }
    }

    /// Release request and reply buffers
    pub fn close(&mut self) {
        match self {
            ProxyNegotiator::Passthru(p) => p.close(),
            ProxyNegotiator::Telnet(p) => p.close(),
            ProxyNegotiator::Http(p) => p.close(),
            ProxyNegotiator::Socks4(p) => p.close(),
            ProxyNegotiator::Socks5(p) => p.close(),
        }
    }

    fn log_outcome(&self, outcome: &ProxyOutcome) {
        match outcome {
            ProxyOutcome::Success => log::info!("{} proxy: connection established", self.kind_name()),
            ProxyOutcome::Failure(e) => log::warn!("{e}"),
            ProxyOutcome::WantMore => {}
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_spec() {
        let spec = parse_proxy_spec("socks5:bob:secret@10.0.0.5:1080").unwrap();
        assert_eq!(spec.kind, ProxyType::Socks5);
        assert_eq!(spec.user.as_deref(), Some("bob"));
        assert_eq!(spec.password.as_deref(), Some("secret"));
        assert_eq!(spec.host, "10.0.0.5");
        assert_eq!(spec.port, 1080);
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(parse_proxy_spec("http:proxy.example").unwrap().port, 3128);
        assert_eq!(parse_proxy_spec("passthru:gw").unwrap().port, 3514);
        assert_eq!(parse_proxy_spec("SOCKS4A:gw").unwrap().port, 1080);
        assert!(matches!(
            parse_proxy_spec("telnet:gw"),
            Err(ProxyError::PortRequired { .. })
        ));
    }

    #[test]
    fn test_ipv6_host() {
        let spec = parse_proxy_spec("http:user@[2001:db8::1]:8080").unwrap();
        assert_eq!(spec.host, "2001:db8::1");
        assert_eq!(spec.port, 8080);
        let spec = parse_proxy_spec("socks5d:[::1]").unwrap();
        assert_eq!(spec.host, "::1");
        assert_eq!(spec.port, 1080);
        assert!(parse_proxy_spec("http:2001:db8::1").is_err());
    }

    #[test]
    fn test_username_rejected_for_passthru_and_telnet() {
        assert!(matches!(
            parse_proxy_spec("passthru:joe@gw:3514"),
            Err(ProxyError::UsernameNotSupported { .. })
        ));
        assert!(matches!(
            parse_proxy_spec("telnet:joe@gw:23"),
            Err(ProxyError::UsernameNotSupported { .. })
        ));
    }

    #[test]
    fn test_bad_specs() {
        assert!(matches!(
            parse_proxy_spec("ftp:gw"),
            Err(ProxyError::UnknownType { .. })
        ));
        assert!(parse_proxy_spec("http").is_err());
        assert!(parse_proxy_spec("http:").is_err());
        assert!(parse_proxy_spec("http:gw:0").is_err());
        assert!(parse_proxy_spec("http:gw:99999").is_err());
        assert!(parse_proxy_spec("http:[::1").is_err());
    }

    #[test]
    fn test_outbox_keeps_what_the_socket_refuses() {
        let mut socket = mock::ScriptedStream::new();
        socket.set_write_budget(Some(3));
        let mut outbox = Outbox::default();
        outbox.queue("test", b"CONNECT");
        assert!(!outbox.flush(&mut socket, "test").unwrap());
        assert_eq!(socket.take_sent(), b"CON");
        assert_eq!(outbox.len(), 4);

        assert!(!outbox.flush(&mut socket, "test").unwrap());
        assert!(socket.sent().is_empty());

        socket.set_write_budget(None);
        assert!(outbox.flush(&mut socket, "test").unwrap());
        assert_eq!(socket.take_sent(), b"NECT");
        assert_eq!(outbox.len(), 0);
    }

    #[test]
    fn test_host_port_text() {
        assert_eq!(host_port_text("host.example", 23), "host.example:23");
        assert_eq!(host_port_text("::1", 23), "[::1]:23");
    }
}
