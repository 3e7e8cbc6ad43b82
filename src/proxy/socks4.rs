//! SOCKS version 4 and 4A

use std::net::{IpAddr, Ipv4Addr};

use super::{read_byte, HostResolver, Outbox, ProxyOutcome};
use crate::error::{ProxyError, ProxyResult};
use crate::socket::ReadWrite;

const REPLY_LEN: usize = 8;

const GRANTED: u8 = 0x5a;
const REJECTED: u8 = 0x5b;
const NO_IDENTD: u8 = 0x5c;
const IDENTD_MISMATCH: u8 = 0x5d;

/// User name sent in the request when the spec has none
pub fn default_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "nobody".to_string())
}

#[derive(Debug, Clone)]
pub struct Socks4Proxy {
    socks4a: bool,
    request: Vec<u8>,
    outbox: Outbox,
    reply: Vec<u8>,
}

impl Socks4Proxy {
    /// SOCKS4 must resolve the target to an IPv4 address here. SOCKS4A sends
    /// anything that is not an IPv4 literal by name for the proxy to resolve.
    pub fn new(
        socks4a: bool,
        user: Option<String>,
        host: &str,
        port: u16,
        resolver: &dyn HostResolver,
    ) -> ProxyResult<Self> {
        let kind = if socks4a { "SOCKS4A" } else { "SOCKS4" };
        let literal = host.parse::<Ipv4Addr>().ok();

        let (address, by_name) = match (literal, socks4a) {
            (Some(ip), _) => (ip, false),
            (None, true) => (Ipv4Addr::new(0, 0, 0, 1), true),
            (None, false) => {
                let resolved = resolver
                    .resolve(host, port)
                    .ok()
                    .and_then(|addrs| {
                        addrs.into_iter().find_map(|a| match a.ip() {
                            IpAddr::V4(v4) => Some(v4),
                            IpAddr::V6(_) => None,
                        })
                    })
                    .ok_or_else(|| ProxyError::ResolveFailed {
                        kind: kind.to_string(),
                        host: host.to_string(),
                    })?;
                (resolved, false)
            }
        };

        let user = user.unwrap_or_else(default_user);
        let mut request = vec![4, 1];
        request.extend_from_slice(&port.to_be_bytes());
        request.extend_from_slice(&address.octets());
        request.extend_from_slice(user.as_bytes());
        request.push(0);
        if by_name {
            request.extend_from_slice(host.as_bytes());
            request.push(0);
        }
        log::debug!("{kind} proxy: requesting {host}:{port} as {address} for user {user}");

        Ok(Self {
            socks4a,
            request,
            outbox: Outbox::default(),
            reply: Vec::with_capacity(REPLY_LEN),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        if self.socks4a {
            "SOCKS4A"
        } else {
            "SOCKS4"
        }
    }

    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        self.close();
        let kind = self.kind_name();
        self.outbox.queue(kind, &self.request);
        self.resume(socket)
    }

    pub fn resume(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        let kind = self.kind_name();
        if let Some(outcome) = self.outbox.drain(socket, kind) {
            return outcome;
        }
        while self.reply.len() < REPLY_LEN {
            match read_byte(socket, self.kind_name()) {
                Ok(Some(b)) => self.reply.push(b),
                Ok(None) => return ProxyOutcome::WantMore,
                Err(e) => return ProxyOutcome::Failure(e),
            }
        }
        crate::trace::hex_dump(self.kind_name(), crate::trace::Direction::Received, &self.reply);

        if self.reply[0] != 0 {
            return ProxyOutcome::Failure(ProxyError::MalformedReply {
                kind: self.kind_name().to_string(),
                detail: format!("bad reply version {}", self.reply[0]),
            });
        }
        let reason = match self.reply[1] {
            GRANTED => return ProxyOutcome::Success,
            REJECTED => "request rejected or failed".to_string(),
            NO_IDENTD => "client is not reachable".to_string(),
            IDENTD_MISMATCH => "userid error".to_string(),
            other => format!("unknown status 0x{other:02x}"),
        };
        ProxyOutcome::Failure(ProxyError::Rejected {
            kind: self.kind_name().to_string(),
            reason,
        })
    }

    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    pub fn close(&mut self) {
        self.outbox.clear();
        self.reply.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mock::ScriptedStream;
    use std::io;
    use std::net::SocketAddr;

    struct FixedResolver(Vec<SocketAddr>);

    impl HostResolver for FixedResolver {
        fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
            if self.0.is_empty() {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such host"))
            } else {
                Ok(self.0.clone())
            }
        }
    }

    #[test]
    fn test_socks4_resolves_locally() {
        let resolver = FixedResolver(vec![
            "[2001:db8::1]:23".parse().unwrap(),
            "192.0.2.7:23".parse().unwrap(),
        ]);
        let proxy = Socks4Proxy::new(false, Some("joe".into()), "mvs", 23, &resolver).unwrap();
        assert_eq!(proxy.request(), &[4, 1, 0, 23, 192, 0, 2, 7, b'j', b'o', b'e', 0]);
    }

    #[test]
    fn test_socks4_resolution_failure() {
        let result = Socks4Proxy::new(false, None, "nowhere", 23, &FixedResolver(vec![]));
        assert!(matches!(result, Err(ProxyError::ResolveFailed { .. })));
    }

    #[test]
    fn test_socks4a_sends_name() {
        let proxy =
            Socks4Proxy::new(true, Some("u".into()), "mvs", 992, &FixedResolver(vec![])).unwrap();
        assert_eq!(
            proxy.request(),
            &[4, 1, 0x03, 0xe0, 0, 0, 0, 1, b'u', 0, b'm', b'v', b's', 0]
        );

        let proxy =
            Socks4Proxy::new(true, Some("u".into()), "10.0.0.1", 23, &FixedResolver(vec![]))
                .unwrap();
        assert_eq!(proxy.request(), &[4, 1, 0, 23, 10, 0, 0, 1, b'u', 0]);
    }

    #[test]
    fn test_reply_in_pieces() {
        let mut socket = ScriptedStream::new();
        let mut proxy =
            Socks4Proxy::new(false, Some("u".into()), "10.0.0.1", 23, &FixedResolver(vec![]))
                .unwrap();
        assert_eq!(proxy.negotiate(&mut socket), ProxyOutcome::WantMore);
        socket.feed(&[0, GRANTED, 0]);
        assert_eq!(proxy.resume(&mut socket), ProxyOutcome::WantMore);
        socket.feed(&[23, 10, 0, 0, 1]);
        assert_eq!(proxy.resume(&mut socket), ProxyOutcome::Success);
    }

    #[test]
    fn test_reply_version_must_be_zero() {
        let mut socket = ScriptedStream::new();
        socket.feed(&[4, GRANTED, 0, 23, 10, 0, 0, 1]);
        let mut proxy =
            Socks4Proxy::new(false, None, "10.0.0.1", 23, &FixedResolver(vec![])).unwrap();
        match proxy.negotiate(&mut socket) {
            ProxyOutcome::Failure(ProxyError::MalformedReply { detail, .. }) => {
                assert!(detail.contains("version 4"), "{detail}")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_request_waits_for_writable_socket() {
        let mut socket = ScriptedStream::new();
        socket.set_write_budget(Some(5));
        socket.feed(&[0, GRANTED, 0, 23, 10, 0, 0, 1]);
        let mut proxy =
            Socks4Proxy::new(false, Some("u".into()), "10.0.0.1", 23, &FixedResolver(vec![]))
                .unwrap();
        assert_eq!(proxy.negotiate(&mut socket), ProxyOutcome::WantMore);
        assert_eq!(socket.sent(), &[4, 1, 0, 23, 10]);
        assert_eq!(proxy.pending_output(), 5);

        socket.set_write_budget(None);
        assert_eq!(proxy.resume(&mut socket), ProxyOutcome::Success);
        assert_eq!(socket.sent(), &[4, 1, 0, 23, 10, 0, 0, 1, b'u', 0]);
    }

    #[test]
    fn test_rejection_codes() {
        for (code, text) in [
            (REJECTED, "rejected"),
            (NO_IDENTD, "not reachable"),
            (IDENTD_MISMATCH, "userid"),
            (0x42, "unknown"),
        ] {
            let mut socket = ScriptedStream::new();
            socket.feed(&[0, code, 0, 0, 0, 0, 0, 0]);
            let mut proxy =
                Socks4Proxy::new(false, None, "10.0.0.1", 23, &FixedResolver(vec![])).unwrap();
            match proxy.negotiate(&mut socket) {
                ProxyOutcome::Failure(ProxyError::Rejected { reason, .. }) => {
                    assert!(reason.contains(text), "{reason}")
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }
}
