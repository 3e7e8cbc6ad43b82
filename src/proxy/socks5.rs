//! SOCKS version 5 with optional username/password authentication

use std::net::IpAddr;

use super::{read_byte, HostResolver, Outbox, ProxyOutcome};
use crate::error::{ProxyError, ProxyResult};
use crate::socket::ReadWrite;

const VERSION: u8 = 5;
const METHOD_NONE: u8 = 0x00;
const METHOD_USERPASS: u8 = 0x02;
const METHOD_REJECTED: u8 = 0xff;
const USERPASS_VERSION: u8 = 1;
const CMD_CONNECT: u8 = 1;

const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

/// Text for a non-zero CONNECT reply code
pub fn reply_message(code: u8) -> String {
    match code {
        1 => "general SOCKS server failure".to_string(),
        2 => "connection not allowed by ruleset".to_string(),
        3 => "network unreachable".to_string(),
        4 => "host unreachable".to_string(),
        5 => "connection refused".to_string(),
        6 => "TTL expired".to_string(),
        7 => "command not supported".to_string(),
        8 => "address type not supported".to_string(),
        other => format!("unknown error 0x{other:02x}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    MethodReply,
    AuthReply,
    ConnectReply,
}

#[derive(Debug, Clone)]
pub struct Socks5Proxy {
    socks5d: bool,
    credentials: Option<(String, String)>,
    connect: Vec<u8>,
    phase: Phase,
    outbox: Outbox,
    reply: Vec<u8>,
}

impl Socks5Proxy {
    /// Plain SOCKS5 resolves the target here and falls back to sending the
    /// name when that fails. SOCKS5D always lets the proxy resolve names.
    pub fn new(
        socks5d: bool,
        user: Option<String>,
        password: Option<String>,
        host: &str,
        port: u16,
        resolver: &dyn HostResolver,
    ) -> ProxyResult<Self> {
        let kind = if socks5d { "SOCKS5D" } else { "SOCKS5" };

        let address = match host.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) if socks5d => None,
            Err(_) => match resolver.resolve(host, port) {
                Ok(addrs) => addrs.first().map(|a| a.ip()),
                Err(e) => {
                    log::debug!("{kind} proxy: local resolution of {host} failed ({e}), sending the name");
                    None
                }
            },
        };

        let mut connect = vec![VERSION, CMD_CONNECT, 0];
        match address {
            Some(IpAddr::V4(v4)) => {
                connect.push(ATYP_IPV4);
                connect.extend_from_slice(&v4.octets());
            }
            Some(IpAddr::V6(v6)) => {
                connect.push(ATYP_IPV6);
                connect.extend_from_slice(&v6.octets());
            }
            None => {
                let len = u8::try_from(host.len()).map_err(|_| ProxyError::InvalidSpec {
                    spec: host.to_string(),
                    reason: "host name too long for SOCKS5".to_string(),
                })?;
                connect.push(ATYP_DOMAIN);
                connect.push(len);
                connect.extend_from_slice(host.as_bytes());
            }
        }
        connect.extend_from_slice(&port.to_be_bytes());

        Ok(Self {
            socks5d,
            credentials: user.map(|u| (u, password.unwrap_or_default())),
            connect,
            phase: Phase::MethodReply,
            outbox: Outbox::default(),
            reply: Vec::new(),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        if self.socks5d {
            "SOCKS5D"
        } else {
            "SOCKS5"
        }
    }

    pub fn connect_request(&self) -> &[u8] {
        &self.connect
    }

    fn method_offer(&self) -> Vec<u8> {
        if self.credentials.is_some() {
            vec![VERSION, 2, METHOD_NONE, METHOD_USERPASS]
        } else {
            vec![VERSION, 1, METHOD_NONE]
        }
    }

    fn fail(&self, reason: impl Into<String>) -> ProxyOutcome {
        ProxyOutcome::Failure(ProxyError::Rejected {
            kind: self.kind_name().to_string(),
            reason: reason.into(),
        })
    }

    fn malformed(&self, detail: impl Into<String>) -> ProxyOutcome {
        ProxyOutcome::Failure(ProxyError::MalformedReply {
            kind: self.kind_name().to_string(),
            detail: detail.into(),
        })
    }

    pub fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        self.close();
        let offer = self.method_offer();
        let kind = self.kind_name();
        self.outbox.queue(kind, &offer);
        self.resume(socket)
    }

    /// Read until `reply` holds `want` bytes. `Some` is an early exit.
    fn fill(&mut self, socket: &mut dyn ReadWrite, want: usize) -> Option<ProxyOutcome> {
        while self.reply.len() < want {
            match read_byte(socket, self.kind_name()) {
                Ok(Some(b)) => self.reply.push(b),
                Ok(None) => return Some(ProxyOutcome::WantMore),
                Err(e) => return Some(ProxyOutcome::Failure(e)),
            }
        }
        None
    }

    /// Queue the next request and wait for the reply that answers it
    fn send(&mut self, data: &[u8], next: Phase) {
        let kind = self.kind_name();
        self.outbox.queue(kind, data);
        self.phase = next;
        self.reply.clear();
    }

    pub fn resume(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        loop {
            let kind = self.kind_name();
            if let Some(outcome) = self.outbox.drain(socket, kind) {
                return outcome;
            }
            match self.phase {
                Phase::MethodReply => {
                    if let Some(outcome) = self.fill(socket, 2) {
                        return outcome;
                    }
                    if self.reply[0] != VERSION {
                        return self.malformed(format!("bad version {}", self.reply[0]));
                    }
                    match self.reply[1] {
                        METHOD_NONE => {
                            let connect = self.connect.clone();
                            self.send(&connect, Phase::ConnectReply);
                        }
                        METHOD_USERPASS => match self.credentials.clone() {
                            Some((user, password)) => {
                                let mut auth = vec![USERPASS_VERSION, user.len().min(255) as u8];
                                auth.extend_from_slice(&user.as_bytes()[..user.len().min(255)]);
                                auth.push(password.len().min(255) as u8);
                                auth.extend_from_slice(&password.as_bytes()[..password.len().min(255)]);
                                self.send(&auth, Phase::AuthReply);
                            }
                            None => return self.malformed("proxy chose an authentication method we did not offer"),
                        },
                        METHOD_REJECTED => return self.fail("no acceptable authentication method"),
                        other => return self.malformed(format!("unsupported method 0x{other:02x}")),
                    }
                }
                Phase::AuthReply => {
                    if let Some(outcome) = self.fill(socket, 2) {
                        return outcome;
                    }
                    if self.reply[0] != USERPASS_VERSION {
                        return self.malformed(format!("bad authentication reply version {}", self.reply[0]));
                    }
                    if self.reply[1] != 0 {
                        return self.fail("authentication failed");
                    }
                    let connect = self.connect.clone();
                    self.send(&connect, Phase::ConnectReply);
                }
                Phase::ConnectReply => {
                    if let Some(outcome) = self.fill(socket, 4) {
                        return outcome;
                    }
                    if self.reply[0] != VERSION {
                        return self.malformed(format!("bad version {}", self.reply[0]));
                    }
                    if self.reply[1] != 0 {
                        return self.fail(reply_message(self.reply[1]));
                    }
                    let total = match self.reply[3] {
                        ATYP_IPV4 => 4 + 4 + 2,
                        ATYP_IPV6 => 4 + 16 + 2,
                        ATYP_DOMAIN => {
                            if let Some(outcome) = self.fill(socket, 5) {
                                return outcome;
                            }
                            5 + self.reply[4] as usize + 2
                        }
                        other => return self.malformed(format!("unknown address type {other}")),
                    };
                    if let Some(outcome) = self.fill(socket, total) {
                        return outcome;
                    }
                    crate::trace::hex_dump(
                        self.kind_name(),
                        crate::trace::Direction::Received,
                        &self.reply,
                    );
                    return ProxyOutcome::Success;
                }
            }
        }
    }

    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    pub fn close(&mut self) {
        self.outbox.clear();
        self.reply.clear();
        self.phase = Phase::MethodReply;
    }
}
