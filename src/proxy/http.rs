//! HTTP CONNECT proxy

use base64::Engine as _;

use super::{host_port_text, read_byte, Outbox, ProxyOutcome};
use crate::error::ProxyError;
use crate::socket::ReadWrite;

const KIND: &str = "HTTP";

/// Longest reply header block accepted
pub const MAX_REPLY: usize = 1024;

#[derive(Debug, Clone)]
pub struct HttpProxy {
    request: String,
    outbox: Outbox,
    reply: Vec<u8>,
    line_start: usize,
}

impl HttpProxy {
    pub fn new(user: Option<String>, password: Option<String>, host: &str, port: u16) -> Self {
        let target = host_port_text(host, port);
        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if let Some(user) = user {
            let credentials = format!("{user}:{}", password.unwrap_or_default());
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            request.push_str(&format!("Proxy-Authorization: Basic {encoded}\r\n"));
        }
        request.push_str("\r\n");
        Self {
            request,
            outbox: Outbox::default(),
            reply: Vec::new(),
            line_start: 0,
        }
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        self.close();
        self.outbox.queue(KIND, self.request.as_bytes());
        self.resume(socket)
    }

    /// Finish sending the request, then collect reply lines until the empty
    /// line that ends the headers
    pub fn resume(&mut self, socket: &mut dyn ReadWrite) -> ProxyOutcome {
        if let Some(outcome) = self.outbox.drain(socket, KIND) {
            return outcome;
        }
        loop {
            let byte = match read_byte(socket, KIND) {
                Ok(Some(b)) => b,
                Ok(None) => return ProxyOutcome::WantMore,
                Err(e) => return ProxyOutcome::Failure(e),
            };
            match byte {
                b'\r' => continue,
                b'\n' => {
                    if self.reply.len() == self.line_start {
                        return self.check_status();
                    }
                    self.reply.push(b'\n');
                    self.line_start = self.reply.len();
                }
                other => self.reply.push(other),
            }
            if self.reply.len() >= MAX_REPLY {
                return ProxyOutcome::Failure(ProxyError::MalformedReply {
                    kind: KIND.to_string(),
                    detail: "reply too long".to_string(),
                });
            }
        }
    }

    fn check_status(&self) -> ProxyOutcome {
        let text = String::from_utf8_lossy(&self.reply);
        let status_line = text.lines().next().unwrap_or("");
        log::debug!("{KIND} proxy reply: {status_line}");

        let mut words = status_line.split_whitespace();
        let version = words.next().unwrap_or("");
        let code = words.next().and_then(|c| c.parse::<u16>().ok());
        match (version.starts_with("HTTP/"), code) {
            (true, Some(code)) if (200..300).contains(&code) => ProxyOutcome::Success,
            (true, Some(_)) => ProxyOutcome::Failure(ProxyError::Rejected {
                kind: KIND.to_string(),
                reason: status_line.to_string(),
            }),
            _ => ProxyOutcome::Failure(ProxyError::MalformedReply {
                kind: KIND.to_string(),
                detail: format!("bad status line '{status_line}'"),
            }),
        }
    }

    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    pub fn close(&mut self) {
        self.outbox.clear();
        self.reply = Vec::new();
        self.line_start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mock::ScriptedStream;

    #[test]
    fn test_request_with_credentials() {
        let proxy = HttpProxy::new(
            Some("bob".to_string()),
            Some("secret".to_string()),
            "mvs.example",
            23,
        );
        assert_eq!(
            proxy.request(),
            "CONNECT mvs.example:23 HTTP/1.1\r\nHost: mvs.example:23\r\n\
             Proxy-Authorization: Basic Ym9iOnNlY3JldA==\r\n\r\n"
        );
    }

    #[test]
    fn test_success_across_reads() {
        let mut socket = ScriptedStream::new();
        let mut proxy = HttpProxy::new(None, None, "::1", 23);
        socket.feed(b"HTTP/1.1 200 Connection established\r\n");
        assert_eq!(proxy.negotiate(&mut socket), ProxyOutcome::WantMore);
        assert!(socket.sent().starts_with(b"CONNECT [::1]:23 HTTP/1.1\r\n"));

        socket.feed(b"Proxy-Agent: test\r\n\r\n");
        assert_eq!(proxy.resume(&mut socket), ProxyOutcome::Success);
    }

    #[test]
    fn test_error_status() {
        let mut socket = ScriptedStream::new();
        socket.feed(b"HTTP/1.0 407 Proxy Authentication Required\r\n\r\n");
        let mut proxy = HttpProxy::new(None, None, "host", 23);
        match proxy.negotiate(&mut socket) {
            ProxyOutcome::Failure(ProxyError::Rejected { reason, .. }) => {
                assert!(reason.contains("407"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_garbage_reply() {
        let mut socket = ScriptedStream::new();
        socket.feed(b"SSH-2.0-OpenSSH\r\n\r\n");
        let mut proxy = HttpProxy::new(None, None, "host", 23);
        assert!(matches!(
            proxy.negotiate(&mut socket),
            ProxyOutcome::Failure(ProxyError::MalformedReply { .. })
        ));
    }

    #[test]
    fn test_overlong_reply() {
        let mut socket = ScriptedStream::new();
        socket.feed(&vec![b'x'; MAX_REPLY + 10]);
        let mut proxy = HttpProxy::new(None, None, "host", 23);
        assert!(matches!(
            proxy.negotiate(&mut socket),
            ProxyOutcome::Failure(ProxyError::MalformedReply { .. })
        ));
    }

    #[test]
    fn test_closed_before_reply() {
        let mut socket = ScriptedStream::new();
        socket.close_input();
        let mut proxy = HttpProxy::new(None, None, "host", 23);
        assert!(matches!(
            proxy.negotiate(&mut socket),
            ProxyOutcome::Failure(ProxyError::Io { .. })
        ));
    }
}
