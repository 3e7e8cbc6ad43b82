//! Socket seam between the connection manager and the operating system
//!
//! The manager never opens sockets itself. A [`Connector`] opens non-blocking
//! sockets and builds TLS sessions; tests substitute in-memory versions.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

use crate::error::TlsResult;
use crate::network_platform::configure_host_socket;
use crate::tls::{RustlsSession, TlsSession, TlsSettings};

// A helper trait alias for objects that implement both Read and Write
pub trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

/// A non-blocking, possibly still-connecting stream socket
pub trait NetSocket: Read + Write {
    /// `Ok(true)` once the connect has completed, `Ok(false)` while it is
    /// still in progress, `Err` if it failed.
    fn poll_connected(&mut self) -> io::Result<bool>;

    fn shutdown(&mut self);
}

/// Opens sockets and TLS sessions for the connection manager
pub trait Connector {
    type Socket: NetSocket;

    /// Start a non-blocking connect to `addr`
    fn open(&mut self, addr: SocketAddr) -> io::Result<Self::Socket>;

    /// Build a client TLS session for `host`
    fn tls_session(&mut self, host: &str) -> TlsResult<Box<dyn TlsSession>>;

    /// Ask the user for a private key password. `None` cancels.
    fn prompt_password(&mut self) -> Option<String> {
        None
    }
}

impl NetSocket for mio::net::TcpStream {
    fn poll_connected(&mut self) -> io::Result<bool> {
        if let Some(err) = self.take_error()? {
            return Err(err);
        }
        match self.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            #[cfg(unix)]
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn shutdown(&mut self) {
        let _ = mio::net::TcpStream::shutdown(self, Shutdown::Both);
    }
}

/// Opens mio TCP streams and rustls sessions. When given a registry, every
/// new socket is registered for readable and writable events under `token`.
pub struct MioConnector {
    registry: Option<mio::Registry>,
    token: mio::Token,
    tls: TlsSettings,
}

impl MioConnector {
    pub fn new(tls: TlsSettings) -> Self {
        Self {
            registry: None,
            token: mio::Token(0),
            tls,
        }
    }

    pub fn with_registry(registry: mio::Registry, token: mio::Token, tls: TlsSettings) -> Self {
        Self {
            registry: Some(registry),
            token,
            tls,
        }
    }
}

impl Connector for MioConnector {
    type Socket = mio::net::TcpStream;

    fn open(&mut self, addr: SocketAddr) -> io::Result<Self::Socket> {
        let mut stream = mio::net::TcpStream::connect(addr)?;
        configure_host_socket(&stream);
        if let Some(registry) = &self.registry {
            registry.register(
                &mut stream,
                self.token,
                mio::Interest::READABLE | mio::Interest::WRITABLE,
            )?;
        }
        Ok(stream)
    }

    fn tls_session(&mut self, host: &str) -> TlsResult<Box<dyn TlsSession>> {
        let session = RustlsSession::new(host, &self.tls)?;
        Ok(Box::new(session))
    }

    /// The configured client key password, if any
    fn prompt_password(&mut self) -> Option<String> {
        self.tls.client_key_password.clone()
    }
}

/// A stream that replays `pending` before reading from `inner`.
///
/// Bytes received after `SB STARTTLS FOLLOWS` in the same read belong to the
/// TLS handshake and are fed back through this wrapper.
pub struct Prefixed<'a> {
    pending: &'a mut Vec<u8>,
    inner: &'a mut dyn ReadWrite,
}

impl<'a> Prefixed<'a> {
    pub fn new(pending: &'a mut Vec<u8>, inner: &'a mut dyn ReadWrite) -> Self {
        Self { pending, inner }
    }
}

impl Read for Prefixed<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return self.inner.read(buf);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for Prefixed<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
