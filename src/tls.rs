//! TLS for host connections
//!
//! The connection manager only sees the [`TlsSession`] trait: a handshake that
//! can be resumed whenever the socket is readable, plus plaintext read/write.
//! [`RustlsSession`] is the implementation used with real sockets.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use once_cell::sync::Lazy;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
    ServerName,
};
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::error::{TlsError, TlsResult};
use crate::socket::ReadWrite;

/// Result of one handshake step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsOutcome {
    /// Handshake complete
    Ok,
    /// Waiting for bytes from the host
    WantMore,
    Failed(TlsError),
    /// A private key password is needed; supply one and negotiate again
    NeedPassword,
}

/// Handshake object and record layer for one connection
pub trait TlsSession {
    /// Drive the handshake as far as the socket allows.
    fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> TlsOutcome;

    /// Read decrypted data. `WouldBlock` means nothing is available yet and
    /// `Ok(0)` means the host closed the session.
    fn read(&mut self, socket: &mut dyn ReadWrite, buf: &mut [u8]) -> io::Result<usize>;

    /// Encrypt and send `data`. Records the socket cannot take yet stay queued
    /// until the next [`TlsSession::flush`].
    fn write(&mut self, socket: &mut dyn ReadWrite, data: &[u8]) -> io::Result<usize>;

    fn flush(&mut self, socket: &mut dyn ReadWrite) -> io::Result<()>;

    /// Plaintext already decrypted but not yet returned by `read`
    fn has_buffered_plaintext(&self) -> bool;

    fn close(&mut self, socket: &mut dyn ReadWrite);

    /// Provide the private key password requested by `NeedPassword`.
    /// Returns false if the session has no use for it.
    fn supply_password(&mut self, _password: &str) -> bool {
        false
    }

    /// Short description of the negotiated session, for logs
    fn description(&self) -> String {
        String::from("TLS")
    }
}

/// TLS options from the session configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Extra trusted roots (PEM)
    pub ca_bundle_path: Option<PathBuf>,
    /// Name to verify in the host certificate instead of the host name
    pub verify_host_name: Option<String>,
    /// Client certificate chain (PEM), leaf first
    pub client_cert_path: Option<PathBuf>,
    /// Private key for the client certificate (PEM, PKCS#8, PKCS#1 or SEC1).
    /// An `ENCRYPTED PRIVATE KEY` is unlocked with a password during the
    /// handshake.
    pub client_key_path: Option<PathBuf>,
    /// Password for an encrypted client key, handed out when the handshake
    /// asks for one
    pub client_key_password: Option<String>,
}

/// Web PKI roots plus the platform's native roots, loaded once per process
static BASE_ROOTS: Lazy<RootCertStore> = Lazy::new(|| {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            log::debug!("Loaded {added} native root certificates ({ignored} ignored)");
        }
        Err(e) => log::warn!("Cannot load native root certificates: {e}"),
    }
    roots
});

fn setup_error(message: impl Into<String>) -> TlsError {
    TlsError::Setup {
        message: message.into(),
    }
}

/// Every `-----BEGIN <label>-----` block in `text` with its decoded body
fn pem_blocks(text: &str) -> TlsResult<Vec<(String, Vec<u8>)>> {
    const BEGIN: &str = "-----BEGIN ";
    const DASHES: &str = "-----";

    let mut blocks = Vec::new();
    let mut start = 0;
    while let Some(b) = text[start..].find(BEGIN) {
        let label_start = start + b + BEGIN.len();
        let Some(l) = text[label_start..].find(DASHES) else {
            return Err(setup_error("unterminated PEM header"));
        };
        let label = &text[label_start..label_start + l];
        let body_start = label_start + l + DASHES.len();
        let end = format!("-----END {label}-----");
        let Some(e) = text[body_start..].find(&end) else {
            return Err(setup_error(format!("unterminated {label} in PEM file")));
        };
        let body_end = body_start + e;
        let b64: String = text[body_start..body_end]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| setup_error(format!("bad base64 in {label}: {e}")))?;
        blocks.push((label.to_string(), der));
        start = body_end + end.len();
    }
    Ok(blocks)
}

/// Parse every certificate in a PEM bundle
pub fn parse_pem_bundle(text: &str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> = pem_blocks(text)?
        .into_iter()
        .filter(|(label, _)| label == "CERTIFICATE")
        .map(|(_, der)| CertificateDer::from(der))
        .collect();
    if certs.is_empty() {
        return Err(setup_error("no certificates found in PEM bundle"));
    }
    Ok(certs)
}

/// A client private key as found in its PEM file
#[derive(Debug)]
pub enum ClientKey {
    Plain(PrivateKeyDer<'static>),
    /// DER of a PKCS#8 `EncryptedPrivateKeyInfo`
    Encrypted(Vec<u8>),
}

/// Find the first private key in a PEM file
pub fn parse_private_key(text: &str) -> TlsResult<ClientKey> {
    if text.contains("Proc-Type: 4,ENCRYPTED") {
        return Err(setup_error(
            "legacy encrypted PEM keys are not supported, convert the key to PKCS#8",
        ));
    }
    for (label, der) in pem_blocks(text)? {
        let key = match label.as_str() {
            "PRIVATE KEY" => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)),
            "RSA PRIVATE KEY" => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der)),
            "EC PRIVATE KEY" => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der)),
            "ENCRYPTED PRIVATE KEY" => return Ok(ClientKey::Encrypted(der)),
            _ => continue,
        };
        return Ok(ClientKey::Plain(key));
    }
    Err(setup_error("no private key found in PEM file"))
}

/// Decrypt a PKCS#8 `EncryptedPrivateKeyInfo` (PBES2)
pub fn decrypt_private_key(encrypted: &[u8], password: &str) -> TlsResult<PrivateKeyDer<'static>> {
    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(encrypted)
        .map_err(|e| setup_error(format!("malformed encrypted private key: {e}")))?;
    let document = info
        .decrypt(password)
        .map_err(|e| setup_error(format!("cannot decrypt private key: {e}")))?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        document.as_bytes().to_vec(),
    )))
}

fn read_pem_file(path: &Path, what: &str) -> TlsResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| setup_error(format!("cannot read {what} {}: {e}", path.display())))
}

fn load_ca_bundle(path: &Path, roots: &mut RootCertStore) -> TlsResult<usize> {
    let certs = parse_pem_bundle(&read_pem_file(path, "CA bundle")?)?;
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(setup_error(format!("no usable certificates in {}", path.display())));
    }
    if ignored > 0 {
        log::warn!("Ignored {ignored} unusable certificate(s) in {}", path.display());
    }
    Ok(added)
}

fn client_auth_config(
    roots: RootCertStore,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> TlsResult<ClientConfig> {
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|e| setup_error(format!("unusable client certificate: {e}")))
}

fn open_connection(config: ClientConfig, server_name: ServerName<'static>) -> TlsResult<ClientConnection> {
    ClientConnection::new(Arc::new(config), server_name).map_err(|e| setup_error(e.to_string()))
}

/// Everything needed to start the handshake once the client key is decrypted
struct LockedClientKey {
    roots: RootCertStore,
    chain: Vec<CertificateDer<'static>>,
    encrypted: Vec<u8>,
    server_name: ServerName<'static>,
}

impl LockedClientKey {
    fn unlock(&self, password: &str) -> TlsResult<ClientConnection> {
        let key = decrypt_private_key(&self.encrypted, password)?;
        let config = client_auth_config(self.roots.clone(), self.chain.clone(), key)?;
        open_connection(config, self.server_name.clone())
    }
}

fn write_pending(conn: &mut ClientConnection, socket: &mut dyn ReadWrite) -> io::Result<()> {
    let mut io = &mut *socket;
    while conn.wants_write() {
        conn.write_tls(&mut io)?;
    }
    Ok(())
}

/// rustls-backed [`TlsSession`]. With an encrypted client key the
/// connection only exists after [`TlsSession::supply_password`].
pub struct RustlsSession {
    conn: Option<ClientConnection>,
    locked: Option<LockedClientKey>,
    buffered: usize,
}

impl RustlsSession {
    pub fn new(host: &str, settings: &TlsSettings) -> TlsResult<Self> {
        let mut roots = BASE_ROOTS.clone();
        if let Some(path) = &settings.ca_bundle_path {
            let added = load_ca_bundle(path, &mut roots)?;
            log::info!("Added {added} trusted CA certificate(s) from {}", path.display());
        }

        let name = settings.verify_host_name.as_deref().unwrap_or(host).to_string();
        let server_name = ServerName::try_from(name.clone())
            .map_err(|e| setup_error(format!("invalid server name '{name}': {e}")))?;

        let (cert_path, key_path) = match (&settings.client_cert_path, &settings.client_key_path) {
            (None, None) => {
                let config = ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                return Ok(Self::ready(open_connection(config, server_name)?));
            }
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(setup_error(
                    "a client certificate needs both a certificate and a key file",
                ))
            }
        };

        let chain = parse_pem_bundle(&read_pem_file(cert_path, "client certificate")?)?;
        log::info!(
            "Using client certificate {} ({} in chain)",
            cert_path.display(),
            chain.len()
        );
        match parse_private_key(&read_pem_file(key_path, "client key")?)? {
            ClientKey::Plain(key) => {
                let config = client_auth_config(roots, chain, key)?;
                Ok(Self::ready(open_connection(config, server_name)?))
            }
            ClientKey::Encrypted(encrypted) => {
                log::debug!("Client key {} is encrypted", key_path.display());
                Ok(Self {
                    conn: None,
                    locked: Some(LockedClientKey {
                        roots,
                        chain,
                        encrypted,
                        server_name,
                    }),
                    buffered: 0,
                })
            }
        }
    }

    fn ready(conn: ClientConnection) -> Self {
        Self {
            conn: Some(conn),
            locked: None,
            buffered: 0,
        }
    }

    /// The client key is still waiting for its password
    pub fn is_locked(&self) -> bool {
        self.conn.is_none()
    }

    fn connection(&mut self) -> io::Result<&mut ClientConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "client key is locked"))
    }
}

impl TlsSession for RustlsSession {
    fn negotiate(&mut self, socket: &mut dyn ReadWrite) -> TlsOutcome {
        let Some(conn) = self.conn.as_mut() else {
            return TlsOutcome::NeedPassword;
        };
        loop {
            match write_pending(conn, socket) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return TlsOutcome::WantMore,
                Err(e) => {
                    return TlsOutcome::Failed(TlsError::Handshake {
                        message: e.to_string(),
                    })
                }
            }
            if !conn.is_handshaking() {
                return TlsOutcome::Ok;
            }
            if !conn.wants_read() {
                return TlsOutcome::WantMore;
            }
            match conn.read_tls(&mut &mut *socket) {
                Ok(0) => {
                    return TlsOutcome::Failed(TlsError::Handshake {
                        message: "host closed the connection during the handshake".to_string(),
                    })
                }
                Ok(_) => match conn.process_new_packets() {
                    Ok(state) => self.buffered = state.plaintext_bytes_to_read(),
                    Err(e) => {
                        // Let the host see the alert
                        let _ = write_pending(conn, socket);
                        return TlsOutcome::Failed(TlsError::Handshake {
                            message: e.to_string(),
                        });
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return TlsOutcome::WantMore,
                Err(e) => {
                    return TlsOutcome::Failed(TlsError::Handshake {
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    fn read(&mut self, socket: &mut dyn ReadWrite, buf: &mut [u8]) -> io::Result<usize> {
        let conn = self.connection()?;
        let mut buffered = None;
        let result = loop {
            match conn.reader().read(buf) {
                Ok(n) => break Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => break Err(e),
            }
            if conn.read_tls(&mut &mut *socket)? == 0 {
                break Ok(0);
            }
            let state = conn
                .process_new_packets()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            buffered = Some(state.plaintext_bytes_to_read());
            match write_pending(conn, socket) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => break Err(e),
            }
        };
        if let Some(n) = buffered {
            self.buffered = n;
        }
        if let Ok(n) = result {
            self.buffered = self.buffered.saturating_sub(n);
        }
        result
    }

    fn write(&mut self, socket: &mut dyn ReadWrite, data: &[u8]) -> io::Result<usize> {
        let conn = self.connection()?;
        conn.writer().write_all(data)?;
        match write_pending(conn, socket) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        Ok(data.len())
    }

    fn flush(&mut self, socket: &mut dyn ReadWrite) -> io::Result<()> {
        match self.conn.as_mut() {
            Some(conn) => write_pending(conn, socket),
            None => Ok(()),
        }
    }

    fn has_buffered_plaintext(&self) -> bool {
        self.buffered > 0
    }

    fn close(&mut self, socket: &mut dyn ReadWrite) {
        if let Some(conn) = self.conn.as_mut() {
            conn.send_close_notify();
            let _ = write_pending(conn, socket);
        }
    }

    fn supply_password(&mut self, password: &str) -> bool {
        let Some(locked) = self.locked.take() else {
            return false;
        };
        match locked.unlock(password) {
            Ok(conn) => {
                log::info!("Client key unlocked");
                self.conn = Some(conn);
                true
            }
            Err(e) => {
                log::warn!("{e}");
                self.locked = Some(locked);
                false
            }
        }
    }

    fn description(&self) -> String {
        let Some(conn) = self.conn.as_ref() else {
            return String::from("TLS (client key locked)");
        };
        match (conn.protocol_version(), conn.negotiated_cipher_suite()) {
            (Some(version), Some(suite)) => format!("{version:?} {:?}", suite.suite()),
            _ => String::from("TLS (handshake incomplete)"),
        }
    }
}
