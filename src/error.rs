//! Error handling for the TN3270 network front end
//!
//! This module provides structured error types for every layer of a connection:
//! socket setup, proxy negotiation, TLS, TELNET and TN3270E. Errors that the core
//! recovers from internally (address retry, TN3270E fallback, malformed
//! sub-negotiations) never reach a caller; everything here is either a
//! configuration error or a failure that ends the current connection attempt.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Top-level error type for tn3270r operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Socket and connection lifecycle errors
    Network(NetworkError),
    /// TELNET layer errors
    Telnet(TelnetError),
    /// TN3270E negotiation and framing errors
    Tn3270e(Tn3270eError),
    /// Proxy specification and negotiation errors
    Proxy(ProxyError),
    /// TLS setup and handshake errors
    Tls(TlsError),
    /// Configuration errors
    Config(ConfigError),
}

/// Socket and connection lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection refused by remote host
    ConnectionRefused { address: String },
    /// Connect attempt did not complete in time
    Timeout { host: String, port: u16, timeout_seconds: u64 },
    /// Every resolved address failed
    AddressesExhausted { host: String, attempts: usize, last_error: String },
    /// The resolver produced no addresses
    NoAddresses { host: String },
    /// Connection lost during operation
    ConnectionLost { reason: String },
    /// Operation requires an established connection
    NotConnected,
    /// A connect was requested while another attempt is active
    AlreadyConnected { state: String },
}

/// TELNET layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetError {
    /// Malformed sub-negotiation data
    MalformedSubnegotiation { option: u8, data: Vec<u8> },
    /// Output was submitted in a mode that cannot carry it
    WrongMode { operation: String, state: String },
}

/// TN3270E negotiation and framing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tn3270eError {
    /// Host accepted functions we never offered
    IllegalFunctions { offered: Vec<u8>, received: Vec<u8> },
    /// Inbound record too short to carry a header
    ShortRecord { length: usize },
    /// Escaped header ended before five bytes were decoded
    TruncatedHeader { received: usize },
}

/// Proxy specification and negotiation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// Proxy type name not recognised
    UnknownType { name: String },
    /// Proxy specification could not be parsed
    InvalidSpec { spec: String, reason: String },
    /// Proxy type does not accept a username
    UsernameNotSupported { kind: String },
    /// Proxy type requires an explicit port
    PortRequired { kind: String },
    /// Local resolution of the target failed where it is mandatory
    ResolveFailed { kind: String, host: String },
    /// Proxy refused the request
    Rejected { kind: String, reason: String },
    /// Proxy reply could not be parsed
    MalformedReply { kind: String, detail: String },
    /// Socket failure during negotiation
    Io { kind: String, reason: String },
}

/// TLS setup and handshake errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsError {
    /// TLS context could not be created
    Setup { message: String },
    /// Handshake failed
    Handshake { message: String },
    /// Private key password was rejected after the one permitted retry
    PasswordRejected,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration parameter
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Missing required configuration
    MissingRequired { parameter: String },
    /// Configuration file error
    FileError { path: String, error: String },
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Network(err) => write!(f, "Network error: {err}"),
            NetError::Telnet(err) => write!(f, "Telnet error: {err}"),
            NetError::Tn3270e(err) => write!(f, "TN3270E error: {err}"),
            NetError::Proxy(err) => write!(f, "Proxy error: {err}"),
            NetError::Tls(err) => write!(f, "TLS error: {err}"),
            NetError::Config(err) => write!(f, "Configuration error: {err}"),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::ConnectionRefused { address } =>
                write!(f, "Connection refused by {address}"),
            NetworkError::Timeout { host, port, timeout_seconds } =>
                write!(f, "Connection timeout to {host}:{port} after {timeout_seconds}s"),
            NetworkError::AddressesExhausted { host, attempts, last_error } =>
                write!(f, "All {attempts} address(es) for {host} failed, last error: {last_error}"),
            NetworkError::NoAddresses { host } =>
                write!(f, "No addresses resolved for {host}"),
            NetworkError::ConnectionLost { reason } =>
                write!(f, "Connection lost: {reason}"),
            NetworkError::NotConnected =>
                write!(f, "Not connected"),
            NetworkError::AlreadyConnected { state } =>
                write!(f, "Connection attempt already active (state {state})"),
        }
    }
}

impl fmt::Display for TelnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetError::MalformedSubnegotiation { option, data } =>
                write!(f, "Malformed subnegotiation for option {option}: {data:02x?}"),
            TelnetError::WrongMode { operation, state } =>
                write!(f, "Cannot {operation} in state {state}"),
        }
    }
}

impl fmt::Display for Tn3270eError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tn3270eError::IllegalFunctions { offered, received } =>
                write!(f, "Host illegally added function(s): offered {offered:?}, host accepted {received:?}"),
            Tn3270eError::ShortRecord { length } =>
                write!(f, "Record of {length} bytes is shorter than a TN3270E header"),
            Tn3270eError::TruncatedHeader { received } =>
                write!(f, "Header truncated after {received} byte(s)"),
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::UnknownType { name } =>
                write!(f, "Unknown proxy type '{name}'"),
            ProxyError::InvalidSpec { spec, reason } =>
                write!(f, "Invalid proxy specification '{spec}': {reason}"),
            ProxyError::UsernameNotSupported { kind } =>
                write!(f, "Proxy type {kind} does not support a username"),
            ProxyError::PortRequired { kind } =>
                write!(f, "Proxy type {kind} requires a port"),
            ProxyError::ResolveFailed { kind, host } =>
                write!(f, "{kind} proxy: cannot resolve {host}"),
            ProxyError::Rejected { kind, reason } =>
                write!(f, "{kind} proxy: {reason}"),
            ProxyError::MalformedReply { kind, detail } =>
                write!(f, "{kind} proxy: malformed reply: {detail}"),
            ProxyError::Io { kind, reason } =>
                write!(f, "{kind} proxy: {reason}"),
        }
    }
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::Setup { message } => write!(f, "TLS setup failed: {message}"),
            TlsError::Handshake { message } => write!(f, "TLS handshake failed: {message}"),
            TlsError::PasswordRejected => write!(f, "Private key password rejected"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } =>
                write!(f, "Invalid configuration parameter '{parameter}' = '{value}': {reason}"),
            ConfigError::MissingRequired { parameter } =>
                write!(f, "Missing required configuration parameter: {parameter}"),
            ConfigError::FileError { path, error } =>
                write!(f, "Configuration file error '{path}': {error}"),
        }
    }
}

impl StdError for NetError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            NetError::Network(err) => Some(err),
            NetError::Telnet(err) => Some(err),
            NetError::Tn3270e(err) => Some(err),
            NetError::Proxy(err) => Some(err),
            NetError::Tls(err) => Some(err),
            NetError::Config(err) => Some(err),
        }
    }
}

impl StdError for NetworkError {}
impl StdError for TelnetError {}
impl StdError for Tn3270eError {}
impl StdError for ProxyError {}
impl StdError for TlsError {}
impl StdError for ConfigError {}

impl From<NetworkError> for NetError {
    fn from(err: NetworkError) -> Self {
        NetError::Network(err)
    }
}

impl From<TelnetError> for NetError {
    fn from(err: TelnetError) -> Self {
        NetError::Telnet(err)
    }
}

impl From<Tn3270eError> for NetError {
    fn from(err: Tn3270eError) -> Self {
        NetError::Tn3270e(err)
    }
}

impl From<ProxyError> for NetError {
    fn from(err: ProxyError) -> Self {
        NetError::Proxy(err)
    }
}

impl From<TlsError> for NetError {
    fn from(err: TlsError) -> Self {
        NetError::Tls(err)
    }
}

impl From<ConfigError> for NetError {
    fn from(err: ConfigError) -> Self {
        NetError::Config(err)
    }
}

// Convert from standard IO errors
impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::Network(NetworkError::ConnectionRefused {
                address: "unknown".to_string(),
            }),
            _ => NetError::Network(NetworkError::ConnectionLost {
                reason: format!("IO Error: {err}"),
            }),
        }
    }
}

/// Result type alias for tn3270r operations
pub type NetResult<T> = Result<T, NetError>;

/// Specialized result types for different components
pub type NetworkResult<T> = Result<T, NetworkError>;
pub type TelnetResult<T> = Result<T, TelnetError>;
pub type Tn3270eResult<T> = Result<T, Tn3270eError>;
pub type ProxyResult<T> = Result<T, ProxyError>;
pub type TlsResult<T> = Result<T, TlsError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
