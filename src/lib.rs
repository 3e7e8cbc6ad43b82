//! TN3270 network front end
//!
//! Connects to an IBM mainframe host (optionally through a proxy and/or TLS),
//! negotiates TELNET and TN3270E, and frames the 3270 data stream. Screen
//! handling stays outside the crate, behind [`sink::HostDataSink`].

/// Error types for every layer
pub mod error;

/// Session configuration and validation
pub mod config;

/// Timestamped hex dumps of network traffic
pub mod trace;

/// EBCDIC decoding for names carried in BIND images
pub mod ebcdic;

/// Connection lifecycle state and notifications
pub mod state;

/// Consumer of de-framed host data
pub mod sink;

/// TELNET option negotiation
pub mod telnet;

/// TN3270E negotiation, BIND decoding and record framing
pub mod tn3270e;

/// Proxy handshakes (passthru, HTTP, TELNET, SOCKS4/4A, SOCKS5/5D)
pub mod proxy;

/// TLS sessions
pub mod tls;

/// Socket and connector abstractions
pub mod socket;

/// Socket options
pub mod network_platform;

/// Connection manager
pub mod network;

pub use config::{NetSettings, SessionConfig, TerminalModel};
pub use error::{NetError, NetResult};
pub use network::{Connection, Progress};
pub use sink::{DecodeOutcome, HostDataSink, NullSink};
pub use state::{ConnectionEvent, ConnectionListener, ConnectionState};
