//! Connection lifecycle state and the notifications derived from it

use std::fmt;

/// Lifecycle of one connection.
///
/// `Resolving` through `TelnetPending` are the half-connected phases; every
/// `Connected*` state means TELNET has started and says which interpretation of
/// the data stream is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NotConnected,
    Resolving,
    TcpPending,
    TlsPending,
    ProxyPending,
    TelnetPending,
    /// NVT, line mode
    ConnectedNvt,
    /// NVT, character mode
    ConnectedNvtChar,
    /// Plain TN3270 (BINARY + EOR + TTYPE)
    Connected3270,
    /// TN3270E agreed, not yet negotiated or no BIND received
    ConnectedUnbound,
    /// TN3270E, NVT submode
    ConnectedEnvt,
    /// TN3270E, SSCP-LU submode
    ConnectedSscp,
    /// TN3270E, 3270 submode
    ConnectedTn3270e,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "not-connected",
            ConnectionState::Resolving => "resolving",
            ConnectionState::TcpPending => "tcp-pending",
            ConnectionState::TlsPending => "tls-pending",
            ConnectionState::ProxyPending => "proxy-pending",
            ConnectionState::TelnetPending => "telnet-pending",
            ConnectionState::ConnectedNvt => "connected-nvt",
            ConnectionState::ConnectedNvtChar => "connected-nvt-charmode",
            ConnectionState::Connected3270 => "connected-3270",
            ConnectionState::ConnectedUnbound => "connected-unbound",
            ConnectionState::ConnectedEnvt => "connected-e-nvt",
            ConnectionState::ConnectedSscp => "connected-sscp",
            ConnectionState::ConnectedTn3270e => "connected-tn3270e",
        }
    }

    /// True once the socket is up and TELNET processing has begun.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::TelnetPending
                | ConnectionState::ConnectedNvt
                | ConnectionState::ConnectedNvtChar
                | ConnectionState::Connected3270
                | ConnectionState::ConnectedUnbound
                | ConnectionState::ConnectedEnvt
                | ConnectionState::ConnectedSscp
                | ConnectionState::ConnectedTn3270e
        )
    }

    /// True while a connect attempt is in progress but TELNET has not started.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionState::Resolving
                | ConnectionState::TcpPending
                | ConnectionState::TlsPending
                | ConnectionState::ProxyPending
        )
    }

    /// 3270 block-mode data is flowing.
    pub fn in_3270(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected3270
                | ConnectionState::ConnectedTn3270e
                | ConnectionState::ConnectedSscp
        )
    }

    pub fn in_nvt(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectedNvt
                | ConnectionState::ConnectedNvtChar
                | ConnectionState::ConnectedEnvt
        )
    }

    pub fn in_tn3270e(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectedUnbound
                | ConnectionState::ConnectedEnvt
                | ConnectionState::ConnectedSscp
                | ConnectionState::ConnectedTn3270e
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State-change notifications delivered to [`ConnectionListener`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// TELNET processing started (`true`) or the connection ended (`false`)
    Connected(bool),
    /// Entered or left 3270 mode
    Mode3270(bool),
    /// TLS became active or the secure connection ended
    Secure(bool),
    /// NVT line mode switched on or off
    LineMode(bool),
    /// Any lifecycle transition
    StateChanged { from: ConnectionState, to: ConnectionState },
}

/// Receives connection notifications
pub trait ConnectionListener {
    fn on_connection_event(&mut self, event: &ConnectionEvent);
}
