/// Lifecycle of a [`NetConnection`](crate::NetConnection).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    /// Connect requests are being sent
    Connecting,
    Connected,
    /// Either side sent a disconnect
    Disconnected,
    /// The peer went silent, or never answered the connect request
    TimedOut,
    ConnectRejected,
}

impl ConnectionState {
    /// Whether the connection is finished and can be removed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::TimedOut | ConnectionState::ConnectRejected
        )
    }
}

/// Lifecycle changes surfaced to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    /// The peer refused our connect request
    ConnectionRejected { reason: String },
    Disconnected { reason: String },
    /// No traffic from an established peer within the ping budget
    TimedOut,
    /// No answer to any of our connect requests
    ConnectTimedOut,
}
