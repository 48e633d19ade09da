//! Router connection manager.
//!
//! One outbound TCP connection at a time to one of the configured router
//! candidates, with the startup handshake, keep-alive, dead-peer detection,
//! and reconnection with exponential backoff and round-robin failover.
//!
//! The link owns the socket. Other components transmit through the
//! [`LinkHandle`]'s send channel and observe state through its `watch`
//! receiver; nothing outside this crate touches the stream.

pub mod backoff;
pub mod connection;
pub mod error;

pub use {
    connection::{LinkCommand, LinkConfig, LinkHandle, LinkStats, RouterCandidate, StartupProvider, spawn},
    error::LinkError,
};

/// Connection lifecycle. `Ready` means the handshake completed (a
/// `startup-reply` or a `mudlist` arrived).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Closing,
}

impl LinkState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }
}
