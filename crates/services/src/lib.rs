//! Packet routing and the local service handlers.
//!
//! The dispatcher sees every inbound packet from the router and every
//! locally-originated packet before transmission, applies the TTL policy,
//! and splits traffic three ways: local service handlers, the router link,
//! or a synthesized `error` reply. Per-kind handlers implement the local
//! side of the tell/channel/who/finger/locate services.
//!
//! Collaborators arrive as one-way capability handles: a packet sender
//! toward the router link and one toward the event bridge. No handler holds
//! a reference back to the gateway.

pub mod channel;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod info;
pub mod tell;

pub use {
    dispatcher::{Dispatcher, DispatcherStats},
    error::RouteError,
};

/// What a local handler decided about one inbound packet.
#[derive(Debug, Default)]
pub struct ServiceOutcome {
    /// A packet to transmit back toward the network.
    pub reply: Option<mudgate_packet::Packet>,
    /// Whether the packet should reach the event bridge (and therefore
    /// client sessions).
    pub deliver: bool,
}

impl ServiceOutcome {
    #[must_use]
    pub fn deliver() -> Self {
        Self {
            reply: None,
            deliver: true,
        }
    }

    #[must_use]
    pub fn reply(packet: mudgate_packet::Packet) -> Self {
        Self {
            reply: Some(packet),
            deliver: false,
        }
    }

    #[must_use]
    pub fn ignore() -> Self {
        Self::default()
    }
}
