//! Client-facing half of the gateway: JSON-RPC 2.0 over WebSocket and
//! line-delimited TCP, sessions with credentials and permissions, priority
//! queues, channel subscriptions, and the event bridge that turns inbound
//! network packets into notifications.

pub mod auth;
pub mod bridge;
pub mod client;
pub mod events;
pub mod methods;
pub mod queue;
pub mod rpc;
pub mod server;
pub mod session;
pub mod state;
pub mod subscriptions;
pub mod tcp;
pub mod ws;

pub use {
    server::Gateway,
    state::GatewayCore,
};
