//! The routing decision: TTL policy, broadcast vs. local vs. remote.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    metrics::counter,
    mudgate_common::is_broadcast,
    mudgate_packet::{Packet, PacketKind},
    mudgate_state::{MudStatus, StateStore},
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use crate::{ServiceOutcome, channel, control, error::RouteError, info, tell};

#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub routed_local: AtomicU64,
    pub routed_remote: AtomicU64,
    pub routed_broadcast: AtomicU64,
    pub dropped_ttl: AtomicU64,
    pub dropped: AtomicU64,
    pub errors_synthesized: AtomicU64,
}

impl DispatcherStats {
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "routed_local": self.routed_local.load(Ordering::Relaxed),
            "routed_remote": self.routed_remote.load(Ordering::Relaxed),
            "routed_broadcast": self.routed_broadcast.load(Ordering::Relaxed),
            "dropped_ttl": self.dropped_ttl.load(Ordering::Relaxed),
            "dropped": self.dropped.load(Ordering::Relaxed),
            "errors_synthesized": self.errors_synthesized.load(Ordering::Relaxed),
        })
    }
}

/// Routes every packet. Holds one-way senders toward the router link and the
/// event bridge; never a reference back to either.
pub struct Dispatcher {
    mud_name: String,
    hide_ip: bool,
    state: Arc<StateStore>,
    to_router: mpsc::Sender<Packet>,
    to_bridge: mpsc::Sender<Packet>,
    pub stats: DispatcherStats,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        mud_name: String,
        hide_ip: bool,
        state: Arc<StateStore>,
        to_router: mpsc::Sender<Packet>,
        to_bridge: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            mud_name,
            hide_ip,
            state,
            to_router,
            to_bridge,
            stats: DispatcherStats::default(),
        }
    }

    /// One packet received from the router. TTL is spent on arrival: expired
    /// packets drop silently, everything else loses one hop before routing.
    pub async fn dispatch_inbound(&self, mut packet: Packet) {
        if packet.ttl() == 0 {
            self.stats.dropped_ttl.fetch_add(1, Ordering::Relaxed);
            counter!("packets_dropped_ttl").increment(1);
            debug!(kind = %packet.kind(), "dispatcher: dropped expired packet");
            return;
        }
        packet.header_mut().ttl -= 1;

        let target = packet.header().target_mud.clone();
        if is_broadcast(&target) || target == self.mud_name {
            if is_broadcast(&target) {
                self.stats.routed_broadcast.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.routed_local.fetch_add(1, Ordering::Relaxed);
            }
            self.deliver_local(packet).await;
        } else {
            // Addressed to some other mud: behave like a forwarding hop.
            self.forward_remote(packet).await;
        }
    }

    /// A locally-originated packet on its way to the network. Origination is
    /// not a hop, so TTL is left untouched; destination checks still apply.
    /// On routing failure an `error` packet is surfaced to the bridge and the
    /// error returned so the caller can fail its RPC.
    pub async fn route_outbound(&self, packet: Packet) -> Result<(), RouteError> {
        let target = packet.header().target_mud.clone();

        if is_broadcast(&target) {
            self.stats.routed_broadcast.fetch_add(1, Ordering::Relaxed);
            let local_copy = matches!(
                packet.kind(),
                PacketKind::ChannelM | PacketKind::ChannelE | PacketKind::ChannelT
            )
            .then(|| packet.clone());
            self.to_router
                .send(packet)
                .await
                .map_err(|_| RouteError::LinkDown)?;
            // Channel broadcasts also reach our own subscribers.
            if let Some(copy) = local_copy {
                self.deliver_local(copy).await;
            }
            return Ok(());
        }

        if target == self.mud_name {
            self.stats.routed_local.fetch_add(1, Ordering::Relaxed);
            self.deliver_local(packet).await;
            return Ok(());
        }

        match self.check_destination(&target) {
            Ok(()) => {
                self.stats.routed_remote.fetch_add(1, Ordering::Relaxed);
                self.to_router
                    .send(packet)
                    .await
                    .map_err(|_| RouteError::LinkDown)
            },
            Err(route_error) => {
                warn!(target = %target, error = %route_error, "dispatcher: undeliverable");
                self.stats.errors_synthesized.fetch_add(1, Ordering::Relaxed);
                let error_packet = packet.error_reply(
                    &self.mud_name,
                    route_error.code(),
                    route_error.to_string(),
                );
                // The originator is a local client; surface as a client event.
                let _ = self.to_bridge.send(error_packet).await;
                Err(route_error)
            },
        }
    }

    /// Addressed to some other mud: behave like a forwarding hop. Mirrors
    /// the remote branch of `route_outbound`, minus the TTL decrement
    /// (already applied by the caller in `dispatch_inbound`).
    async fn forward_remote(&self, packet: Packet) {
        let target = packet.header().target_mud.clone();
        match self.check_destination(&target) {
            Ok(()) => {
                self.stats.routed_remote.fetch_add(1, Ordering::Relaxed);
                if self.to_router.send(packet).await.is_err() {
                    warn!("dispatcher: forward dropped, link down");
                }
            },
            Err(route_error) => {
                warn!(target = %target, error = %route_error, "dispatcher: undeliverable");
                self.stats.errors_synthesized.fetch_add(1, Ordering::Relaxed);
                let error_packet = packet.error_reply(
                    &self.mud_name,
                    route_error.code(),
                    route_error.to_string(),
                );
                let _ = self.to_bridge.send(error_packet).await;
            },
        }
    }

    fn check_destination(&self, target: &str) -> Result<(), RouteError> {
        match self.state.get_mud(target) {
            None => Err(RouteError::UnknownDestination(target.to_owned())),
            Some(entry) if entry.status != MudStatus::Online => {
                Err(RouteError::DestinationOffline(target.to_owned()))
            },
            Some(_) => Ok(()),
        }
    }

    /// Run the per-kind service handler, transmit its reply, and pass the
    /// packet on to the event bridge when the handler accepted it.
    async fn deliver_local(&self, packet: Packet) {
        let outcome = self.run_service(&packet);

        if let Some(reply) = outcome.reply {
            if matches!(reply.kind(), PacketKind::Error) {
                self.stats.errors_synthesized.fetch_add(1, Ordering::Relaxed);
            }
            if self.to_router.send(reply).await.is_err() {
                warn!("dispatcher: reply dropped, link down");
            }
        }

        if outcome.deliver && self.to_bridge.send(packet).await.is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn run_service(&self, packet: &Packet) -> ServiceOutcome {
        match packet.kind() {
            PacketKind::Tell | PacketKind::Emoteto => {
                tell::handle(&self.mud_name, &self.state, packet)
            },
            PacketKind::ChannelM
            | PacketKind::ChannelE
            | PacketKind::ChannelT
            | PacketKind::ChannelAdd
            | PacketKind::ChannelRemove
            | PacketKind::ChannelAdmin
            | PacketKind::ChannelFilter
            | PacketKind::ChannelWho
            | PacketKind::ChannelListen => channel::handle(&self.mud_name, &self.state, packet),
            PacketKind::WhoReq
            | PacketKind::WhoReply
            | PacketKind::FingerReq
            | PacketKind::FingerReply
            | PacketKind::LocateReq
            | PacketKind::LocateReply => {
                info::handle(&self.mud_name, self.hide_ip, &self.state, packet)
            },
            _ => control::handle(&self.mud_name, &self.state, packet),
        }
    }
}
