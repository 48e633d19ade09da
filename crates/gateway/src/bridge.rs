//! The event bridge: inbound packets and state changes become JSON-RPC
//! notifications, fanned out to sessions by subscription, permission, and
//! per-session filter.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    metrics::counter,
    mudgate_link::LinkState,
    mudgate_packet::{Packet, PacketKind},
    mudgate_state::StateEvent,
    serde_json::json,
    tokio::sync::{broadcast, mpsc, watch},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{
    events::{Event, EventType},
    session::SessionManager,
    subscriptions::SubscriptionManager,
};

#[derive(Debug, Default)]
pub struct BridgeStats {
    pub packets_processed: AtomicU64,
    pub events_generated: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub events_dropped: AtomicU64,
}

pub struct EventBridge {
    sessions: Arc<SessionManager>,
    subscriptions: Arc<SubscriptionManager>,
    pub stats: BridgeStats,
}

impl EventBridge {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            sessions,
            subscriptions,
            stats: BridgeStats::default(),
        }
    }

    /// Pump loop: delivered packets, state transitions, and link state all
    /// converge here until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut packets: mpsc::Receiver<Packet>,
        mut state_events: broadcast::Receiver<StateEvent>,
        mut link_state: watch::Receiver<LinkState>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,

                packet = packets.recv() => {
                    match packet {
                        Some(packet) => {
                            self.stats.packets_processed.fetch_add(1, Ordering::Relaxed);
                            if let Some(event) = packet_to_event(&packet) {
                                self.stats.events_generated.fetch_add(1, Ordering::Relaxed);
                                self.dispatch(&event);
                            }
                        },
                        None => return,
                    }
                },

                state_event = state_events.recv() => {
                    match state_event {
                        Ok(state_event) => {
                            if let Some(event) = state_to_event(&state_event) {
                                self.stats.events_generated.fetch_add(1, Ordering::Relaxed);
                                self.dispatch(&event);
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "bridge: state event stream lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                },

                changed = link_state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if *link_state.borrow_and_update() == LinkState::Ready {
                        let event = Event::new(
                            EventType::GatewayReconnected,
                            json!({ "status": "connected" }),
                        );
                        self.stats.events_generated.fetch_add(1, Ordering::Relaxed);
                        self.dispatch(&event);
                    }
                },
            }
        }
    }

    /// Fan one event out. Candidates come from the subscription index for
    /// channel events and the whole session table otherwise; each candidate
    /// is then gated by capability and its filter.
    pub fn dispatch(&self, event: &Event) {
        let candidates = if event.event_type.is_channel_scoped() {
            let Some(channel) = event.channel() else { return };
            self.subscriptions
                .sessions_for_channel(channel)
                .into_iter()
                .filter_map(|id| self.sessions.get(&id))
                .collect()
        } else {
            self.sessions.all()
        };

        let notification = event.to_notification();
        for session in candidates {
            if let Some(capability) = event.event_type.required_capability()
                && !session.has_permission(capability)
            {
                continue;
            }
            let filtered = session
                .filter
                .lock()
                .map(|filter| !filter.matches(event, &session.mud_name))
                .unwrap_or(true);
            if filtered {
                continue;
            }

            let accepted = match event.ttl {
                Some(ttl) => session.enqueue(notification.clone(), event.priority, Some(ttl)),
                None => session.enqueue_durable(notification.clone(), event.priority),
            };
            if accepted {
                self.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
                if event.event_type.is_channel_scoped()
                    && let Some(channel) = event.channel()
                {
                    self.subscriptions.record_delivery(&session.id, channel);
                }
            } else {
                self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                counter!("bridge_events_dropped_total").increment(1);
            }
        }
        debug!(event = %event.event_type.method(), "bridge: event dispatched");
    }
}

/// One packet yields at most one primary event.
#[must_use]
pub fn packet_to_event(packet: &Packet) -> Option<Event> {
    match packet {
        Packet::Tell(tell) => {
            let event_type = if tell.kind == PacketKind::Emoteto {
                EventType::EmotetoReceived
            } else {
                EventType::TellReceived
            };
            Some(Event::new(
                event_type,
                json!({
                    "from_mud": tell.header.originator_mud,
                    "from_user": tell.header.originator_user,
                    "to_user": tell.header.target_user,
                    "visname": tell.visname,
                    "message": tell.message,
                }),
            ))
        },

        Packet::ChannelMessage(msg) => {
            let event_type = if msg.kind == PacketKind::ChannelE {
                EventType::ChannelEmote
            } else {
                EventType::ChannelMessage
            };
            Some(Event::new(
                event_type,
                json!({
                    "channel": msg.channel,
                    "from_mud": msg.header.originator_mud,
                    "from_user": msg.header.originator_user,
                    "visname": msg.visname,
                    "message": msg.message,
                }),
            ))
        },

        Packet::ChannelTarget(msg) => Some(Event::new(
            EventType::ChannelEmote,
            json!({
                "channel": msg.channel,
                "from_mud": msg.header.originator_mud,
                "from_user": msg.header.originator_user,
                "visname": msg.visname,
                "message": msg.message,
                "target_mud": msg.target_mud,
                "target_user": msg.target_user,
            }),
        )),

        Packet::ChannelMembership(m) => {
            let event_type = if m.kind == PacketKind::ChannelAdd {
                EventType::UserJoinedChannel
            } else {
                EventType::UserLeftChannel
            };
            Some(Event::new(
                event_type,
                json!({
                    "channel": m.channel,
                    "mud_name": m.header.originator_mud,
                    "user_name": m.header.originator_user,
                }),
            ))
        },

        Packet::Error(error) => Some(Event::new(
            EventType::ErrorOccurred,
            json!({
                "error_code": error.code,
                "error_message": error.message,
                "from_mud": error.header.originator_mud,
                "context": "i3_packet_error",
            }),
        )),

        _ => None,
    }
}

#[must_use]
pub fn state_to_event(state_event: &StateEvent) -> Option<Event> {
    match state_event {
        StateEvent::MudOnline { mud_name } => Some(Event::new(
            EventType::MudOnline,
            json!({ "mud_name": mud_name, "status": "online" }),
        )),
        StateEvent::MudOffline { mud_name } => Some(Event::new(
            EventType::MudOffline,
            json!({ "mud_name": mud_name, "status": "offline" }),
        )),
        // Channel table changes surface through channel_list, not as pushes.
        StateEvent::ChannelCreated { .. } | StateEvent::ChannelRemoved { .. } => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        mudgate_config::{RateLimitsConfig, SessionConfig},
        mudgate_packet::{ChannelMessagePacket, Header, TellPacket},
    };

    use {
        super::*,
        crate::{auth::Verified, session::Session},
    };

    fn setup() -> (Arc<SessionManager>, Arc<SubscriptionManager>, EventBridge) {
        let sessions = Arc::new(SessionManager::new(
            SessionConfig::default(),
            RateLimitsConfig::default(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new());
        let bridge = EventBridge::new(Arc::clone(&sessions), Arc::clone(&subscriptions));
        (sessions, subscriptions, bridge)
    }

    fn session_for(
        sessions: &SessionManager,
        mud_name: &str,
        permissions: &[&str],
    ) -> Arc<Session> {
        sessions.create(&Verified {
            mud_name: mud_name.into(),
            permissions: permissions.iter().map(|p| (*p).to_owned()).collect(),
            rate_limit_override: None,
        })
    }

    fn channel_packet(from_mud: &str) -> Packet {
        Packet::ChannelMessage(ChannelMessagePacket {
            kind: PacketKind::ChannelM,
            header: Header {
                ttl: 199,
                originator_mud: from_mud.into(),
                originator_user: "bob".into(),
                target_mud: "0".into(),
                target_user: "0".into(),
            },
            channel: "chat".into(),
            visname: "Bob".into(),
            message: "hello all".into(),
        })
    }

    #[test]
    fn test_channel_event_delivered_once_to_subscribers_only() {
        let (sessions, subscriptions, bridge) = setup();
        let subscribed = session_for(&sessions, "Alpha", &["channel"]);
        let not_subscribed = session_for(&sessions, "Alpha", &["channel"]);
        subscriptions.subscribe(&subscribed.id, "chat", false);

        let event = packet_to_event(&channel_packet("Beta")).unwrap();
        bridge.dispatch(&event);

        assert_eq!(subscribed.queue_len(), 1);
        assert_eq!(not_subscribed.queue_len(), 0);
        assert_eq!(bridge.stats.events_dispatched.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_exclude_self_suppresses_own_mud() {
        let (sessions, subscriptions, bridge) = setup();
        let same_mud = session_for(&sessions, "Beta", &["channel"]);
        subscriptions.subscribe(&same_mud.id, "chat", false);

        bridge.dispatch(&packet_to_event(&channel_packet("Beta")).unwrap());
        assert_eq!(same_mud.queue_len(), 0);
    }

    #[test]
    fn test_permission_gates_tell_events() {
        let (sessions, _, bridge) = setup();
        let with_tell = session_for(&sessions, "Alpha", &["tell"]);
        let info_only = session_for(&sessions, "Alpha", &["info"]);

        let packet = Packet::Tell(TellPacket {
            kind: PacketKind::Tell,
            header: Header::new("Beta", "bob", "Alpha", "alice"),
            visname: "Bob".into(),
            message: "hi".into(),
        });
        let event = packet_to_event(&packet).unwrap();
        assert_eq!(event.event_type, EventType::TellReceived);
        assert_eq!(event.priority, 3);
        bridge.dispatch(&event);

        assert_eq!(with_tell.queue_len(), 1);
        assert_eq!(info_only.queue_len(), 0);
    }

    #[test]
    fn test_error_packets_reach_every_session() {
        let (sessions, _, bridge) = setup();
        let info_only = session_for(&sessions, "Alpha", &["info"]);

        let packet = Packet::Error(mudgate_packet::ErrorPacket {
            header: Header::new("Gateway", "", "Alpha", "alice"),
            code: "unk-dst".into(),
            message: "Unknown destination MUD: Ghost".into(),
            bad_packet: vec![],
        });
        bridge.dispatch(&packet_to_event(&packet).unwrap());
        assert_eq!(info_only.queue_len(), 1);
    }

    #[test]
    fn test_notification_shape_for_channel_message() {
        let event = packet_to_event(&channel_packet("Beta")).unwrap();
        let text = event.to_notification();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["method"], "channel_message");
        assert_eq!(value["params"]["channel"], "chat");
        assert_eq!(value["params"]["from_mud"], "Beta");
        assert_eq!(value["params"]["from_user"], "bob");
        assert_eq!(value["params"]["visname"], "Bob");
        assert_eq!(value["params"]["message"], "hello all");
        assert!(value["params"]["timestamp"].is_string());
    }
}
