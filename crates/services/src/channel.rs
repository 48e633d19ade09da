//! Local side of the channel service: history, membership, rosters.

use {
    chrono::Utc,
    metrics::counter,
    mudgate_packet::{Packet, PacketKind},
    mudgate_state::{HistoryEntry, HistoryKind, StateStore},
    tracing::debug,
};

use crate::ServiceOutcome;

/// Inbound channel traffic. Messages append to the channel's history before
/// fan-out; unknown channels bounce `unk-channel`.
pub fn handle(mud_name: &str, state: &StateStore, packet: &Packet) -> ServiceOutcome {
    match packet {
        Packet::ChannelMessage(msg) => {
            if !state.has_channel(&msg.channel) {
                return unknown_channel(mud_name, packet, &msg.channel);
            }
            let kind = if msg.kind == PacketKind::ChannelE {
                HistoryKind::Emote
            } else {
                HistoryKind::Message
            };
            state.history_append(
                &msg.channel,
                HistoryEntry {
                    kind,
                    origin_mud: msg.header.originator_mud.clone(),
                    origin_user: msg.header.originator_user.clone(),
                    visname: msg.visname.clone(),
                    body: msg.message.clone(),
                    timestamp: Utc::now(),
                    target_mud: None,
                    target_user: None,
                },
            );
            counter!("channel_messages_total").increment(1);
            ServiceOutcome::deliver()
        },
        Packet::ChannelTarget(msg) => {
            if !state.has_channel(&msg.channel) {
                return unknown_channel(mud_name, packet, &msg.channel);
            }
            state.history_append(
                &msg.channel,
                HistoryEntry {
                    kind: HistoryKind::TargetedEmote,
                    origin_mud: msg.header.originator_mud.clone(),
                    origin_user: msg.header.originator_user.clone(),
                    visname: msg.visname.clone(),
                    body: msg.message.clone(),
                    timestamp: Utc::now(),
                    target_mud: Some(msg.target_mud.clone()),
                    target_user: Some(msg.target_user.clone()),
                },
            );
            counter!("channel_messages_total").increment(1);
            ServiceOutcome::deliver()
        },
        Packet::ChannelMembership(m) => {
            // channel-add / channel-remove carry mud-level membership.
            match m.kind {
                PacketKind::ChannelAdd => {
                    state.channel_add_member(&m.channel, &m.header.originator_mud);
                },
                _ => {
                    state.channel_remove_member(&m.channel, &m.header.originator_mud);
                },
            }
            ServiceOutcome::deliver()
        },
        Packet::ChannelListen(listen) => {
            if listen.joining {
                state.channel_add_member(&listen.channel, &listen.header.originator_mud);
            } else {
                state.channel_remove_member(&listen.channel, &listen.header.originator_mud);
            }
            ServiceOutcome::ignore()
        },
        Packet::ChannelWho(who) if who.users.is_empty() => {
            // A roster request. The gateway hosts no interactive users of its
            // own; the authoritative roster lives with the channel owner, so
            // answer with the mud-level membership we track.
            let members = state
                .get_channel(&who.channel)
                .map(|c| c.member_muds)
                .unwrap_or_default();
            debug!(channel = %who.channel, "channel: roster request");
            ServiceOutcome::reply(who.make_reply(mud_name, members))
        },
        Packet::ChannelWho(_) | Packet::ChannelAdmin(_) | Packet::ChannelFilter(_) => {
            ServiceOutcome::ignore()
        },
        _ => ServiceOutcome::ignore(),
    }
}

fn unknown_channel(mud_name: &str, packet: &Packet, channel: &str) -> ServiceOutcome {
    counter!("channel_unknown_total").increment(1);
    ServiceOutcome::reply(packet.error_reply(
        mud_name,
        "unk-channel",
        format!("Unknown channel: {channel}"),
    ))
}
