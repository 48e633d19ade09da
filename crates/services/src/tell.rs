//! Local side of the tell/emoteto service.

use {
    chrono::Utc,
    mudgate_packet::Packet,
    mudgate_state::StateStore,
    tracing::debug,
};

use crate::ServiceOutcome;

/// An inbound `tell`/`emoteto` addressed to a local user: deliver when the
/// user is online here, bounce `unk-user` otherwise.
pub fn handle(mud_name: &str, state: &StateStore, packet: &Packet) -> ServiceOutcome {
    let Packet::Tell(tell) = packet else {
        return ServiceOutcome::ignore();
    };

    let target = &tell.header.target_user;
    match state.session_get(target) {
        Some(session) if session.is_online => {
            state.session_upsert(mud_name, target, |s| s.last_activity = Utc::now());
            debug!(user = %target, kind = %tell.kind, "tell: delivering to local user");
            ServiceOutcome::deliver()
        },
        _ => {
            debug!(user = %target, "tell: target unknown or offline");
            ServiceOutcome::reply(packet.error_reply(
                mud_name,
                "unk-user",
                format!("Unknown user: {target}"),
            ))
        },
    }
}
