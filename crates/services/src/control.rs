//! Router-control packets: list diffs, startup replies, shutdowns, errors,
//! mud auth, and the unserved OOB family.

use {
    mudgate_packet::{AuthMudPacket, Packet, PacketKind},
    mudgate_state::StateStore,
    tracing::{info, warn},
};

use crate::ServiceOutcome;

pub fn handle(mud_name: &str, state: &StateStore, packet: &Packet) -> ServiceOutcome {
    match packet {
        Packet::Mudlist(list) => {
            state.update_mudlist(&list.entries, list.mudlist_id);
            ServiceOutcome::ignore()
        },

        Packet::ChanlistReply(list) => {
            state.update_chanlist(&list.channels, list.chanlist_id);
            ServiceOutcome::ignore()
        },

        // The link layer already treats this as handshake completion.
        Packet::StartupReply(reply) => {
            info!(router = %reply.header.originator_mud, "control: startup acknowledged");
            ServiceOutcome::ignore()
        },

        Packet::Shutdown(down) => {
            info!(
                mud = %down.header.originator_mud,
                restart_delay = down.restart_delay,
                "control: mud announced shutdown"
            );
            state.mark_mud_offline(&down.header.originator_mud);
            ServiceOutcome::ignore()
        },

        // Surfaced to clients as error_occurred.
        Packet::Error(error) => {
            warn!(code = %error.code, message = %error.message, "control: error packet");
            ServiceOutcome::deliver()
        },

        Packet::AuthMud(auth) if auth.kind == PacketKind::AuthMudReq => {
            // Echo the key back; the gateway does not negotiate OOB sessions.
            ServiceOutcome::reply(Packet::AuthMud(AuthMudPacket {
                kind: PacketKind::AuthMudReply,
                header: auth.header.reply_from(mud_name, ""),
                auth_key: auth.auth_key,
            }))
        },
        Packet::AuthMud(_) => ServiceOutcome::ignore(),

        // OOB services are advertised off; anything that still arrives gets
        // not-imp.
        _ if packet.kind().is_oob() => ServiceOutcome::reply(packet.error_reply(
            mud_name,
            "not-imp",
            format!("service {} is not implemented", packet.kind()),
        )),

        Packet::Startup(_) => {
            // Only routers receive startup requests; a mud sending us one is
            // confused.
            ServiceOutcome::reply(packet.error_reply(mud_name, "not-imp", "not a router"))
        },

        _ => ServiceOutcome::ignore(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use mudgate_packet::{Header, MailAckPacket, MudlistPacket};
    use mudgate_state::MudStatus;

    use super::*;

    #[test]
    fn test_mudlist_updates_state() {
        let state = StateStore::new(10);
        let packet = Packet::Mudlist(MudlistPacket {
            header: Header::new("*i3", "", "Alpha", ""),
            mudlist_id: 3,
            entries: vec![("Beta".into(), None)],
        });
        let outcome = handle("Alpha", &state, &packet);
        assert!(!outcome.deliver);
        assert_eq!(state.mudlist_id(), 3);
    }

    #[test]
    fn test_shutdown_marks_offline() {
        let state = StateStore::new(10);
        state.update_mudlist(
            &[(
                "Beta".into(),
                Some(mudgate_packet::MudInfo {
                    state: -1,
                    host: "h".into(),
                    player_port: 0,
                    tcp_port: 0,
                    udp_port: 0,
                    mudlib: String::new(),
                    base_mudlib: String::new(),
                    driver: String::new(),
                    mud_type: String::new(),
                    open_status: String::new(),
                    admin_email: String::new(),
                    services: vec![],
                    other_data: mudgate_wire::ValueMap::new(),
                }),
            )],
            1,
        );
        let packet = Packet::Shutdown(mudgate_packet::ShutdownPacket {
            header: Header::new("Beta", "", "Alpha", ""),
            restart_delay: 0,
        });
        handle("Alpha", &state, &packet);
        assert_eq!(state.get_mud("Beta").unwrap().status, MudStatus::Offline);
    }

    #[test]
    fn test_oob_gets_not_imp() {
        let state = StateStore::new(10);
        let packet = Packet::MailAck(MailAckPacket {
            header: Header::new("Beta", "bob", "Alpha", "alice"),
            message_id: 1,
        });
        let outcome = handle("Alpha", &state, &packet);
        let Some(Packet::Error(error)) = outcome.reply else {
            panic!("expected error reply");
        };
        assert_eq!(error.code, "not-imp");
    }

    #[test]
    fn test_error_packet_is_delivered_to_bridge() {
        let state = StateStore::new(10);
        let packet = Packet::Error(mudgate_packet::ErrorPacket {
            header: Header::new("*i3", "", "Alpha", ""),
            code: "unk-dst".into(),
            message: "no such mud".into(),
            bad_packet: vec![],
        });
        assert!(handle("Alpha", &state, &packet).deliver);
    }
}
