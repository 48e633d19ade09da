//! Typed packet model for the legacy inter-mud protocol.
//!
//! Every packet is a positional sequence on the wire: kind tag, TTL, the
//! four-part addressing header, then a kind-specific payload. This crate owns
//! the mapping in both directions plus per-kind validation and reply
//! construction. The wire representation itself lives in `mudgate-wire`.

pub mod convert;
pub mod error;
pub mod header;
pub mod kind;
pub mod records;

pub use {error::PacketError, header::Header, kind::PacketKind, records::*};

/// A decoded, validated protocol packet. Kinds with identical layouts share a
/// record (`tell`/`emoteto`, `channel-m`/`channel-e`, the membership and
/// auth pairs); the record's `kind` field disambiguates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Tell(TellPacket),
    ChannelMessage(ChannelMessagePacket),
    ChannelTarget(ChannelTargetPacket),
    ChannelMembership(ChannelMembershipPacket),
    ChannelAdmin(ChannelAdminPacket),
    ChannelFilter(ChannelFilterPacket),
    ChannelWho(ChannelWhoPacket),
    ChannelListen(ChannelListenPacket),
    ChanlistReply(ChanlistReplyPacket),
    WhoReq(WhoReqPacket),
    WhoReply(WhoReplyPacket),
    FingerReq(FingerReqPacket),
    FingerReply(FingerReplyPacket),
    LocateReq(LocateReqPacket),
    LocateReply(LocateReplyPacket),
    Startup(StartupPacket),
    StartupReply(StartupReplyPacket),
    Shutdown(ShutdownPacket),
    Mudlist(MudlistPacket),
    Error(ErrorPacket),
    AuthMud(AuthMudPacket),
    OobReq(OobReqPacket),
    OobBegin(OobBeginPacket),
    Mail(MailPacket),
    MailAck(MailAckPacket),
    News(NewsPacket),
    NewsReadReq(NewsReadReqPacket),
    File(FilePacket),
}

impl Packet {
    #[must_use]
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Tell(p) => p.kind,
            Self::ChannelMessage(p) => p.kind,
            Self::ChannelTarget(_) => PacketKind::ChannelT,
            Self::ChannelMembership(p) => p.kind,
            Self::ChannelAdmin(_) => PacketKind::ChannelAdmin,
            Self::ChannelFilter(_) => PacketKind::ChannelFilter,
            Self::ChannelWho(_) => PacketKind::ChannelWho,
            Self::ChannelListen(_) => PacketKind::ChannelListen,
            Self::ChanlistReply(_) => PacketKind::ChanlistReply,
            Self::WhoReq(_) => PacketKind::WhoReq,
            Self::WhoReply(_) => PacketKind::WhoReply,
            Self::FingerReq(_) => PacketKind::FingerReq,
            Self::FingerReply(_) => PacketKind::FingerReply,
            Self::LocateReq(_) => PacketKind::LocateReq,
            Self::LocateReply(_) => PacketKind::LocateReply,
            Self::Startup(_) => PacketKind::StartupReq3,
            Self::StartupReply(_) => PacketKind::StartupReply,
            Self::Shutdown(_) => PacketKind::Shutdown,
            Self::Mudlist(_) => PacketKind::Mudlist,
            Self::Error(_) => PacketKind::Error,
            Self::AuthMud(p) => p.kind,
            Self::OobReq(_) => PacketKind::OobReq,
            Self::OobBegin(_) => PacketKind::OobBegin,
            Self::Mail(_) => PacketKind::Mail,
            Self::MailAck(_) => PacketKind::MailAck,
            Self::News(_) => PacketKind::News,
            Self::NewsReadReq(_) => PacketKind::NewsReadReq,
            Self::File(_) => PacketKind::File,
        }
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        match self {
            Self::Tell(p) => &p.header,
            Self::ChannelMessage(p) => &p.header,
            Self::ChannelTarget(p) => &p.header,
            Self::ChannelMembership(p) => &p.header,
            Self::ChannelAdmin(p) => &p.header,
            Self::ChannelFilter(p) => &p.header,
            Self::ChannelWho(p) => &p.header,
            Self::ChannelListen(p) => &p.header,
            Self::ChanlistReply(p) => &p.header,
            Self::WhoReq(p) => &p.header,
            Self::WhoReply(p) => &p.header,
            Self::FingerReq(p) => &p.header,
            Self::FingerReply(p) => &p.header,
            Self::LocateReq(p) => &p.header,
            Self::LocateReply(p) => &p.header,
            Self::Startup(p) => &p.header,
            Self::StartupReply(p) => &p.header,
            Self::Shutdown(p) => &p.header,
            Self::Mudlist(p) => &p.header,
            Self::Error(p) => &p.header,
            Self::AuthMud(p) => &p.header,
            Self::OobReq(p) => &p.header,
            Self::OobBegin(p) => &p.header,
            Self::Mail(p) => &p.header,
            Self::MailAck(p) => &p.header,
            Self::News(p) => &p.header,
            Self::NewsReadReq(p) => &p.header,
            Self::File(p) => &p.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut Header {
        match self {
            Self::Tell(p) => &mut p.header,
            Self::ChannelMessage(p) => &mut p.header,
            Self::ChannelTarget(p) => &mut p.header,
            Self::ChannelMembership(p) => &mut p.header,
            Self::ChannelAdmin(p) => &mut p.header,
            Self::ChannelFilter(p) => &mut p.header,
            Self::ChannelWho(p) => &mut p.header,
            Self::ChannelListen(p) => &mut p.header,
            Self::ChanlistReply(p) => &mut p.header,
            Self::WhoReq(p) => &mut p.header,
            Self::WhoReply(p) => &mut p.header,
            Self::FingerReq(p) => &mut p.header,
            Self::FingerReply(p) => &mut p.header,
            Self::LocateReq(p) => &mut p.header,
            Self::LocateReply(p) => &mut p.header,
            Self::Startup(p) => &mut p.header,
            Self::StartupReply(p) => &mut p.header,
            Self::Shutdown(p) => &mut p.header,
            Self::Mudlist(p) => &mut p.header,
            Self::Error(p) => &mut p.header,
            Self::AuthMud(p) => &mut p.header,
            Self::OobReq(p) => &mut p.header,
            Self::OobBegin(p) => &mut p.header,
            Self::Mail(p) => &mut p.header,
            Self::MailAck(p) => &mut p.header,
            Self::News(p) => &mut p.header,
            Self::NewsReadReq(p) => &mut p.header,
            Self::File(p) => &mut p.header,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.header().ttl
    }

    /// Kind-specific validation. Decoded packets are validated on the way in;
    /// locally-built packets validate before transmission.
    pub fn validate(&self) -> Result<(), PacketError> {
        if self.header().ttl > 200 {
            return Err(PacketError::InvalidTtl(i32::from(self.header().ttl)));
        }
        match self {
            Self::Tell(p) => p.validate(),
            Self::ChannelMessage(p) => p.validate(),
            Self::ChannelTarget(p) => p.validate(),
            Self::ChannelMembership(p) => p.validate(),
            Self::ChannelAdmin(p) => p.validate(),
            Self::ChannelFilter(p) => p.validate(),
            Self::ChannelWho(p) => p.validate(),
            Self::ChannelListen(p) => p.validate(),
            Self::FingerReq(p) => p.validate(),
            Self::LocateReq(p) => p.validate(),
            Self::LocateReply(p) => p.validate(),
            Self::Startup(p) => p.validate(),
            Self::Error(p) => p.validate(),
            Self::News(p) => p.validate(),
            Self::NewsReadReq(p) => p.validate(),
            Self::File(p) => p.validate(),
            _ => Ok(()),
        }
    }

    /// Synthesize an `error` packet addressed back at this packet's
    /// originator, originating from `from_mud`.
    #[must_use]
    pub fn error_reply(
        &self,
        from_mud: &str,
        code: &str,
        message: impl Into<String>,
    ) -> Packet {
        Packet::Error(ErrorPacket {
            header: self.header().reply_from(from_mud, ""),
            code: code.to_owned(),
            message: message.into(),
            bad_packet: self.to_values(),
        })
    }
}

impl WhoReqPacket {
    /// Reply carrying a snapshot of the local who roster.
    #[must_use]
    pub fn make_reply(&self, mud: &str, users: Vec<WhoUser>) -> Packet {
        Packet::WhoReply(WhoReplyPacket {
            header: self.header.reply_from(mud, ""),
            users,
        })
    }
}

impl FingerReqPacket {
    #[must_use]
    pub fn make_reply(&self, mud: &str, info: FingerInfo) -> Packet {
        Packet::FingerReply(FingerReplyPacket {
            header: self.header.reply_from(mud, ""),
            info,
        })
    }
}

impl LocateReqPacket {
    /// Reply sent only when the user is online here.
    #[must_use]
    pub fn make_reply(
        &self,
        mud: &str,
        located_user: &str,
        idle_seconds: i32,
        status: &str,
    ) -> Packet {
        Packet::LocateReply(LocateReplyPacket {
            header: self.header.reply_from(mud, ""),
            located_mud: mud.to_owned(),
            located_user: located_user.to_owned(),
            idle_seconds,
            status: status.to_owned(),
        })
    }
}

impl ChannelWhoPacket {
    #[must_use]
    pub fn make_reply(&self, mud: &str, users: Vec<String>) -> Packet {
        Packet::ChannelWho(ChannelWhoPacket {
            header: self.header.reply_from(mud, ""),
            channel: self.channel.clone(),
            users,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        mudgate_wire::{Value, ValueMap},
        rstest::rstest,
    };

    use super::*;

    fn header() -> Header {
        Header::new("Alpha", "alice", "Beta", "bob")
    }

    fn tell() -> Packet {
        Packet::Tell(TellPacket {
            kind: PacketKind::Tell,
            header: header(),
            visname: "alice".into(),
            message: "hi".into(),
        })
    }

    fn startup() -> Packet {
        Packet::Startup(StartupPacket {
            header: Header::new("Alpha", "", "*i3", ""),
            password: 0,
            old_mudlist_id: 0,
            old_chanlist_id: 0,
            player_port: 4000,
            tcp_port: 4001,
            udp_port: 0,
            mudlib: "CustomLib".into(),
            base_mudlib: "LPMud".into(),
            driver: "FluffOS".into(),
            mud_type: "LP".into(),
            open_status: "open".into(),
            admin_email: "admin@alpha.example".into(),
            services: vec![("tell".into(), 1), ("channel".into(), 1)],
            other_data: ValueMap::new(),
        })
    }

    fn mudlist() -> Packet {
        Packet::Mudlist(MudlistPacket {
            header: Header::new("*i3", "", "Alpha", ""),
            mudlist_id: 42,
            entries: vec![
                (
                    "Beta".into(),
                    Some(MudInfo {
                        state: -1,
                        host: "beta.example".into(),
                        player_port: 5000,
                        tcp_port: 5001,
                        udp_port: 0,
                        mudlib: "BetaLib".into(),
                        base_mudlib: "LPMud".into(),
                        driver: "FluffOS".into(),
                        mud_type: "LP".into(),
                        open_status: "open".into(),
                        admin_email: "admin@beta.example".into(),
                        services: vec![("tell".into(), 1)],
                        other_data: ValueMap::new(),
                    }),
                ),
                ("Ghost".into(), None),
            ],
        })
    }

    fn sample(kind: PacketKind) -> Packet {
        let h = header;
        match kind {
            PacketKind::Tell => tell(),
            PacketKind::Emoteto => Packet::Tell(TellPacket {
                kind,
                header: h(),
                visname: "Alice".into(),
                message: "waves".into(),
            }),
            PacketKind::ChannelM | PacketKind::ChannelE => {
                Packet::ChannelMessage(ChannelMessagePacket {
                    kind,
                    header: h(),
                    channel: "chat".into(),
                    visname: "Alice".into(),
                    message: "hello all".into(),
                })
            },
            PacketKind::ChannelT => Packet::ChannelTarget(ChannelTargetPacket {
                header: h(),
                channel: "chat".into(),
                visname: "Alice".into(),
                target_mud: "Beta".into(),
                target_user: "bob".into(),
                message: "pokes $N".into(),
            }),
            PacketKind::ChannelAdd | PacketKind::ChannelRemove => {
                Packet::ChannelMembership(ChannelMembershipPacket {
                    kind,
                    header: h(),
                    channel: "chat".into(),
                })
            },
            PacketKind::ChannelAdmin => Packet::ChannelAdmin(ChannelAdminPacket {
                header: h(),
                channel: "chat".into(),
                members: vec![("Beta".into(), 1)],
            }),
            PacketKind::ChannelFilter => Packet::ChannelFilter(ChannelFilterPacket {
                header: h(),
                channel: "chat".into(),
                packet: tell().to_values(),
            }),
            PacketKind::ChannelWho => Packet::ChannelWho(ChannelWhoPacket {
                header: h(),
                channel: "chat".into(),
                users: vec!["alice".into(), "bob".into()],
            }),
            PacketKind::ChannelListen => Packet::ChannelListen(ChannelListenPacket {
                header: h(),
                channel: "chat".into(),
                joining: true,
            }),
            PacketKind::ChanlistReply => Packet::ChanlistReply(ChanlistReplyPacket {
                header: h(),
                chanlist_id: 9,
                channels: vec![
                    (
                        "chat".into(),
                        Some(ChanInfo {
                            owner_mud: "Hub".into(),
                            channel_type: 0,
                        }),
                    ),
                    ("dead".into(), None),
                ],
            }),
            PacketKind::WhoReq => {
                let mut filter = ValueMap::new();
                filter.insert("level_min", 10);
                Packet::WhoReq(WhoReqPacket { header: h(), filter })
            },
            PacketKind::WhoReply => Packet::WhoReply(WhoReplyPacket {
                header: h(),
                users: vec![WhoUser {
                    name: "alice".into(),
                    idle_seconds: 12,
                    level: 30,
                    extra: "the Swift".into(),
                }],
            }),
            PacketKind::FingerReq => Packet::FingerReq(FingerReqPacket {
                header: h(),
                username: "bob".into(),
            }),
            PacketKind::FingerReply => Packet::FingerReply(FingerReplyPacket {
                header: h(),
                info: FingerInfo {
                    visname: "Bob".into(),
                    title: "the Bold".into(),
                    real_name: String::new(),
                    email: "bob@beta.example".into(),
                    login_time: "2026-07-01T10:00:00Z".into(),
                    idle_seconds: 300,
                    ip_addr: String::new(),
                    level: 50,
                    extra: String::new(),
                },
            }),
            PacketKind::LocateReq => Packet::LocateReq(LocateReqPacket {
                header: h(),
                username: "bob".into(),
            }),
            PacketKind::LocateReply => Packet::LocateReply(LocateReplyPacket {
                header: h(),
                located_mud: "Beta".into(),
                located_user: "bob".into(),
                idle_seconds: 0,
                status: "online".into(),
            }),
            PacketKind::StartupReq3 => startup(),
            PacketKind::StartupReply => Packet::StartupReply(StartupReplyPacket {
                header: h(),
                router_list: vec![("*i3".into(), "198.51.100.4 8080".into())],
                password: 12345,
            }),
            PacketKind::Shutdown => Packet::Shutdown(ShutdownPacket {
                header: h(),
                restart_delay: 300,
            }),
            PacketKind::Mudlist => mudlist(),
            PacketKind::Error => Packet::Error(ErrorPacket {
                header: h(),
                code: "unk-dst".into(),
                message: "Unknown destination MUD: Ghost".into(),
                bad_packet: tell().to_values(),
            }),
            PacketKind::AuthMudReq | PacketKind::AuthMudReply => {
                Packet::AuthMud(AuthMudPacket {
                    kind,
                    header: h(),
                    auth_key: 987,
                })
            },
            PacketKind::OobReq => Packet::OobReq(OobReqPacket { header: h() }),
            PacketKind::OobBegin => Packet::OobBegin(OobBeginPacket {
                header: h(),
                auth_user: "alice".into(),
                auth_key: 11,
            }),
            PacketKind::Mail => Packet::Mail(MailPacket {
                header: h(),
                message_id: 7,
                sender_visname: "Alice".into(),
                to: vec!["bob".into()],
                subject: "greetings".into(),
                body: "long time".into(),
            }),
            PacketKind::MailAck => Packet::MailAck(MailAckPacket {
                header: h(),
                message_id: 7,
            }),
            PacketKind::News => Packet::News(NewsPacket {
                header: h(),
                group: "inter.admin".into(),
                subject: "downtime".into(),
                body: "Sunday 02:00".into(),
            }),
            PacketKind::NewsReadReq => Packet::NewsReadReq(NewsReadReqPacket {
                header: h(),
                group: "inter.admin".into(),
                article_id: 3,
            }),
            PacketKind::File => Packet::File(FilePacket {
                header: h(),
                filename: "motd.txt".into(),
                contents: "welcome".into(),
            }),
        }
    }

    #[test]
    fn test_roundtrip_every_kind() {
        for kind in PacketKind::ALL {
            let packet = sample(*kind);
            assert_eq!(packet.kind(), *kind);
            let values = packet.to_values();
            let back = Packet::from_values(&values)
                .unwrap_or_else(|e| panic!("{kind}: {e}"));
            assert_eq!(back, packet, "{kind} did not round-trip");
        }
    }

    #[test]
    fn test_tell_is_exactly_eight_positions() {
        let values = tell().to_values();
        assert_eq!(values.len(), 8);
        assert_eq!(
            values,
            vec![
                Value::Str("tell".into()),
                Value::Int(200),
                Value::Str("Alpha".into()),
                Value::Str("alice".into()),
                Value::Str("Beta".into()),
                Value::Str("bob".into()),
                Value::Str("alice".into()),
                Value::Str("hi".into()),
            ]
        );
    }

    #[test]
    fn test_tell_rejects_seven_field_form() {
        let mut values = tell().to_values();
        values.pop();
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::FieldCount { .. })
        ));
    }

    #[test]
    fn test_startup_is_exactly_twenty_positions() {
        assert_eq!(startup().to_values().len(), 20);
    }

    #[test]
    fn test_startup_rejects_legacy_eighteen_field_form() {
        let mut values = startup().to_values();
        // The old form lacked old_mudlist_id / old_chanlist_id.
        values.remove(8);
        values.remove(7);
        assert_eq!(values.len(), 18);
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::FieldCount { .. })
        ));
    }

    #[test]
    fn test_broadcast_integer_addressing_coerces() {
        // Routers address channel broadcasts with integer 0 in the target
        // slots.
        let values = vec![
            Value::Str("channel-m".into()),
            Value::Int(199),
            Value::Str("Beta".into()),
            Value::Str("bob".into()),
            Value::Int(0),
            Value::Int(0),
            Value::Str("chat".into()),
            Value::Str("Bob".into()),
            Value::Str("hello all".into()),
        ];
        let packet = Packet::from_values(&values).unwrap();
        let Packet::ChannelMessage(p) = &packet else {
            panic!("wrong variant");
        };
        assert_eq!(p.header.target_mud, "0");
        assert_eq!(p.header.ttl, 199);
        assert_eq!(p.channel, "chat");
        assert_eq!(p.visname, "Bob");
        assert_eq!(p.message, "hello all");
    }

    #[test]
    fn test_tell_visname_defaults_to_originator() {
        let values = vec![
            Value::Str("tell".into()),
            Value::Int(200),
            Value::Str("Alpha".into()),
            Value::Str("alice".into()),
            Value::Str("Beta".into()),
            Value::Str("bob".into()),
            Value::Null,
            Value::Str("hi".into()),
        ];
        let Packet::Tell(p) = Packet::from_values(&values).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(p.visname, "alice");
    }

    #[test]
    fn test_tell_requires_message() {
        let mut values = tell().to_values();
        values[7] = Value::Str(String::new());
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::MissingField { field: "message", .. })
        ));
    }

    #[test]
    fn test_ttl_out_of_range_rejected() {
        let mut values = tell().to_values();
        values[1] = Value::Int(201);
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::InvalidTtl(201))
        ));
        values[1] = Value::Int(-1);
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::InvalidTtl(-1))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut values = tell().to_values();
        values[0] = Value::Str("chanlist-req".into());
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_who_reply_requires_collection() {
        let values = vec![
            Value::Str("who-reply".into()),
            Value::Int(200),
            Value::Str("Beta".into()),
            Value::Str(String::new()),
            Value::Str("Alpha".into()),
            Value::Str("alice".into()),
            Value::Null,
        ];
        assert!(matches!(
            Packet::from_values(&values),
            Err(PacketError::MissingField { field: "who_data", .. })
        ));
    }

    #[rstest]
    #[case(Value::Str("1".into()), true)]
    #[case(Value::Str("0".into()), false)]
    #[case(Value::Int(1), true)]
    #[case(Value::Int(0), false)]
    fn test_channel_listen_flag_forms(#[case] flag: Value, #[case] joining: bool) {
        let values = vec![
            Value::Str("channel-listen".into()),
            Value::Int(200),
            Value::Str("Alpha".into()),
            Value::Str(String::new()),
            Value::Str("*i3".into()),
            Value::Str(String::new()),
            Value::Str("chat".into()),
            flag,
        ];
        let Packet::ChannelListen(p) = Packet::from_values(&values).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(p.joining, joining);
        // Output form is always the string.
        assert_eq!(
            Packet::ChannelListen(p).to_values()[7],
            Value::Str(if joining { "1" } else { "0" }.into())
        );
    }

    #[test]
    fn test_error_reply_addresses_originator() {
        let reply = tell().error_reply("Gateway", "unk-dst", "Unknown destination MUD: Beta");
        let Packet::Error(e) = &reply else {
            panic!("wrong variant");
        };
        assert_eq!(e.header.originator_mud, "Gateway");
        assert_eq!(e.header.target_mud, "Alpha");
        assert_eq!(e.header.target_user, "alice");
        assert_eq!(e.code, "unk-dst");
        assert_eq!(e.bad_packet.len(), 8);
        reply.validate().unwrap();
    }

    #[test]
    fn test_mudlist_tombstone_roundtrip() {
        let values = mudlist().to_values();
        let Packet::Mudlist(p) = Packet::from_values(&values).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(p.entries.len(), 2);
        assert!(p.entries[0].1.is_some());
        assert!(p.entries[1].1.is_none());
    }
}
