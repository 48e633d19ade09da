//! Positional mapping between packets and wire value trees.
//!
//! Position 0 is the kind tag, 1 the TTL, 2–5 the addressing header, 6+ the
//! kind-specific payload. Field counts are load-bearing for some kinds:
//! `tell`/`emoteto` are exactly 8 positions and `startup-req-3` exactly 20;
//! nothing may be silently appended or dropped.

use mudgate_wire::{Value, ValueMap};

use crate::{
    Packet,
    error::PacketError,
    header::Header,
    kind::PacketKind,
    records::*,
};

// ── Lenient readers ──────────────────────────────────────────────────────────
//
// Routers put integer 0 or null where strings are absent and vice versa;
// established peers coerce rather than reject. Presence of *required*
// collections is still enforced per kind below.

fn str_at(values: &[Value], idx: usize) -> String {
    values.get(idx).map(Value::coerce_string).unwrap_or_default()
}

fn int_at(values: &[Value], idx: usize) -> i32 {
    values.get(idx).map(Value::coerce_int).unwrap_or_default()
}

fn map_at(values: &[Value], idx: usize) -> ValueMap {
    values
        .get(idx)
        .and_then(Value::as_map)
        .cloned()
        .unwrap_or_default()
}

fn list_at(values: &[Value], idx: usize) -> Vec<Value> {
    values
        .get(idx)
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default()
}

fn require_list<'a>(
    values: &'a [Value],
    idx: usize,
    kind: PacketKind,
    field: &'static str,
) -> Result<&'a [Value], PacketError> {
    values
        .get(idx)
        .and_then(Value::as_list)
        .ok_or(PacketError::MissingField { kind, field })
}

fn require_map<'a>(
    values: &'a [Value],
    idx: usize,
    kind: PacketKind,
    field: &'static str,
) -> Result<&'a ValueMap, PacketError> {
    values
        .get(idx)
        .and_then(Value::as_map)
        .ok_or(PacketError::MissingField { kind, field })
}

fn int_pairs(map: &ValueMap) -> Vec<(String, i32)> {
    map.iter().map(|(k, v)| (k.to_owned(), v.coerce_int())).collect()
}

fn pairs_to_map(pairs: &[(String, i32)]) -> Value {
    Value::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::Int(*v)))
            .collect(),
    )
}

fn string_list(values: &[Value]) -> Vec<String> {
    values.iter().map(Value::coerce_string).collect()
}

fn exact(kind: PacketKind, values: &[Value], n: usize) -> Result<(), PacketError> {
    if values.len() != n {
        return Err(PacketError::FieldCount {
            kind,
            expected: expected_label(n),
            got: values.len(),
        });
    }
    Ok(())
}

fn at_least(kind: PacketKind, values: &[Value], n: usize) -> Result<(), PacketError> {
    if values.len() < n {
        return Err(PacketError::FieldCount {
            kind,
            expected: expected_label(n),
            got: values.len(),
        });
    }
    Ok(())
}

fn expected_label(n: usize) -> &'static str {
    // Arities are fixed per kind; keep the message allocation-free.
    match n {
        6 => "6",
        7 => "7",
        8 => "8",
        9 => "9",
        10 => "10",
        11 => "11",
        15 => "15",
        20 => "20",
        _ => "?",
    }
}

fn header_from(values: &[Value]) -> Result<Header, PacketError> {
    let ttl = int_at(values, 1);
    if !(0..=200).contains(&ttl) {
        return Err(PacketError::InvalidTtl(ttl));
    }
    let ttl = u8::try_from(ttl).map_err(|_| PacketError::InvalidTtl(ttl))?;
    Ok(Header {
        ttl,
        originator_mud: str_at(values, 2),
        originator_user: str_at(values, 3),
        target_mud: str_at(values, 4),
        target_user: str_at(values, 5),
    })
}

fn header_values(kind: PacketKind, header: &Header) -> Vec<Value> {
    vec![
        Value::Str(kind.as_str().to_owned()),
        Value::Int(i32::from(header.ttl)),
        Value::Str(header.originator_mud.clone()),
        Value::Str(header.originator_user.clone()),
        Value::Str(header.target_mud.clone()),
        Value::Str(header.target_user.clone()),
    ]
}

// ── Decode ───────────────────────────────────────────────────────────────────

impl Packet {
    /// Build a packet from a decoded top-level wire value.
    pub fn from_value(value: &Value) -> Result<Self, PacketError> {
        let values = value.as_list().ok_or(PacketError::NotASequence)?;
        Self::from_values(values)
    }

    /// Build a packet from the positional sequence, validating arity, field
    /// types, and kind-specific content.
    pub fn from_values(values: &[Value]) -> Result<Self, PacketError> {
        if values.len() < 6 {
            return Err(PacketError::FieldCount {
                kind: PacketKind::Error,
                expected: "6",
                got: values.len(),
            });
        }
        let tag = str_at(values, 0);
        let kind =
            PacketKind::from_tag(&tag).ok_or_else(|| PacketError::UnknownKind(tag.clone()))?;
        let header = header_from(values)?;

        let packet = match kind {
            PacketKind::Tell | PacketKind::Emoteto => {
                exact(kind, values, 8)?;
                let mut visname = str_at(values, 6);
                if visname.is_empty() {
                    visname = header.originator_user.clone();
                }
                Self::Tell(TellPacket {
                    kind,
                    header,
                    visname,
                    message: str_at(values, 7),
                })
            },
            PacketKind::ChannelM | PacketKind::ChannelE => {
                at_least(kind, values, 9)?;
                let mut visname = str_at(values, 7);
                if visname.is_empty() {
                    visname = header.originator_user.clone();
                }
                Self::ChannelMessage(ChannelMessagePacket {
                    kind,
                    header,
                    channel: str_at(values, 6),
                    visname,
                    message: str_at(values, 8),
                })
            },
            PacketKind::ChannelT => {
                at_least(kind, values, 11)?;
                Self::ChannelTarget(ChannelTargetPacket {
                    header,
                    channel: str_at(values, 6),
                    visname: str_at(values, 7),
                    target_mud: str_at(values, 8),
                    target_user: str_at(values, 9),
                    message: str_at(values, 10),
                })
            },
            PacketKind::ChannelAdd | PacketKind::ChannelRemove => {
                at_least(kind, values, 7)?;
                Self::ChannelMembership(ChannelMembershipPacket {
                    kind,
                    header,
                    channel: str_at(values, 6),
                })
            },
            PacketKind::ChannelAdmin => {
                at_least(kind, values, 8)?;
                Self::ChannelAdmin(ChannelAdminPacket {
                    header,
                    channel: str_at(values, 6),
                    members: int_pairs(&map_at(values, 7)),
                })
            },
            PacketKind::ChannelFilter => {
                at_least(kind, values, 8)?;
                Self::ChannelFilter(ChannelFilterPacket {
                    header,
                    channel: str_at(values, 6),
                    packet: list_at(values, 7),
                })
            },
            PacketKind::ChannelWho => {
                at_least(kind, values, 7)?;
                Self::ChannelWho(ChannelWhoPacket {
                    header,
                    channel: str_at(values, 6),
                    users: string_list(&list_at(values, 7)),
                })
            },
            PacketKind::ChannelListen => {
                at_least(kind, values, 8)?;
                // The flag is the string "1"/"0" on the wire, but some
                // routers send a bare integer. Accept both.
                let joining = match &values[7] {
                    Value::Int(n) => *n != 0,
                    other => other.coerce_string() == "1",
                };
                Self::ChannelListen(ChannelListenPacket {
                    header,
                    channel: str_at(values, 6),
                    joining,
                })
            },
            PacketKind::ChanlistReply => {
                at_least(kind, values, 8)?;
                let map = require_map(values, 7, kind, "channels")?;
                let channels = map
                    .iter()
                    .map(|(name, value)| (name.to_owned(), chan_info_from(value)))
                    .collect();
                Self::ChanlistReply(ChanlistReplyPacket {
                    header,
                    chanlist_id: int_at(values, 6),
                    channels,
                })
            },
            PacketKind::WhoReq => {
                at_least(kind, values, 7)?;
                Self::WhoReq(WhoReqPacket {
                    header,
                    filter: map_at(values, 6),
                })
            },
            PacketKind::WhoReply => {
                at_least(kind, values, 7)?;
                let rows = require_list(values, 6, kind, "who_data")?;
                let users = rows
                    .iter()
                    .map(|row| {
                        let fields = row.as_list().unwrap_or(&[]);
                        WhoUser {
                            name: str_at(fields, 0),
                            idle_seconds: int_at(fields, 1),
                            level: int_at(fields, 2),
                            extra: str_at(fields, 3),
                        }
                    })
                    .collect();
                Self::WhoReply(WhoReplyPacket { header, users })
            },
            PacketKind::FingerReq => {
                at_least(kind, values, 7)?;
                Self::FingerReq(FingerReqPacket {
                    header,
                    username: str_at(values, 6),
                })
            },
            PacketKind::FingerReply => {
                at_least(kind, values, 15)?;
                Self::FingerReply(FingerReplyPacket {
                    header,
                    info: FingerInfo {
                        visname: str_at(values, 6),
                        title: str_at(values, 7),
                        real_name: str_at(values, 8),
                        email: str_at(values, 9),
                        login_time: str_at(values, 10),
                        idle_seconds: int_at(values, 11),
                        ip_addr: str_at(values, 12),
                        level: int_at(values, 13),
                        extra: str_at(values, 14),
                    },
                })
            },
            PacketKind::LocateReq => {
                at_least(kind, values, 7)?;
                Self::LocateReq(LocateReqPacket {
                    header,
                    username: str_at(values, 6),
                })
            },
            PacketKind::LocateReply => {
                at_least(kind, values, 10)?;
                Self::LocateReply(LocateReplyPacket {
                    header,
                    located_mud: str_at(values, 6),
                    located_user: str_at(values, 7),
                    idle_seconds: int_at(values, 8),
                    status: str_at(values, 9),
                })
            },
            PacketKind::StartupReq3 => {
                exact(kind, values, 20)?;
                Self::Startup(StartupPacket {
                    header,
                    password: int_at(values, 6),
                    old_mudlist_id: int_at(values, 7),
                    old_chanlist_id: int_at(values, 8),
                    player_port: int_at(values, 9),
                    tcp_port: int_at(values, 10),
                    udp_port: int_at(values, 11),
                    mudlib: str_at(values, 12),
                    base_mudlib: str_at(values, 13),
                    driver: str_at(values, 14),
                    mud_type: str_at(values, 15),
                    open_status: str_at(values, 16),
                    admin_email: str_at(values, 17),
                    services: int_pairs(&map_at(values, 18)),
                    other_data: map_at(values, 19),
                })
            },
            PacketKind::StartupReply => {
                at_least(kind, values, 8)?;
                let rows = require_list(values, 6, kind, "router_list")?;
                let router_list = rows
                    .iter()
                    .map(|row| {
                        let fields = row.as_list().unwrap_or(&[]);
                        (str_at(fields, 0), str_at(fields, 1))
                    })
                    .collect();
                Self::StartupReply(StartupReplyPacket {
                    header,
                    router_list,
                    password: int_at(values, 7),
                })
            },
            PacketKind::Shutdown => {
                at_least(kind, values, 7)?;
                Self::Shutdown(ShutdownPacket {
                    header,
                    restart_delay: int_at(values, 6),
                })
            },
            PacketKind::Mudlist => {
                at_least(kind, values, 8)?;
                let map = require_map(values, 7, kind, "mudlist")?;
                let entries = map
                    .iter()
                    .map(|(name, value)| (name.to_owned(), mud_info_from(value)))
                    .collect();
                Self::Mudlist(MudlistPacket {
                    header,
                    mudlist_id: int_at(values, 6),
                    entries,
                })
            },
            PacketKind::Error => {
                at_least(kind, values, 9)?;
                Self::Error(ErrorPacket {
                    header,
                    code: str_at(values, 6),
                    message: str_at(values, 7),
                    bad_packet: list_at(values, 8),
                })
            },
            PacketKind::AuthMudReq | PacketKind::AuthMudReply => {
                at_least(kind, values, 7)?;
                Self::AuthMud(AuthMudPacket {
                    kind,
                    header,
                    auth_key: int_at(values, 6),
                })
            },
            PacketKind::OobReq => Self::OobReq(OobReqPacket { header }),
            PacketKind::OobBegin => {
                at_least(kind, values, 8)?;
                Self::OobBegin(OobBeginPacket {
                    header,
                    auth_user: str_at(values, 6),
                    auth_key: int_at(values, 7),
                })
            },
            PacketKind::Mail => {
                at_least(kind, values, 11)?;
                Self::Mail(MailPacket {
                    header,
                    message_id: int_at(values, 6),
                    sender_visname: str_at(values, 7),
                    to: string_list(&list_at(values, 8)),
                    subject: str_at(values, 9),
                    body: str_at(values, 10),
                })
            },
            PacketKind::MailAck => {
                at_least(kind, values, 7)?;
                Self::MailAck(MailAckPacket {
                    header,
                    message_id: int_at(values, 6),
                })
            },
            PacketKind::News => {
                at_least(kind, values, 9)?;
                Self::News(NewsPacket {
                    header,
                    group: str_at(values, 6),
                    subject: str_at(values, 7),
                    body: str_at(values, 8),
                })
            },
            PacketKind::NewsReadReq => {
                at_least(kind, values, 8)?;
                Self::NewsReadReq(NewsReadReqPacket {
                    header,
                    group: str_at(values, 6),
                    article_id: int_at(values, 7),
                })
            },
            PacketKind::File => {
                at_least(kind, values, 8)?;
                Self::File(FilePacket {
                    header,
                    filename: str_at(values, 6),
                    contents: str_at(values, 7),
                })
            },
        };

        packet.validate()?;
        Ok(packet)
    }
}

fn chan_info_from(value: &Value) -> Option<ChanInfo> {
    let fields = value.as_list()?;
    Some(ChanInfo {
        owner_mud: str_at(fields, 0),
        channel_type: int_at(fields, 1),
    })
}

fn mud_info_from(value: &Value) -> Option<MudInfo> {
    let fields = value.as_list()?;
    Some(MudInfo {
        state: int_at(fields, 0),
        host: str_at(fields, 1),
        player_port: int_at(fields, 2),
        tcp_port: int_at(fields, 3),
        udp_port: int_at(fields, 4),
        mudlib: str_at(fields, 5),
        base_mudlib: str_at(fields, 6),
        driver: str_at(fields, 7),
        mud_type: str_at(fields, 8),
        open_status: str_at(fields, 9),
        admin_email: str_at(fields, 10),
        services: int_pairs(&map_at(fields, 11)),
        other_data: map_at(fields, 12),
    })
}

// ── Encode ───────────────────────────────────────────────────────────────────

impl Packet {
    /// Wire form, ready for the frame codec.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::List(self.to_values())
    }

    /// Positional sequence for this packet. Inverse of [`Packet::from_values`].
    #[must_use]
    pub fn to_values(&self) -> Vec<Value> {
        let mut out = header_values(self.kind(), self.header());
        match self {
            Self::Tell(p) => {
                out.push(Value::Str(p.visname.clone()));
                out.push(Value::Str(p.message.clone()));
            },
            Self::ChannelMessage(p) => {
                out.push(Value::Str(p.channel.clone()));
                out.push(Value::Str(p.visname.clone()));
                out.push(Value::Str(p.message.clone()));
            },
            Self::ChannelTarget(p) => {
                out.push(Value::Str(p.channel.clone()));
                out.push(Value::Str(p.visname.clone()));
                out.push(Value::Str(p.target_mud.clone()));
                out.push(Value::Str(p.target_user.clone()));
                out.push(Value::Str(p.message.clone()));
            },
            Self::ChannelMembership(p) => {
                out.push(Value::Str(p.channel.clone()));
            },
            Self::ChannelAdmin(p) => {
                out.push(Value::Str(p.channel.clone()));
                out.push(pairs_to_map(&p.members));
            },
            Self::ChannelFilter(p) => {
                out.push(Value::Str(p.channel.clone()));
                out.push(Value::List(p.packet.clone()));
            },
            Self::ChannelWho(p) => {
                out.push(Value::Str(p.channel.clone()));
                out.push(Value::List(
                    p.users.iter().map(|u| Value::Str(u.clone())).collect(),
                ));
            },
            Self::ChannelListen(p) => {
                out.push(Value::Str(p.channel.clone()));
                // Emitted as a string; see the decode note.
                out.push(Value::Str(if p.joining { "1" } else { "0" }.into()));
            },
            Self::ChanlistReply(p) => {
                out.push(Value::Int(p.chanlist_id));
                out.push(Value::Map(
                    p.channels
                        .iter()
                        .map(|(name, info)| (name.clone(), chan_info_value(info.as_ref())))
                        .collect(),
                ));
            },
            Self::WhoReq(p) => {
                out.push(Value::Map(p.filter.clone()));
            },
            Self::WhoReply(p) => {
                out.push(Value::List(
                    p.users
                        .iter()
                        .map(|u| {
                            Value::List(vec![
                                Value::Str(u.name.clone()),
                                Value::Int(u.idle_seconds),
                                Value::Int(u.level),
                                Value::Str(u.extra.clone()),
                            ])
                        })
                        .collect(),
                ));
            },
            Self::FingerReq(p) => {
                out.push(Value::Str(p.username.clone()));
            },
            Self::FingerReply(p) => {
                out.push(Value::Str(p.info.visname.clone()));
                out.push(Value::Str(p.info.title.clone()));
                out.push(Value::Str(p.info.real_name.clone()));
                out.push(Value::Str(p.info.email.clone()));
                out.push(Value::Str(p.info.login_time.clone()));
                out.push(Value::Int(p.info.idle_seconds));
                out.push(Value::Str(p.info.ip_addr.clone()));
                out.push(Value::Int(p.info.level));
                out.push(Value::Str(p.info.extra.clone()));
            },
            Self::LocateReq(p) => {
                out.push(Value::Str(p.username.clone()));
            },
            Self::LocateReply(p) => {
                out.push(Value::Str(p.located_mud.clone()));
                out.push(Value::Str(p.located_user.clone()));
                out.push(Value::Int(p.idle_seconds));
                out.push(Value::Str(p.status.clone()));
            },
            Self::Startup(p) => {
                out.push(Value::Int(p.password));
                out.push(Value::Int(p.old_mudlist_id));
                out.push(Value::Int(p.old_chanlist_id));
                out.push(Value::Int(p.player_port));
                out.push(Value::Int(p.tcp_port));
                out.push(Value::Int(p.udp_port));
                out.push(Value::Str(p.mudlib.clone()));
                out.push(Value::Str(p.base_mudlib.clone()));
                out.push(Value::Str(p.driver.clone()));
                out.push(Value::Str(p.mud_type.clone()));
                out.push(Value::Str(p.open_status.clone()));
                out.push(Value::Str(p.admin_email.clone()));
                out.push(pairs_to_map(&p.services));
                out.push(Value::Map(p.other_data.clone()));
            },
            Self::StartupReply(p) => {
                out.push(Value::List(
                    p.router_list
                        .iter()
                        .map(|(name, addr)| {
                            Value::List(vec![
                                Value::Str(name.clone()),
                                Value::Str(addr.clone()),
                            ])
                        })
                        .collect(),
                ));
                out.push(Value::Int(p.password));
            },
            Self::Shutdown(p) => {
                out.push(Value::Int(p.restart_delay));
            },
            Self::Mudlist(p) => {
                out.push(Value::Int(p.mudlist_id));
                out.push(Value::Map(
                    p.entries
                        .iter()
                        .map(|(name, info)| (name.clone(), mud_info_value(info.as_ref())))
                        .collect(),
                ));
            },
            Self::Error(p) => {
                out.push(Value::Str(p.code.clone()));
                out.push(Value::Str(p.message.clone()));
                out.push(Value::List(p.bad_packet.clone()));
            },
            Self::AuthMud(p) => {
                out.push(Value::Int(p.auth_key));
            },
            Self::OobReq(_) => {},
            Self::OobBegin(p) => {
                out.push(Value::Str(p.auth_user.clone()));
                out.push(Value::Int(p.auth_key));
            },
            Self::Mail(p) => {
                out.push(Value::Int(p.message_id));
                out.push(Value::Str(p.sender_visname.clone()));
                out.push(Value::List(
                    p.to.iter().map(|u| Value::Str(u.clone())).collect(),
                ));
                out.push(Value::Str(p.subject.clone()));
                out.push(Value::Str(p.body.clone()));
            },
            Self::MailAck(p) => {
                out.push(Value::Int(p.message_id));
            },
            Self::News(p) => {
                out.push(Value::Str(p.group.clone()));
                out.push(Value::Str(p.subject.clone()));
                out.push(Value::Str(p.body.clone()));
            },
            Self::NewsReadReq(p) => {
                out.push(Value::Str(p.group.clone()));
                out.push(Value::Int(p.article_id));
            },
            Self::File(p) => {
                out.push(Value::Str(p.filename.clone()));
                out.push(Value::Str(p.contents.clone()));
            },
        }
        out
    }
}

fn chan_info_value(info: Option<&ChanInfo>) -> Value {
    match info {
        Some(info) => Value::List(vec![
            Value::Str(info.owner_mud.clone()),
            Value::Int(info.channel_type),
        ]),
        // Tombstone: the router delists with integer 0.
        None => Value::Int(0),
    }
}

fn mud_info_value(info: Option<&MudInfo>) -> Value {
    match info {
        Some(info) => Value::List(vec![
            Value::Int(info.state),
            Value::Str(info.host.clone()),
            Value::Int(info.player_port),
            Value::Int(info.tcp_port),
            Value::Int(info.udp_port),
            Value::Str(info.mudlib.clone()),
            Value::Str(info.base_mudlib.clone()),
            Value::Str(info.driver.clone()),
            Value::Str(info.mud_type.clone()),
            Value::Str(info.open_status.clone()),
            Value::Str(info.admin_email.clone()),
            pairs_to_map(&info.services),
            Value::Map(info.other_data.clone()),
        ]),
        None => Value::Int(0),
    }
}
