//! Typed payload records, one per packet kind (kinds with identical layouts
//! share a record and carry their kind tag).

use {
    mudgate_wire::{Value, ValueMap},
    serde::Serialize,
};

use crate::{error::PacketError, header::Header, kind::PacketKind};

fn require(
    kind: PacketKind,
    field: &'static str,
    value: &str,
) -> Result<(), PacketError> {
    if value.is_empty() {
        return Err(PacketError::MissingField { kind, field });
    }
    Ok(())
}

// ── Core services ────────────────────────────────────────────────────────────

/// `tell` / `emoteto`: a private message or emote to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TellPacket {
    pub kind: PacketKind,
    pub header: Header,
    pub visname: String,
    pub message: String,
}

impl TellPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(self.kind, "originator_user", &self.header.originator_user)?;
        require(self.kind, "target_user", &self.header.target_user)?;
        require(self.kind, "message", &self.message)
    }
}

/// `channel-m` / `channel-e`: a message or emote on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessagePacket {
    pub kind: PacketKind,
    pub header: Header,
    pub channel: String,
    pub visname: String,
    pub message: String,
}

impl ChannelMessagePacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(self.kind, "channel", &self.channel)?;
        require(self.kind, "message", &self.message)
    }
}

/// `channel-t`: an emote on a channel directed at one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTargetPacket {
    pub header: Header,
    pub channel: String,
    pub visname: String,
    pub target_mud: String,
    pub target_user: String,
    pub message: String,
}

impl ChannelTargetPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        let kind = PacketKind::ChannelT;
        require(kind, "channel", &self.channel)?;
        require(kind, "target_user", &self.target_user)?;
        require(kind, "message", &self.message)
    }
}

/// `who-req`: filter criteria as a small extension mapping (level, race,
/// guild — forward-compatible by design of the wire format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoReqPacket {
    pub header: Header,
    pub filter: ValueMap,
}

/// One row of a `who-reply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhoUser {
    pub name: String,
    pub idle_seconds: i32,
    pub level: i32,
    pub extra: String,
}

/// `who-reply`: the users currently online on the replying mud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoReplyPacket {
    pub header: Header,
    pub users: Vec<WhoUser>,
}

/// `finger-req`: asks one mud about one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerReqPacket {
    pub header: Header,
    pub username: String,
}

impl FingerReqPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::FingerReq, "username", &self.username)
    }
}

/// The user record carried by `finger-reply`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FingerInfo {
    pub visname: String,
    pub title: String,
    pub real_name: String,
    pub email: String,
    pub login_time: String,
    pub idle_seconds: i32,
    /// Elided (empty) when the local `hide_ip` policy is set.
    pub ip_addr: String,
    pub level: i32,
    pub extra: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerReplyPacket {
    pub header: Header,
    pub info: FingerInfo,
}

/// `locate-req`: broadcast query for a user anywhere on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateReqPacket {
    pub header: Header,
    pub username: String,
}

impl LocateReqPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::LocateReq, "username", &self.username)
    }
}

/// `locate-reply`: sent only by muds where the user is online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateReplyPacket {
    pub header: Header,
    pub located_mud: String,
    pub located_user: String,
    pub idle_seconds: i32,
    pub status: String,
}

impl LocateReplyPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::LocateReply, "located_mud", &self.located_mud)
    }
}

// ── Channel management ───────────────────────────────────────────────────────

/// `channel-add` / `channel-remove`: membership of this mud on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMembershipPacket {
    pub kind: PacketKind,
    pub header: Header,
    pub channel: String,
}

impl ChannelMembershipPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(self.kind, "channel", &self.channel)
    }
}

/// `channel-admin`: per-mud admission flags for a channel this mud owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAdminPacket {
    pub header: Header,
    pub channel: String,
    pub members: Vec<(String, i32)>,
}

impl ChannelAdminPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::ChannelAdmin, "channel", &self.channel)
    }
}

/// `channel-filter`: a filtered channel packet bounced through the filter
/// owner. The inner packet stays an opaque sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFilterPacket {
    pub header: Header,
    pub channel: String,
    pub packet: Vec<Value>,
}

impl ChannelFilterPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::ChannelFilter, "channel", &self.channel)
    }
}

/// `channel-who`: roster request (empty user list) or roster carrying reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelWhoPacket {
    pub header: Header,
    pub channel: String,
    pub users: Vec<String>,
}

impl ChannelWhoPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::ChannelWho, "channel", &self.channel)
    }
}

/// `channel-listen`: tune this mud in or out of a channel at the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListenPacket {
    pub header: Header,
    pub channel: String,
    pub joining: bool,
}

impl ChannelListenPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::ChannelListen, "channel", &self.channel)
    }
}

/// One channel's descriptor inside `chanlist-reply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChanInfo {
    pub owner_mud: String,
    /// 0 = public, 1 = private.
    pub channel_type: i32,
}

/// `chanlist-reply`: channel diffs from the router. `None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanlistReplyPacket {
    pub header: Header,
    pub chanlist_id: i32,
    pub channels: Vec<(String, Option<ChanInfo>)>,
}

// ── Router services ──────────────────────────────────────────────────────────

/// `startup-req-3`: the 20-field handshake. The legacy 18-field form is
/// rejected at decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupPacket {
    pub header: Header,
    pub password: i32,
    pub old_mudlist_id: i32,
    pub old_chanlist_id: i32,
    pub player_port: i32,
    pub tcp_port: i32,
    pub udp_port: i32,
    pub mudlib: String,
    pub base_mudlib: String,
    pub driver: String,
    pub mud_type: String,
    pub open_status: String,
    pub admin_email: String,
    pub services: Vec<(String, i32)>,
    pub other_data: ValueMap,
}

impl StartupPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(
            PacketKind::StartupReq3,
            "originator_mud",
            &self.header.originator_mud,
        )
    }
}

/// `startup-reply`: the router's accept, carrying its peer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReplyPacket {
    pub header: Header,
    /// `(router_name, "host port")` pairs.
    pub router_list: Vec<(String, String)>,
    pub password: i32,
}

/// `shutdown`: a mud announcing it is going down for `restart_delay` seconds
/// (0 = indefinitely).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownPacket {
    pub header: Header,
    pub restart_delay: i32,
}

/// The per-mud record inside a `mudlist` diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MudInfo {
    /// -1 = up, 0 = down, n = restarting in n seconds.
    pub state: i32,
    pub host: String,
    pub player_port: i32,
    pub tcp_port: i32,
    pub udp_port: i32,
    pub mudlib: String,
    pub base_mudlib: String,
    pub driver: String,
    pub mud_type: String,
    pub open_status: String,
    pub admin_email: String,
    pub services: Vec<(String, i32)>,
    pub other_data: ValueMap,
}

/// `mudlist`: mud diffs from the router. `None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MudlistPacket {
    pub header: Header,
    pub mudlist_id: i32,
    pub entries: Vec<(String, Option<MudInfo>)>,
}

/// `error`: a protocol or routing error addressed back at an originator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPacket {
    pub header: Header,
    pub code: String,
    pub message: String,
    pub bad_packet: Vec<Value>,
}

impl ErrorPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::Error, "code", &self.code)
    }
}

/// `auth-mud-req` / `auth-mud-reply`: mud-to-mud authentication keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMudPacket {
    pub kind: PacketKind,
    pub header: Header,
    pub auth_key: i32,
}

// ── OOB services ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OobReqPacket {
    pub header: Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OobBeginPacket {
    pub header: Header,
    pub auth_user: String,
    pub auth_key: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailPacket {
    pub header: Header,
    pub message_id: i32,
    pub sender_visname: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAckPacket {
    pub header: Header,
    pub message_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsPacket {
    pub header: Header,
    pub group: String,
    pub subject: String,
    pub body: String,
}

impl NewsPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::News, "group", &self.group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsReadReqPacket {
    pub header: Header,
    pub group: String,
    pub article_id: i32,
}

impl NewsReadReqPacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::NewsReadReq, "group", &self.group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePacket {
    pub header: Header,
    pub filename: String,
    pub contents: String,
}

impl FilePacket {
    pub fn validate(&self) -> Result<(), PacketError> {
        require(PacketKind::File, "filename", &self.filename)
    }
}
