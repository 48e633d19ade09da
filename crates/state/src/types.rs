//! Entities owned by the state store.

use {
    chrono::{DateTime, Utc},
    mudgate_packet::{ChanInfo, MudInfo},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MudStatus {
    Online,
    Offline,
    Unknown,
}

/// One mud on the federated network. Identity is `name`; mutated only by
/// `mudlist` and `shutdown` packets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MudEntry {
    pub name: String,
    pub status: MudStatus,
    pub driver: String,
    pub mudlib: String,
    pub base_mudlib: String,
    pub mud_type: String,
    pub open_status: String,
    pub admin_email: String,
    pub host: String,
    pub player_port: i32,
    pub tcp_port: i32,
    pub udp_port: i32,
    pub services: Vec<(String, i32)>,
    pub last_seen: DateTime<Utc>,
}

impl MudEntry {
    /// Build an entry from a mudlist diff record. State -1 means up; any
    /// other value is down or restarting.
    #[must_use]
    pub fn from_info(name: &str, info: &MudInfo, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_owned(),
            status: if info.state == -1 {
                MudStatus::Online
            } else {
                MudStatus::Offline
            },
            driver: info.driver.clone(),
            mudlib: info.mudlib.clone(),
            base_mudlib: info.base_mudlib.clone(),
            mud_type: info.mud_type.clone(),
            open_status: info.open_status.clone(),
            admin_email: info.admin_email.clone(),
            host: info.host.clone(),
            player_port: info.player_port,
            tcp_port: info.tcp_port,
            udp_port: info.udp_port,
            services: info.services.clone(),
            last_seen: now,
        }
    }

    #[must_use]
    pub fn has_service(&self, service: &str) -> bool {
        self.services.iter().any(|(name, on)| name == service && *on != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Public,
    Private,
}

impl ChannelType {
    #[must_use]
    pub fn from_wire(channel_type: i32) -> Self {
        if channel_type == 0 {
            Self::Public
        } else {
            Self::Private
        }
    }
}

/// One federated channel, including its bounded message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub name: String,
    pub channel_type: ChannelType,
    pub owner_mud: String,
    pub member_muds: Vec<String>,
    pub history: crate::history::MessageHistory,
}

impl ChannelEntry {
    #[must_use]
    pub fn new(name: &str, channel_type: ChannelType, owner_mud: &str, history_size: usize) -> Self {
        Self {
            name: name.to_owned(),
            channel_type,
            owner_mud: owner_mud.to_owned(),
            member_muds: Vec::new(),
            history: crate::history::MessageHistory::new(history_size),
        }
    }

    #[must_use]
    pub fn from_info(name: &str, info: &ChanInfo, history_size: usize) -> Self {
        Self::new(
            name,
            ChannelType::from_wire(info.channel_type),
            &info.owner_mud,
            history_size,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Message,
    Emote,
    TargetedEmote,
}

/// One entry in a channel's history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub origin_mud: String,
    pub origin_user: String,
    pub visname: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_mud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
}

/// Presence record for one local user, keyed by lowercased user name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub mud_name: String,
    pub user_name: String,
    pub is_online: bool,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub level: i32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub status_message: String,
}

impl UserSession {
    #[must_use]
    pub fn new(mud_name: &str, user_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            mud_name: mud_name.to_owned(),
            user_name: user_name.to_owned(),
            is_online: true,
            login_time: now,
            last_activity: now,
            level: 0,
            title: String::new(),
            race: None,
            guild: None,
            location: None,
            website: None,
            ip_address: None,
            status_message: String::new(),
        }
    }

    #[must_use]
    pub fn idle_seconds(&self, now: DateTime<Utc>) -> i32 {
        i32::try_from((now - self.last_activity).num_seconds().max(0)).unwrap_or(i32::MAX)
    }
}

/// Published by the store after a mutation becomes visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    MudOnline { mud_name: String },
    MudOffline { mud_name: String },
    ChannelCreated { channel: String },
    ChannelRemoved { channel: String },
}
