//! Client-facing events and per-session filtering.

use std::{collections::HashSet, time::Duration};

use {
    chrono::{DateTime, SecondsFormat, Utc},
    serde_json::Value,
};

use crate::rpc;

/// The closed set of notification types pushed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    // Communication
    TellReceived,
    EmotetoReceived,
    ChannelMessage,
    ChannelEmote,
    // System
    MudOnline,
    MudOffline,
    ChannelJoined,
    ChannelLeft,
    ErrorOccurred,
    GatewayReconnected,
    // User activity
    UserJoinedChannel,
    UserLeftChannel,
    UserStatusChanged,
    // Administrative
    MaintenanceScheduled,
    ShutdownWarning,
    RateLimitWarning,
}

impl EventType {
    /// The JSON-RPC notification method name.
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::TellReceived => "tell_received",
            Self::EmotetoReceived => "emoteto_received",
            Self::ChannelMessage => "channel_message",
            Self::ChannelEmote => "channel_emote",
            Self::MudOnline => "mud_online",
            Self::MudOffline => "mud_offline",
            Self::ChannelJoined => "channel_joined",
            Self::ChannelLeft => "channel_left",
            Self::ErrorOccurred => "error_occurred",
            Self::GatewayReconnected => "gateway_reconnected",
            Self::UserJoinedChannel => "user_joined_channel",
            Self::UserLeftChannel => "user_left_channel",
            Self::UserStatusChanged => "user_status_changed",
            Self::MaintenanceScheduled => "maintenance_scheduled",
            Self::ShutdownWarning => "shutdown_warning",
            Self::RateLimitWarning => "rate_limit_warning",
        }
    }

    /// Queue priority band (1 = most urgent).
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::GatewayReconnected => 1,
            Self::ErrorOccurred => 2,
            Self::TellReceived | Self::EmotetoReceived => 3,
            Self::UserJoinedChannel | Self::UserLeftChannel | Self::UserStatusChanged => 7,
            _ => 5,
        }
    }

    /// How long a queued notification stays deliverable. `None` never
    /// expires (reconnect notices must survive any queue wait).
    #[must_use]
    pub fn ttl(self) -> Option<Duration> {
        match self {
            Self::GatewayReconnected => None,
            Self::ChannelMessage | Self::ChannelEmote => Some(Duration::from_secs(60)),
            Self::ErrorOccurred => Some(Duration::from_secs(600)),
            _ => Some(Duration::from_secs(300)),
        }
    }

    /// Capability a session needs to receive this event. `None` means every
    /// authenticated session qualifies.
    #[must_use]
    pub fn required_capability(self) -> Option<&'static str> {
        match self {
            Self::TellReceived | Self::EmotetoReceived => Some("tell"),
            Self::ChannelMessage
            | Self::ChannelEmote
            | Self::ChannelJoined
            | Self::ChannelLeft
            | Self::UserJoinedChannel
            | Self::UserLeftChannel => Some("channel"),
            Self::MudOnline | Self::MudOffline | Self::UserStatusChanged => Some("info"),
            Self::ErrorOccurred
            | Self::GatewayReconnected
            | Self::MaintenanceScheduled
            | Self::ShutdownWarning
            | Self::RateLimitWarning => None,
        }
    }

    /// Events gated by the channel subscription index.
    #[must_use]
    pub fn is_channel_scoped(self) -> bool {
        matches!(self, Self::ChannelMessage | Self::ChannelEmote)
    }

    /// Events where `exclude_self` applies. Only chat traffic echoes; a
    /// session must still see error and status events its own mud produced.
    #[must_use]
    pub fn is_echo(self) -> bool {
        matches!(
            self,
            Self::TellReceived | Self::EmotetoReceived | Self::ChannelMessage | Self::ChannelEmote
        )
    }
}

/// One event on its way to client sessions.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub ttl: Option<Duration>,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
            priority: event_type.priority(),
            ttl: event_type.ttl(),
        }
    }

    /// The serialized JSON-RPC notification for this event.
    #[must_use]
    pub fn to_notification(&self) -> String {
        let mut params = self.data.clone();
        if let Some(obj) = params.as_object_mut() {
            obj.insert(
                "timestamp".into(),
                Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        rpc::notification(self.event_type.method(), &params)
    }

    /// The mud this event came from, for exclude_self and mud filters.
    #[must_use]
    pub fn from_mud(&self) -> Option<&str> {
        self.data
            .get("from_mud")
            .or_else(|| self.data.get("mud_name"))
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.data.get("channel").and_then(Value::as_str)
    }
}

/// Optional per-session filter applied after subscriptions and permissions.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub event_types: Option<HashSet<EventType>>,
    pub channels: Option<HashSet<String>>,
    pub mud_names: Option<HashSet<String>>,
    /// A client does not see events originating from its own mud.
    pub exclude_self: bool,
    /// Only events at least this urgent (numerically ≤) pass.
    pub priority_threshold: Option<u8>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event_types: None,
            channels: None,
            mud_names: None,
            exclude_self: true,
            priority_threshold: None,
        }
    }
}

impl EventFilter {
    #[must_use]
    pub fn matches(&self, event: &Event, session_mud: &str) -> bool {
        if let Some(types) = &self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }
        if event.event_type.is_channel_scoped()
            && let (Some(channels), Some(channel)) = (&self.channels, event.channel())
            && !channels.contains(channel)
        {
            return false;
        }
        if let (Some(muds), Some(from)) = (&self.mud_names, event.from_mud())
            && !muds.contains(from)
        {
            return false;
        }
        if self.exclude_self
            && event.event_type.is_echo()
            && event.from_mud() == Some(session_mud)
        {
            return false;
        }
        if let Some(threshold) = self.priority_threshold
            && event.priority > threshold
        {
            return false;
        }
        true
    }
}
