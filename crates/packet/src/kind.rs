use std::fmt;

/// The closed set of packet kinds carried on the legacy wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    // Core services
    Tell,
    Emoteto,
    ChannelM,
    ChannelE,
    ChannelT,
    WhoReq,
    WhoReply,
    FingerReq,
    FingerReply,
    LocateReq,
    LocateReply,
    // Channel management
    ChannelAdd,
    ChannelRemove,
    ChannelAdmin,
    ChannelFilter,
    ChannelWho,
    ChannelListen,
    ChanlistReply,
    // Router services
    StartupReq3,
    StartupReply,
    Shutdown,
    Mudlist,
    Error,
    AuthMudReq,
    AuthMudReply,
    // OOB services
    OobReq,
    OobBegin,
    Mail,
    MailAck,
    News,
    NewsReadReq,
    File,
}

impl PacketKind {
    pub const ALL: &'static [PacketKind] = &[
        Self::Tell,
        Self::Emoteto,
        Self::ChannelM,
        Self::ChannelE,
        Self::ChannelT,
        Self::WhoReq,
        Self::WhoReply,
        Self::FingerReq,
        Self::FingerReply,
        Self::LocateReq,
        Self::LocateReply,
        Self::ChannelAdd,
        Self::ChannelRemove,
        Self::ChannelAdmin,
        Self::ChannelFilter,
        Self::ChannelWho,
        Self::ChannelListen,
        Self::ChanlistReply,
        Self::StartupReq3,
        Self::StartupReply,
        Self::Shutdown,
        Self::Mudlist,
        Self::Error,
        Self::AuthMudReq,
        Self::AuthMudReply,
        Self::OobReq,
        Self::OobBegin,
        Self::Mail,
        Self::MailAck,
        Self::News,
        Self::NewsReadReq,
        Self::File,
    ];

    /// The tag written at position 0 of the wire sequence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tell => "tell",
            Self::Emoteto => "emoteto",
            Self::ChannelM => "channel-m",
            Self::ChannelE => "channel-e",
            Self::ChannelT => "channel-t",
            Self::WhoReq => "who-req",
            Self::WhoReply => "who-reply",
            Self::FingerReq => "finger-req",
            Self::FingerReply => "finger-reply",
            Self::LocateReq => "locate-req",
            Self::LocateReply => "locate-reply",
            Self::ChannelAdd => "channel-add",
            Self::ChannelRemove => "channel-remove",
            Self::ChannelAdmin => "channel-admin",
            Self::ChannelFilter => "channel-filter",
            Self::ChannelWho => "channel-who",
            Self::ChannelListen => "channel-listen",
            Self::ChanlistReply => "chanlist-reply",
            Self::StartupReq3 => "startup-req-3",
            Self::StartupReply => "startup-reply",
            Self::Shutdown => "shutdown",
            Self::Mudlist => "mudlist",
            Self::Error => "error",
            Self::AuthMudReq => "auth-mud-req",
            Self::AuthMudReply => "auth-mud-reply",
            Self::OobReq => "oob-req",
            Self::OobBegin => "oob-begin",
            Self::Mail => "mail",
            Self::MailAck => "mail-ack",
            Self::News => "news",
            Self::NewsReadReq => "news-read-req",
            Self::File => "file",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == tag)
    }

    /// True for the out-of-band family the gateway carries on the wire but
    /// serves with `not-imp`.
    #[must_use]
    pub fn is_oob(self) -> bool {
        matches!(
            self,
            Self::OobReq
                | Self::OobBegin
                | Self::Mail
                | Self::MailAck
                | Self::News
                | Self::NewsReadReq
                | Self::File
        )
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
