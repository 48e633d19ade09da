use thiserror::Error;

/// Routing failures surfaced to API handlers for locally-originated packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// `unk-dst`: the target mud is not in the mud list.
    #[error("unknown destination mud: {0}")]
    UnknownDestination(String),

    /// `not-imp`: the target mud is known but offline.
    #[error("destination mud {0} is offline")]
    DestinationOffline(String),

    #[error("router link is down")]
    LinkDown,

    #[error("packet dropped: ttl expired")]
    TtlExpired,
}

impl RouteError {
    /// The wire error code carried in synthesized `error` packets.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownDestination(_) => "unk-dst",
            Self::DestinationOffline(_) | Self::LinkDown => "not-imp",
            Self::TtlExpired => "ttl-expired",
        }
    }
}
