use mudgate_common::TTL_CEILING;

/// The addressing header every packet carries at positions 1–5.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub ttl: u8,
    pub originator_mud: String,
    pub originator_user: String,
    pub target_mud: String,
    pub target_user: String,
}

impl Header {
    #[must_use]
    pub fn new(
        originator_mud: impl Into<String>,
        originator_user: impl Into<String>,
        target_mud: impl Into<String>,
        target_user: impl Into<String>,
    ) -> Self {
        Self {
            ttl: TTL_CEILING,
            originator_mud: originator_mud.into(),
            originator_user: originator_user.into(),
            target_mud: target_mud.into(),
            target_user: target_user.into(),
        }
    }

    /// Addressing for a reply: originator and target swap, TTL resets to the
    /// policy ceiling.
    #[must_use]
    pub fn reply(&self) -> Self {
        Self {
            ttl: TTL_CEILING,
            originator_mud: self.target_mud.clone(),
            originator_user: self.target_user.clone(),
            target_mud: self.originator_mud.clone(),
            target_user: self.originator_user.clone(),
        }
    }

    /// A reply that originates from `mud` itself regardless of how the
    /// request was addressed (broadcast requests carry `0` in the target
    /// slots, which must not leak into a reply's originator).
    #[must_use]
    pub fn reply_from(&self, mud: &str, user: &str) -> Self {
        Self {
            ttl: TTL_CEILING,
            originator_mud: mud.to_owned(),
            originator_user: user.to_owned(),
            target_mud: self.originator_mud.clone(),
            target_user: self.originator_user.clone(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_swaps_addresses_and_resets_ttl() {
        let mut header = Header::new("Alpha", "alice", "Beta", "bob");
        header.ttl = 3;
        let reply = header.reply();
        assert_eq!(reply.ttl, TTL_CEILING);
        assert_eq!(reply.originator_mud, "Beta");
        assert_eq!(reply.originator_user, "bob");
        assert_eq!(reply.target_mud, "Alpha");
        assert_eq!(reply.target_user, "alice");
    }

    #[test]
    fn test_reply_from_overrides_broadcast_addressing() {
        let header = Header::new("Alpha", "alice", "0", "0");
        let reply = header.reply_from("Beta", "");
        assert_eq!(reply.originator_mud, "Beta");
        assert_eq!(reply.target_mud, "Alpha");
        assert_eq!(reply.target_user, "alice");
    }
}
