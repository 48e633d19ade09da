//! The channel subscription table: authoritative for event delivery.

use std::collections::{HashMap, HashSet};

use {
    chrono::{DateTime, Utc},
    dashmap::DashMap,
};

/// One `(session, channel)` subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub joined_at: DateTime<Utc>,
    pub listen_only: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u64,
}

/// Forward table (session → channels) plus the reverse index the bridge uses
/// to compute candidate sets.
#[derive(Default)]
pub struct SubscriptionManager {
    by_session: DashMap<String, HashMap<String, Subscription>>,
    by_channel: DashMap<String, HashSet<String>>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the session was already subscribed.
    pub fn subscribe(&self, session_id: &str, channel: &str, listen_only: bool) -> bool {
        let mut channels = self.by_session.entry(session_id.to_owned()).or_default();
        if channels.contains_key(channel) {
            return false;
        }
        channels.insert(
            channel.to_owned(),
            Subscription {
                joined_at: Utc::now(),
                listen_only,
                last_message_at: None,
                message_count: 0,
            },
        );
        drop(channels);
        self.by_channel
            .entry(channel.to_owned())
            .or_default()
            .insert(session_id.to_owned());
        true
    }

    pub fn unsubscribe(&self, session_id: &str, channel: &str) -> bool {
        let removed = self
            .by_session
            .get_mut(session_id)
            .is_some_and(|mut channels| channels.remove(channel).is_some());
        if removed {
            if let Some(mut sessions) = self.by_channel.get_mut(channel) {
                sessions.remove(session_id);
            }
            self.by_channel.retain(|_, sessions| !sessions.is_empty());
        }
        removed
    }

    /// Remove every subscription a departing session held.
    pub fn unsubscribe_all(&self, session_id: &str) -> usize {
        let Some((_, channels)) = self.by_session.remove(session_id) else {
            return 0;
        };
        for channel in channels.keys() {
            if let Some(mut sessions) = self.by_channel.get_mut(channel) {
                sessions.remove(session_id);
            }
        }
        self.by_channel.retain(|_, sessions| !sessions.is_empty());
        channels.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, session_id: &str, channel: &str) -> bool {
        self.by_session
            .get(session_id)
            .is_some_and(|channels| channels.contains_key(channel))
    }

    #[must_use]
    pub fn subscriptions_of(&self, session_id: &str) -> Vec<String> {
        self.by_session
            .get(session_id)
            .map(|channels| channels.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The candidate sessions for a channel event, at dispatch time.
    #[must_use]
    pub fn sessions_for_channel(&self, channel: &str) -> Vec<String> {
        self.by_channel
            .get(channel)
            .map(|sessions| sessions.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.by_channel.get(channel).map_or(0, |s| s.len())
    }

    /// Bump delivery counters after a message lands on a subscription.
    pub fn record_delivery(&self, session_id: &str, channel: &str) {
        if let Some(mut channels) = self.by_session.get_mut(session_id)
            && let Some(sub) = channels.get_mut(channel)
        {
            sub.last_message_at = Some(Utc::now());
            sub.message_count += 1;
        }
    }
}
