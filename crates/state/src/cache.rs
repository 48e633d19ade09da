//! TTL caches for who/finger/locate reply payloads.

use std::time::{Duration, Instant};

use {dashmap::DashMap, metrics::counter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Who,
    Finger,
    Locate,
}

impl CacheKind {
    /// Per-kind freshness window. Who rosters churn fastest.
    #[must_use]
    pub fn ttl(self) -> Duration {
        match self {
            Self::Who | Self::Locate => Duration::from_secs(30),
            Self::Finger => Duration::from_secs(60),
        }
    }
}

struct CacheSlot {
    payload: serde_json::Value,
    cached_at: Instant,
}

/// Keyed by `(kind, target)`. Entries are evicted lazily on read and by the
/// periodic sweep.
#[derive(Default)]
pub struct ReplyCache {
    slots: DashMap<(CacheKind, String), CacheSlot>,
}

impl ReplyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, kind: CacheKind, key: &str, payload: serde_json::Value) {
        self.slots.insert(
            (kind, key.to_lowercase()),
            CacheSlot {
                payload,
                cached_at: Instant::now(),
            },
        );
    }

    /// Fresh payload or miss; expired entries are removed on the way out.
    #[must_use]
    pub fn get(&self, kind: CacheKind, key: &str) -> Option<serde_json::Value> {
        let map_key = (kind, key.to_lowercase());
        let expired = match self.slots.get(&map_key) {
            Some(slot) if slot.cached_at.elapsed() < kind.ttl() => {
                counter!("state_cache_hits_total").increment(1);
                return Some(slot.payload.clone());
            },
            Some(_) => true,
            None => false,
        };
        if expired {
            self.slots.remove(&map_key);
        }
        counter!("state_cache_misses_total").increment(1);
        None
    }

    /// Drop every expired entry. Driven by the periodic sweeper.
    pub fn sweep(&self) {
        self.slots
            .retain(|(kind, _), slot| slot.cached_at.elapsed() < kind.ttl());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
