//! Resumable-state interface.
//!
//! Only the interface is specified here; the on-disk format belongs to the
//! embedding application. The gateway snapshots what clients rely on across
//! restarts: the mud list, channels with history, user presence, and the
//! last seen list ids.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::types::{ChannelEntry, MudEntry, UserSession};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub mudlist_id: i32,
    pub chanlist_id: i32,
    pub muds: Vec<MudEntry>,
    pub channels: Vec<ChannelEntry>,
    pub users: Vec<UserSession>,
}

/// Storage backend for gateway state snapshots.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, snapshot: &StateSnapshot) -> std::io::Result<()>;
    async fn load(&self) -> std::io::Result<Option<StateSnapshot>>;
}

/// Used when persistence is disabled.
#[derive(Debug, Default)]
pub struct NoopPersistence;

#[async_trait]
impl Persistence for NoopPersistence {
    async fn save(&self, _snapshot: &StateSnapshot) -> std::io::Result<()> {
        Ok(())
    }

    async fn load(&self) -> std::io::Result<Option<StateSnapshot>> {
        Ok(None)
    }
}
