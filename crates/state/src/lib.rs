//! Process-wide shared state: the mud list, channel list with bounded
//! histories, local user presence, reply caches, and the pending-locate
//! table.
//!
//! The store is the single shared mutable surface in the gateway. All
//! operations are safe for concurrent callers; reads never block on long
//! writes (per-entry sharded maps, no global lock). Mutations that trigger
//! events publish them only after the mutation is visible.

pub mod cache;
pub mod history;
pub mod locate;
pub mod persist;
pub mod store;
pub mod types;

pub use {
    cache::{CacheKind, ReplyCache},
    history::MessageHistory,
    locate::{LocateHandle, LocateResult, PendingLocates},
    persist::{NoopPersistence, Persistence, StateSnapshot},
    store::StateStore,
    types::{
        ChannelEntry, ChannelType, HistoryEntry, HistoryKind, MudEntry, MudStatus, StateEvent,
        UserSession,
    },
};
