//! The shared state store.

use std::sync::atomic::{AtomicI32, Ordering};

use {
    chrono::{DateTime, Utc},
    dashmap::DashMap,
    metrics::gauge,
    mudgate_packet::{ChanInfo, MudInfo},
    tokio::sync::broadcast,
    tracing::{debug, info},
};

use crate::{
    cache::ReplyCache,
    locate::PendingLocates,
    persist::StateSnapshot,
    types::{ChannelEntry, ChannelType, HistoryEntry, MudEntry, MudStatus, StateEvent, UserSession},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owns every shared entity: mud list, channel list, user presence, reply
/// caches, and the pending-locate table. Collaborators read through the
/// accessors and mutate through the commands; events publish after the
/// mutation is visible.
pub struct StateStore {
    history_size: usize,
    mudlist_id: AtomicI32,
    chanlist_id: AtomicI32,
    muds: DashMap<String, MudEntry>,
    channels: DashMap<String, ChannelEntry>,
    users: DashMap<String, UserSession>,
    pub cache: ReplyCache,
    pub locates: PendingLocates,
    events: broadcast::Sender<StateEvent>,
}

impl StateStore {
    #[must_use]
    pub fn new(history_size: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            history_size,
            mudlist_id: AtomicI32::new(0),
            chanlist_id: AtomicI32::new(0),
            muds: DashMap::new(),
            channels: DashMap::new(),
            users: DashMap::new(),
            cache: ReplyCache::new(),
            locates: PendingLocates::new(),
            events,
        }
    }

    /// Receive state-change events (mud online/offline, channel add/remove).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StateEvent) {
        // No subscribers is fine (e.g. during startup).
        let _ = self.events.send(event);
    }

    // ── Mud list ─────────────────────────────────────────────────────────

    /// Apply a mudlist diff. Tombstoned muds go offline; events fire for
    /// status transitions only, after the table reflects the diff.
    pub fn update_mudlist(&self, diffs: &[(String, Option<MudInfo>)], new_id: i32) {
        let now = Utc::now();
        let mut transitions = Vec::new();

        for (name, info) in diffs {
            match info {
                Some(info) => {
                    let entry = MudEntry::from_info(name, info, now);
                    let previous = self.muds.insert(name.clone(), entry.clone());
                    let was_online =
                        previous.is_some_and(|p| p.status == MudStatus::Online);
                    match (was_online, entry.status) {
                        (false, MudStatus::Online) => {
                            transitions.push(StateEvent::MudOnline { mud_name: name.clone() });
                        },
                        (true, MudStatus::Offline | MudStatus::Unknown) => {
                            transitions.push(StateEvent::MudOffline { mud_name: name.clone() });
                        },
                        _ => {},
                    }
                },
                None => {
                    if let Some(mut entry) = self.muds.get_mut(name) {
                        if entry.status == MudStatus::Online {
                            transitions.push(StateEvent::MudOffline { mud_name: name.clone() });
                        }
                        entry.status = MudStatus::Offline;
                        entry.last_seen = now;
                    }
                },
            }
        }

        self.mudlist_id.store(new_id, Ordering::SeqCst);
        gauge!("state_muds").set(self.muds.len() as f64);
        info!(mudlist_id = new_id, muds = self.muds.len(), "mudlist updated");

        for event in transitions {
            self.publish(event);
        }
    }

    /// A `shutdown` packet: the named mud is going down.
    pub fn mark_mud_offline(&self, name: &str) {
        let mut went_offline = false;
        if let Some(mut entry) = self.muds.get_mut(name) {
            went_offline = entry.status == MudStatus::Online;
            entry.status = MudStatus::Offline;
            entry.last_seen = Utc::now();
        }
        if went_offline {
            self.publish(StateEvent::MudOffline {
                mud_name: name.to_owned(),
            });
        }
    }

    #[must_use]
    pub fn get_mud(&self, name: &str) -> Option<MudEntry> {
        self.muds.get(name).map(|e| e.clone())
    }

    #[must_use]
    pub fn list_muds(&self) -> Vec<MudEntry> {
        let mut muds: Vec<MudEntry> = self.muds.iter().map(|e| e.clone()).collect();
        muds.sort_by(|a, b| a.name.cmp(&b.name));
        muds
    }

    #[must_use]
    pub fn mudlist_id(&self) -> i32 {
        self.mudlist_id.load(Ordering::SeqCst)
    }

    // ── Channel list ─────────────────────────────────────────────────────

    /// Seed a channel that exists before the router's first chanlist diff.
    pub fn add_channel(&self, name: &str, channel_type: ChannelType, owner_mud: &str) {
        let created = !self.channels.contains_key(name);
        self.channels
            .entry(name.to_owned())
            .or_insert_with(|| ChannelEntry::new(name, channel_type, owner_mud, self.history_size));
        if created {
            self.publish(StateEvent::ChannelCreated {
                channel: name.to_owned(),
            });
        }
    }

    /// Apply a chanlist diff. Tombstones delete; new names allocate their
    /// history ring.
    pub fn update_chanlist(&self, diffs: &[(String, Option<ChanInfo>)], new_id: i32) {
        let mut events = Vec::new();

        for (name, info) in diffs {
            match info {
                Some(info) => {
                    let mut created = false;
                    self.channels
                        .entry(name.clone())
                        .and_modify(|entry| {
                            entry.channel_type = ChannelType::from_wire(info.channel_type);
                            entry.owner_mud = info.owner_mud.clone();
                        })
                        .or_insert_with(|| {
                            created = true;
                            ChannelEntry::from_info(name, info, self.history_size)
                        });
                    if created {
                        events.push(StateEvent::ChannelCreated { channel: name.clone() });
                    }
                },
                None => {
                    if self.channels.remove(name).is_some() {
                        events.push(StateEvent::ChannelRemoved { channel: name.clone() });
                    }
                },
            }
        }

        self.chanlist_id.store(new_id, Ordering::SeqCst);
        gauge!("state_channels").set(self.channels.len() as f64);
        debug!(chanlist_id = new_id, channels = self.channels.len(), "chanlist updated");

        for event in events {
            self.publish(event);
        }
    }

    #[must_use]
    pub fn get_channel(&self, name: &str) -> Option<ChannelEntry> {
        self.channels.get(name).map(|e| e.clone())
    }

    #[must_use]
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    #[must_use]
    pub fn list_channels(&self) -> Vec<ChannelEntry> {
        let mut channels: Vec<ChannelEntry> = self.channels.iter().map(|e| e.clone()).collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    #[must_use]
    pub fn chanlist_id(&self) -> i32 {
        self.chanlist_id.load(Ordering::SeqCst)
    }

    pub fn channel_add_member(&self, channel: &str, mud: &str) {
        if let Some(mut entry) = self.channels.get_mut(channel)
            && !entry.member_muds.iter().any(|m| m == mud)
        {
            entry.member_muds.push(mud.to_owned());
        }
    }

    pub fn channel_remove_member(&self, channel: &str, mud: &str) {
        if let Some(mut entry) = self.channels.get_mut(channel) {
            entry.member_muds.retain(|m| m != mud);
        }
    }

    // ── Channel history ──────────────────────────────────────────────────

    /// Append to a channel's ring. Returns false for unknown channels.
    pub fn history_append(&self, channel: &str, entry: HistoryEntry) -> bool {
        match self.channels.get_mut(channel) {
            Some(mut chan) => {
                chan.history.add(entry);
                true
            },
            None => false,
        }
    }

    #[must_use]
    pub fn history_read(
        &self,
        channel: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Option<Vec<HistoryEntry>> {
        self.channels
            .get(channel)
            .map(|chan| chan.history.read(limit, before, after))
    }

    // ── User presence ────────────────────────────────────────────────────

    /// Create-or-update the presence record for a local user. The mutator
    /// runs under the entry lock; keep it small.
    pub fn session_upsert(
        &self,
        mud_name: &str,
        user_name: &str,
        mutate: impl FnOnce(&mut UserSession),
    ) {
        let key = user_name.to_lowercase();
        let mut entry = self
            .users
            .entry(key)
            .or_insert_with(|| UserSession::new(mud_name, user_name, Utc::now()));
        mutate(&mut entry);
    }

    #[must_use]
    pub fn session_get(&self, user_name: &str) -> Option<UserSession> {
        self.users.get(&user_name.to_lowercase()).map(|e| e.clone())
    }

    /// Online users, for who snapshots and locate answers.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserSession> {
        self.users
            .iter()
            .filter(|e| e.is_online)
            .map(|e| e.clone())
            .collect()
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Periodic sweep: evict expired cache entries and mark users that have
    /// gone quiet for longer than `user_stale_after` as offline.
    pub fn sweep(&self, user_stale_after: Option<std::time::Duration>) {
        self.cache.sweep();
        if let Some(stale_after) = user_stale_after {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::zero());
            for mut user in self.users.iter_mut() {
                if user.is_online && user.last_activity < cutoff {
                    user.is_online = false;
                }
            }
        }
    }

    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.muds.len(), self.channels.len(), self.users.len())
    }

    // ── Persistence ──────────────────────────────────────────────────────

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            mudlist_id: self.mudlist_id(),
            chanlist_id: self.chanlist_id(),
            muds: self.list_muds(),
            channels: self.list_channels(),
            users: self.users.iter().map(|e| e.clone()).collect(),
        }
    }

    /// Restore from a snapshot; existing entries with the same identity are
    /// replaced, events are not replayed.
    pub fn restore(&self, snapshot: StateSnapshot) {
        self.mudlist_id.store(snapshot.mudlist_id, Ordering::SeqCst);
        self.chanlist_id.store(snapshot.chanlist_id, Ordering::SeqCst);
        for mud in snapshot.muds {
            self.muds.insert(mud.name.clone(), mud);
        }
        for channel in snapshot.channels {
            self.channels.insert(channel.name.clone(), channel);
        }
        for user in snapshot.users {
            self.users.insert(user.user_name.to_lowercase(), user);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use mudgate_wire::ValueMap;

    use super::*;

    fn info(state: i32) -> MudInfo {
        MudInfo {
            state,
            host: "beta.example".into(),
            player_port: 5000,
            tcp_port: 0,
            udp_port: 0,
            mudlib: "Lib".into(),
            base_mudlib: "LPMud".into(),
            driver: "FluffOS".into(),
            mud_type: "LP".into(),
            open_status: "open".into(),
            admin_email: "a@b".into(),
            services: vec![("tell".into(), 1)],
            other_data: ValueMap::new(),
        }
    }

    #[test]
    fn test_mudlist_update_and_transitions() {
        let store = StateStore::new(10);
        let mut events = store.subscribe();

        store.update_mudlist(&[("Beta".into(), Some(info(-1)))], 5);
        assert_eq!(store.mudlist_id(), 5);
        assert_eq!(store.get_mud("Beta").unwrap().status, MudStatus::Online);
        assert_eq!(
            events.try_recv().unwrap(),
            StateEvent::MudOnline { mud_name: "Beta".into() }
        );

        // Same state again: no transition event.
        store.update_mudlist(&[("Beta".into(), Some(info(-1)))], 6);
        assert!(events.try_recv().is_err());

        // Tombstone: offline transition.
        store.update_mudlist(&[("Beta".into(), None)], 7);
        assert_eq!(store.get_mud("Beta").unwrap().status, MudStatus::Offline);
        assert_eq!(
            events.try_recv().unwrap(),
            StateEvent::MudOffline { mud_name: "Beta".into() }
        );
    }

    #[test]
    fn test_chanlist_create_and_remove() {
        let store = StateStore::new(10);
        let chan = ChanInfo {
            owner_mud: "Hub".into(),
            channel_type: 0,
        };
        store.update_chanlist(&[("chat".into(), Some(chan))], 3);
        assert!(store.has_channel("chat"));
        assert_eq!(store.chanlist_id(), 3);

        store.update_chanlist(&[("chat".into(), None)], 4);
        assert!(!store.has_channel("chat"));
    }

    #[test]
    fn test_history_append_requires_channel() {
        let store = StateStore::new(10);
        let entry = HistoryEntry {
            kind: crate::types::HistoryKind::Message,
            origin_mud: "Beta".into(),
            origin_user: "bob".into(),
            visname: "Bob".into(),
            body: "hello".into(),
            timestamp: Utc::now(),
            target_mud: None,
            target_user: None,
        };
        assert!(!store.history_append("chat", entry.clone()));

        store.add_channel("chat", ChannelType::Public, "Hub");
        assert!(store.history_append("chat", entry));
        assert_eq!(store.history_read("chat", 10, None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_session_upsert_and_idle() {
        let store = StateStore::new(10);
        store.session_upsert("Alpha", "Alice", |s| {
            s.level = 30;
            s.title = "the Swift".into();
        });
        let session = store.session_get("alice").unwrap();
        assert_eq!(session.level, 30);
        assert!(session.is_online);
        assert_eq!(store.online_users().len(), 1);

        store.session_upsert("Alpha", "Alice", |s| s.is_online = false);
        assert!(store.online_users().is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let store = StateStore::new(10);
        store.update_mudlist(&[("Beta".into(), Some(info(-1)))], 5);
        store.add_channel("chat", ChannelType::Public, "Hub");
        store.session_upsert("Alpha", "alice", |_| {});

        let snapshot = store.snapshot();
        let restored = StateStore::new(10);
        restored.restore(snapshot);
        assert_eq!(restored.mudlist_id(), 5);
        assert!(restored.get_mud("Beta").is_some());
        assert!(restored.has_channel("chat"));
        assert!(restored.session_get("alice").is_some());
    }
}
