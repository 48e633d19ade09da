//! Pending locate requests, correlating broadcast replies back to waiters.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use {
    dashmap::DashMap,
    serde::Serialize,
    tokio::sync::oneshot,
    tracing::debug,
};

/// A resolved location for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocateResult {
    pub mud_name: String,
    pub user_name: String,
    pub idle_seconds: i32,
    pub status: String,
}

/// Handle returned by [`PendingLocates::register`]; consumed by `wait`.
pub struct LocateHandle {
    key: String,
    waiter_id: u64,
    rx: oneshot::Receiver<LocateResult>,
}

/// Waiters keyed by lowercased target user. A `locate-reply` resolves every
/// waiter registered for that user; a waiter that times out unregisters
/// itself so completion never parks on a dead receiver.
#[derive(Default)]
pub struct PendingLocates {
    waiters: DashMap<String, Vec<(u64, oneshot::Sender<LocateResult>)>>,
    next_id: AtomicU64,
}

impl PendingLocates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(&self, target_user: &str) -> LocateHandle {
        let key = target_user.to_lowercase();
        let waiter_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(key.clone()).or_default().push((waiter_id, tx));
        LocateHandle { key, waiter_id, rx }
    }

    /// Resolve every waiter for `target_user`. Returns how many were woken.
    pub fn complete(&self, target_user: &str, result: &LocateResult) -> usize {
        let key = target_user.to_lowercase();
        let Some((_, waiters)) = self.waiters.remove(&key) else {
            return 0;
        };
        let mut woken = 0;
        for (_, tx) in waiters {
            if tx.send(result.clone()).is_ok() {
                woken += 1;
            }
        }
        debug!(target_user = %key, woken, "locate completed");
        woken
    }

    /// Wait for the first reply or until `timeout`. The handle's registration
    /// is released either way.
    pub async fn wait(&self, handle: LocateHandle, timeout: Duration) -> Option<LocateResult> {
        let LocateHandle { key, waiter_id, rx } = handle;
        let result = tokio::time::timeout(timeout, rx).await;
        match result {
            Ok(Ok(found)) => Some(found),
            _ => {
                // Timed out or the table was dropped; unpark our slot.
                if let Some(mut entry) = self.waiters.get_mut(&key) {
                    entry.retain(|(id, _)| *id != waiter_id);
                }
                self.waiters.retain(|_, waiters| !waiters.is_empty());
                None
            },
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.waiters.iter().map(|e| e.value().len()).sum()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn found(mud: &str) -> LocateResult {
        LocateResult {
            mud_name: mud.into(),
            user_name: "bob".into(),
            idle_seconds: 5,
            status: "online".into(),
        }
    }

    #[tokio::test]
    async fn test_complete_wakes_all_waiters() {
        let table = PendingLocates::new();
        let a = table.register("Bob");
        let b = table.register("bob");
        assert_eq!(table.pending(), 2);

        assert_eq!(table.complete("BOB", &found("Beta")), 2);
        let ra = table.wait(a, Duration::from_secs(1)).await;
        let rb = table.wait(b, Duration::from_secs(1)).await;
        assert_eq!(ra, Some(found("Beta")));
        assert_eq!(rb, Some(found("Beta")));
        assert_eq!(table.pending(), 0);
    }

    #[tokio::test]
    async fn test_timeout_unregisters() {
        let table = PendingLocates::new();
        let handle = table.register("ghost");
        let result = table.wait(handle, Duration::from_millis(10)).await;
        assert_eq!(result, None);
        assert_eq!(table.pending(), 0);
        // A late reply finds nobody to wake.
        assert_eq!(table.complete("ghost", &found("Beta")), 0);
    }
}
