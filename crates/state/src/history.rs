//! Bounded, ordered channel history.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::VecDeque,
};

use crate::types::HistoryEntry;

/// Ring of at most `max_size` entries, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHistory {
    max_size: usize,
    entries: VecDeque<HistoryEntry>,
}

impl MessageHistory {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: VecDeque::with_capacity(max_size.min(128)),
        }
    }

    pub fn add(&mut self, entry: HistoryEntry) {
        if self.max_size == 0 {
            return;
        }
        if self.entries.len() == self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most-recent `limit` entries inside the optional time window, oldest
    /// first.
    #[must_use]
    pub fn read(
        &self,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Vec<HistoryEntry> {
        let mut selected: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|e| before.is_none_or(|b| e.timestamp < b))
            .filter(|e| after.is_none_or(|a| e.timestamp > a))
            .cloned()
            .collect();
        if selected.len() > limit {
            selected.drain(..selected.len() - limit);
        }
        selected
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use {super::*, crate::types::HistoryKind};

    fn entry(n: i64, base: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            kind: HistoryKind::Message,
            origin_mud: "Beta".into(),
            origin_user: "bob".into(),
            visname: "Bob".into(),
            body: format!("msg {n}"),
            timestamp: base + TimeDelta::seconds(n),
            target_mud: None,
            target_user: None,
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let base = Utc::now();
        let mut history = MessageHistory::new(3);
        for n in 0..5 {
            history.add(entry(n, base));
        }
        assert_eq!(history.len(), 3);
        let bodies: Vec<String> = history.read(10, None, None).into_iter().map(|e| e.body).collect();
        assert_eq!(bodies, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn test_read_window_and_limit() {
        let base = Utc::now();
        let mut history = MessageHistory::new(10);
        for n in 0..10 {
            history.add(entry(n, base));
        }
        let before = base + TimeDelta::seconds(8);
        let after = base + TimeDelta::seconds(2);
        let window = history.read(3, Some(before), Some(after));
        let bodies: Vec<String> = window.into_iter().map(|e| e.body).collect();
        // Entries 3..=7 qualify; the limit keeps the newest three.
        assert_eq!(bodies, vec!["msg 5", "msg 6", "msg 7"]);
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut history = MessageHistory::new(0);
        history.add(entry(1, Utc::now()));
        assert!(history.is_empty());
    }
}
