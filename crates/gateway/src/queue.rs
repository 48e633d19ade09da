//! Per-session bounded priority queue: ten bands, FIFO within a band,
//! TTL expiry, and bounded retries.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

const BANDS: usize = 10;

/// A serialized notification waiting for delivery.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub content: String,
    /// 1..=10, 1 highest precedence.
    pub priority: u8,
    pub enqueued_at: Instant,
    pub ttl: Option<Duration>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl QueuedMessage {
    #[must_use]
    pub fn new(content: String, priority: u8, ttl: Option<Duration>) -> Self {
        Self {
            content,
            priority: priority.clamp(1, 10),
            enqueued_at: Instant::now(),
            ttl,
            retry_count: 0,
            max_retries: 3,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.enqueued_at.elapsed() > ttl)
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Bounded ten-band queue. When full, expired entries are evicted first;
/// failing that, the lowest-priority oldest entry makes room unless the
/// incoming message is strictly worse, in which case ingress is refused.
#[derive(Debug)]
pub struct PriorityQueue {
    max_size: usize,
    bands: [VecDeque<QueuedMessage>; BANDS],
    total: usize,
    pub expired_total: u64,
    pub dropped_total: u64,
}

impl PriorityQueue {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            bands: std::array::from_fn(|_| VecDeque::new()),
            total: 0,
            expired_total: 0,
            dropped_total: 0,
        }
    }

    fn band_index(priority: u8) -> usize {
        usize::from(priority.clamp(1, 10)) - 1
    }

    /// Returns false when the queue refused the message.
    pub fn put(&mut self, message: QueuedMessage) -> bool {
        if self.total >= self.max_size {
            self.purge_expired();
        }
        if self.total >= self.max_size && !self.make_room(message.priority) {
            self.dropped_total += 1;
            return false;
        }
        self.bands[Self::band_index(message.priority)].push_back(message);
        self.total += 1;
        true
    }

    /// Drop the lowest-priority oldest entry if the incoming priority is not
    /// strictly worse than the victim's.
    fn make_room(&mut self, incoming_priority: u8) -> bool {
        for band in (0..BANDS).rev() {
            if let Some(victim) = self.bands[band].front() {
                if incoming_priority > victim.priority {
                    return false;
                }
                self.bands[band].pop_front();
                self.total -= 1;
                self.dropped_total += 1;
                return true;
            }
        }
        false
    }

    /// Highest-priority non-expired entry; expired entries encountered along
    /// the way are discarded.
    pub fn get(&mut self) -> Option<QueuedMessage> {
        for band in 0..BANDS {
            while let Some(message) = self.bands[band].pop_front() {
                self.total -= 1;
                if message.is_expired() {
                    self.expired_total += 1;
                    continue;
                }
                return Some(message);
            }
        }
        None
    }

    /// Non-destructive [`Self::get`]; still discards expired entries.
    pub fn peek(&mut self) -> Option<&QueuedMessage> {
        let mut found = None;
        for band in 0..BANDS {
            while let Some(front) = self.bands[band].front() {
                if front.is_expired() {
                    self.bands[band].pop_front();
                    self.total -= 1;
                    self.expired_total += 1;
                    continue;
                }
                found = Some(band);
                break;
            }
            if found.is_some() {
                break;
            }
        }
        self.bands[found?].front()
    }

    /// Put a message back at the head of its band after a failed send.
    pub fn requeue_front(&mut self, message: QueuedMessage) {
        self.bands[Self::band_index(message.priority)].push_front(message);
        self.total += 1;
    }

    /// Drop every expired entry; returns how many went.
    pub fn purge_expired(&mut self) -> usize {
        let mut purged = 0;
        for band in &mut self.bands {
            let before = band.len();
            band.retain(|m| !m.is_expired());
            purged += before - band.len();
        }
        self.total -= purged;
        self.expired_total += purged as u64;
        purged
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: &str, priority: u8) -> QueuedMessage {
        QueuedMessage::new(body.into(), priority, None)
    }

    #[test]
    fn test_priority_order_and_fifo_within_band() {
        let mut queue = PriorityQueue::new(10);
        assert!(queue.put(msg("low-a", 7)));
        assert!(queue.put(msg("high", 2)));
        assert!(queue.put(msg("low-b", 7)));
        assert!(queue.put(msg("mid", 5)));

        let order: Vec<String> = std::iter::from_fn(|| queue.get().map(|m| m.content)).collect();
        assert_eq!(order, vec!["high", "mid", "low-a", "low-b"]);
    }

    #[test]
    fn test_peek_returns_most_urgent() {
        let mut queue = PriorityQueue::new(10);
        queue.put(msg("low", 9));
        queue.put(msg("high", 1));
        assert_eq!(queue.peek().unwrap().content, "high");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_full_queue_drops_lowest_priority_oldest() {
        let mut queue = PriorityQueue::new(2);
        queue.put(msg("old-low", 8));
        queue.put(msg("new-low", 8));
        // Equal priority is "not strictly worse": the oldest low entry goes.
        assert!(queue.put(msg("urgent", 8)));
        assert_eq!(queue.len(), 2);
        let order: Vec<String> = std::iter::from_fn(|| queue.get().map(|m| m.content)).collect();
        assert_eq!(order, vec!["new-low", "urgent"]);
    }

    #[test]
    fn test_full_queue_refuses_strictly_worse() {
        let mut queue = PriorityQueue::new(2);
        queue.put(msg("a", 3));
        queue.put(msg("b", 3));
        assert!(!queue.put(msg("worse", 9)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_total, 1);
    }

    #[test]
    fn test_expired_entries_are_discarded_on_get() {
        let mut queue = PriorityQueue::new(10);
        let mut stale = msg("stale", 1);
        stale.ttl = Some(Duration::ZERO);
        stale.enqueued_at = Instant::now() - Duration::from_secs(1);
        queue.put(stale);
        queue.put(msg("fresh", 5));

        let got = queue.get().unwrap();
        assert_eq!(got.content, "fresh");
        assert_eq!(queue.expired_total, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_evicts_expired_before_dropping() {
        let mut queue = PriorityQueue::new(2);
        let mut stale = msg("stale", 1);
        stale.ttl = Some(Duration::ZERO);
        stale.enqueued_at = Instant::now() - Duration::from_secs(1);
        queue.put(stale);
        queue.put(msg("keep", 5));
        assert!(queue.put(msg("incoming", 9)));
        let order: Vec<String> = std::iter::from_fn(|| queue.get().map(|m| m.content)).collect();
        assert_eq!(order, vec!["keep", "incoming"]);
    }

    #[test]
    fn test_requeue_front_preserves_band_head() {
        let mut queue = PriorityQueue::new(10);
        queue.put(msg("first", 5));
        queue.put(msg("second", 5));
        let mut popped = queue.get().unwrap();
        popped.retry_count += 1;
        queue.requeue_front(popped);
        assert_eq!(queue.get().unwrap().content, "first");
        assert_eq!(queue.get().unwrap().content, "second");
    }

    #[test]
    fn test_purge_expired_counts() {
        let mut queue = PriorityQueue::new(10);
        for n in 0..3 {
            let mut stale = msg(&format!("stale-{n}"), 4);
            stale.ttl = Some(Duration::ZERO);
            stale.enqueued_at = Instant::now() - Duration::from_secs(1);
            queue.put(stale);
        }
        queue.put(msg("fresh", 4));
        assert_eq!(queue.purge_expired(), 3);
        assert_eq!(queue.len(), 1);
    }
}
