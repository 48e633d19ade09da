//! Client sessions: identity, permissions, outbound queue, transport binding.
//!
//! A session begins when a credential is accepted and may outlive its
//! transport: the queue keeps filling while disconnected, and an explicit
//! consumer task drains it whenever a transport is bound. A session with no
//! transport whose idle time exceeds the configured timeout is destroyed by
//! the sweeper. Reconnecting clients get a new session id and a fresh queue.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    chrono::{DateTime, Utc},
    dashmap::DashMap,
    metrics::{counter, gauge},
    tokio::sync::{Notify, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use mudgate_config::{RateLimitsConfig, SessionConfig};

use crate::{
    auth::{SessionLimiter, Verified},
    events::EventFilter,
    queue::{PriorityQueue, QueuedMessage},
};

#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub errors: AtomicU64,
    pub rate_limit_hits: AtomicU64,
    pub queue_dropped: AtomicU64,
}

pub struct Session {
    pub id: String,
    pub mud_name: String,
    pub permissions: Vec<String>,
    pub connected_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
    pub limiter: Mutex<SessionLimiter>,
    pub filter: Mutex<EventFilter>,
    last_activity: Mutex<Instant>,
    queue: Mutex<PriorityQueue>,
    default_queue_ttl: Duration,
    transport: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Wakes the drain task when the queue gains a message or a transport
    /// attaches.
    drain_wakeup: Notify,
    /// Cancelled when the session is destroyed; stops the drain task.
    pub drain_cancel: CancellationToken,
}

impl Session {
    #[must_use]
    pub fn has_permission(&self, capability: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == "*" || p == capability)
    }

    pub fn touch(&self) {
        if let Ok(mut guard) = self.last_activity.lock() {
            *guard = Instant::now();
        }
    }

    #[must_use]
    pub fn idle(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|guard| guard.elapsed())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }

    // ── Transport binding ────────────────────────────────────────────────

    /// Bind a transport writer. Anything already queued becomes eligible for
    /// delivery immediately.
    pub fn attach_transport(&self, sender: mpsc::UnboundedSender<String>) {
        if let Ok(mut guard) = self.transport.lock() {
            *guard = Some(sender);
        }
        self.drain_wakeup.notify_one();
    }

    pub fn detach_transport(&self) {
        if let Ok(mut guard) = self.transport.lock() {
            *guard = None;
        }
        self.touch();
    }

    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.transport.lock().is_ok_and(|guard| guard.is_some())
    }

    /// Direct write, bypassing the queue — used for RPC responses, which are
    /// only meaningful on the transport that carried the request.
    pub fn send_now(&self, text: &str) -> bool {
        let sender = match self.transport.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sender {
            Some(sender) if sender.send(text.to_owned()).is_ok() => {
                self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                true
            },
            _ => false,
        }
    }

    // ── Outbound queue ───────────────────────────────────────────────────

    /// Queue a notification at `priority`; `ttl == None` applies the
    /// session default.
    pub fn enqueue(&self, content: String, priority: u8, ttl: Option<Duration>) -> bool {
        let ttl = ttl.or(Some(self.default_queue_ttl));
        let accepted = match self.queue.lock() {
            Ok(mut queue) => queue.put(QueuedMessage::new(content, priority, ttl)),
            Err(_) => false,
        };
        if accepted {
            self.drain_wakeup.notify_one();
        } else {
            self.metrics.queue_dropped.fetch_add(1, Ordering::Relaxed);
            counter!("session_queue_refused_total").increment(1);
        }
        accepted
    }

    /// Queue a notification that must never expire (reconnect notices).
    pub fn enqueue_durable(&self, content: String, priority: u8) -> bool {
        let accepted = match self.queue.lock() {
            Ok(mut queue) => queue.put(QueuedMessage {
                ttl: None,
                ..QueuedMessage::new(content, priority, None)
            }),
            Err(_) => false,
        };
        if accepted {
            self.drain_wakeup.notify_one();
        }
        accepted
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn purge_expired(&self) -> usize {
        self.queue
            .lock()
            .map(|mut queue| queue.purge_expired())
            .unwrap_or(0)
    }

    /// The consumer task: drain in priority order while a transport is
    /// attached; suspend (without destroying the queue) when it detaches.
    /// On send failure the message returns to the head of its band with
    /// `retry_count` bumped; past `max_retries` it is dropped and counted.
    pub async fn run_drain(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.drain_step();
            tokio::select! {
                () = cancel.cancelled() => return,
                () = self.drain_wakeup.notified() => {},
            }
        }
    }

    fn drain_step(&self) {
        loop {
            let sender = match self.transport.lock() {
                Ok(guard) => guard.clone(),
                Err(_) => return,
            };
            let Some(sender) = sender else { return };

            let message = match self.queue.lock() {
                Ok(mut queue) => queue.get(),
                Err(_) => return,
            };
            let Some(mut message) = message else { return };

            if sender.send(message.content.clone()).is_ok() {
                self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            // Transport died mid-drain.
            message.retry_count += 1;
            if message.can_retry() {
                if let Ok(mut queue) = self.queue.lock() {
                    queue.requeue_front(message);
                }
            } else {
                self.metrics.queue_dropped.fetch_add(1, Ordering::Relaxed);
                counter!("session_messages_dropped_total").increment(1);
            }
            self.detach_transport();
            return;
        }
    }
}

// ── Session manager ──────────────────────────────────────────────────────────

/// Owns the session table; the only component that mutates it.
pub struct SessionManager {
    session_config: SessionConfig,
    rate_limits: RateLimitsConfig,
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(session_config: SessionConfig, rate_limits: RateLimitsConfig) -> Self {
        Self {
            session_config,
            rate_limits,
            sessions: DashMap::new(),
        }
    }

    /// Mint a session for a verified credential. Reconnections always get a
    /// fresh id and queue.
    #[must_use]
    pub fn create(&self, verified: &Verified) -> Arc<Session> {
        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            mud_name: verified.mud_name.clone(),
            permissions: verified.permissions.clone(),
            connected_at: Utc::now(),
            metrics: SessionMetrics::default(),
            limiter: Mutex::new(SessionLimiter::new(
                &self.rate_limits,
                verified.rate_limit_override,
            )),
            filter: Mutex::new(EventFilter::default()),
            last_activity: Mutex::new(Instant::now()),
            queue: Mutex::new(PriorityQueue::new(self.session_config.max_queue_size)),
            default_queue_ttl: Duration::from_secs(self.session_config.queue_ttl_s),
            transport: Mutex::new(None),
            drain_wakeup: Notify::new(),
            drain_cancel: CancellationToken::new(),
        });
        self.sessions.insert(session.id.clone(), Arc::clone(&session));
        gauge!("sessions_active").set(self.sessions.len() as f64);
        info!(session_id = %session.id, mud_name = %session.mud_name, "session created");
        session
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|e| Arc::clone(&e))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(session_id).map(|(_, s)| s);
        if let Some(session) = &removed {
            session.drain_cancel.cancel();
        }
        gauge!("sessions_active").set(self.sessions.len() as f64);
        removed
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| Arc::clone(&e)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// One sweep pass: purge expired queue entries everywhere, then destroy
    /// sessions that are transportless and idle past the timeout. Returns the
    /// ids destroyed so the caller can clean their subscriptions.
    pub fn sweep(&self) -> Vec<String> {
        let timeout = Duration::from_secs(self.session_config.timeout_s);
        let mut destroyed = Vec::new();

        for session in self.all() {
            let purged = session.purge_expired();
            if purged > 0 {
                debug!(session_id = %session.id, purged, "session sweep: expired messages");
            }
            if !session.has_transport() && session.idle() > timeout {
                destroyed.push(session.id.clone());
            }
        }
        for id in &destroyed {
            if let Some((_, session)) = self.sessions.remove(id) {
                session.drain_cancel.cancel();
            }
            info!(session_id = %id, "session destroyed: idle with no transport");
        }
        if !destroyed.is_empty() {
            gauge!("sessions_active").set(self.sessions.len() as f64);
        }
        destroyed
    }
}
