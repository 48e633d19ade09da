//! Shared gateway state: every collaborator the method handlers and
//! transports need, wired once at startup and passed by `Arc`.

use std::{sync::Arc, time::Instant};

use {
    mudgate_config::MudgateConfig,
    mudgate_link::LinkHandle,
    mudgate_services::Dispatcher,
    mudgate_state::StateStore,
    tokio_util::sync::CancellationToken,
};

use crate::{
    auth::AuthEngine,
    bridge::EventBridge,
    session::SessionManager,
    subscriptions::SubscriptionManager,
};

pub struct GatewayCore {
    pub config: MudgateConfig,
    pub started_at: Instant,
    pub state: Arc<StateStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub link: LinkHandle,
    pub sessions: Arc<SessionManager>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub bridge: Arc<EventBridge>,
    pub auth: AuthEngine,
    /// Root shutdown signal shared by every long-lived task.
    pub cancel: CancellationToken,
}

impl GatewayCore {
    /// Spawn the queue consumer for a freshly-created session.
    pub fn spawn_drain(&self, session: &Arc<crate::session::Session>) {
        let cancel = session.drain_cancel.clone();
        tokio::spawn(Arc::clone(session).run_drain(cancel));
    }
}
