//! The JSON-RPC method registry and the request pipeline:
//! rate-limit → permission → params → handler.

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use {
    chrono::{SecondsFormat, Utc},
    metrics::counter,
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    rpc::{self, Request, RpcError, error_codes},
    session::Session,
    state::GatewayCore,
};

mod admin;
mod channels;
mod comm;
mod info;

/// Context passed to every method handler.
pub struct MethodContext {
    pub request: Request,
    pub session: Arc<Session>,
    pub core: Arc<GatewayCore>,
}

pub type MethodResult = Result<Value, RpcError>;

type HandlerFn =
    Box<dyn Fn(MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>> + Send + Sync>;

struct MethodEntry {
    /// Capability the session must hold; `None` for any authenticated session.
    capability: Option<&'static str>,
    handler: HandlerFn,
}

/// The closed method set.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<&'static str, MethodEntry>,
}

macro_rules! method {
    ($registry:expr, $name:literal, $capability:expr, $handler:path) => {
        $registry.methods.insert(
            $name,
            MethodEntry {
                capability: $capability,
                handler: Box::new(|ctx| Box::pin($handler(ctx))),
            },
        );
    };
}

impl MethodRegistry {
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::default();
        // Auth
        method!(registry, "authenticate", None, admin::authenticate);
        // Communication
        method!(registry, "tell", Some("tell"), comm::tell);
        method!(registry, "emoteto", Some("tell"), comm::emoteto);
        // Channels
        method!(registry, "channel_send", Some("channel"), channels::channel_send);
        method!(registry, "channel_emote", Some("channel"), channels::channel_emote);
        method!(registry, "channel_join", Some("channel"), channels::channel_join);
        method!(registry, "channel_leave", Some("channel"), channels::channel_leave);
        method!(registry, "channel_list", Some("channel"), channels::channel_list);
        method!(registry, "channel_who", Some("channel"), channels::channel_who);
        method!(registry, "channel_history", Some("channel"), channels::channel_history);
        // Information
        method!(registry, "who", Some("info"), info::who);
        method!(registry, "finger", Some("info"), info::finger);
        method!(registry, "locate", Some("info"), info::locate);
        method!(registry, "mudlist", Some("info"), info::mudlist);
        // Administrative
        method!(registry, "ping", None, admin::ping);
        method!(registry, "heartbeat", None, admin::heartbeat);
        method!(registry, "status", None, admin::status);
        method!(registry, "stats", Some("admin"), admin::stats);
        method!(registry, "reconnect", Some("admin"), admin::reconnect);
        registry
    }

    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Run one authenticated request through the pipeline. `None` when no
    /// response is owed (notification).
    pub async fn dispatch(
        &self,
        core: &Arc<GatewayCore>,
        session: &Arc<Session>,
        request: Request,
    ) -> Option<String> {
        use std::sync::atomic::Ordering;

        let id = request.id.clone();
        let is_notification = request.is_notification();
        let respond = |text: String| if is_notification { None } else { Some(text) };

        session.touch();
        session.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        counter!("rpc_requests_total").increment(1);

        // Credentials grant a session for token_ttl_s at most; after that the
        // client has to authenticate again (on a fresh connection).
        let token_ttl = core.config.auth.token_ttl_s;
        if token_ttl > 0
            && session.uptime_seconds() >= i64::try_from(token_ttl).unwrap_or(i64::MAX)
        {
            core.sessions.remove(&session.id);
            core.subscriptions.unsubscribe_all(&session.id);
            counter!("rpc_session_expired_total").increment(1);
            return respond(rpc::error_response(
                &id,
                &RpcError::new(error_codes::SESSION_EXPIRED, "session expired"),
            ));
        }

        // Rate limit: one token per request, before any side effects.
        let admitted = session
            .limiter
            .lock()
            .map(|mut limiter| limiter.check(&request.method))
            .unwrap_or(false);
        if !admitted {
            session.metrics.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            counter!("rpc_rate_limited_total").increment(1);
            return respond(rpc::error_response(
                &id,
                &RpcError::new(error_codes::RATE_LIMIT_EXCEEDED, "rate limit exceeded"),
            ));
        }

        let Some(entry) = self.methods.get(request.method.as_str()) else {
            return respond(rpc::error_response(
                &id,
                &RpcError::new(
                    error_codes::METHOD_NOT_FOUND,
                    format!("method not found: {}", request.method),
                ),
            ));
        };

        if let Some(capability) = entry.capability
            && !session.has_permission(capability)
        {
            counter!("rpc_permission_denied_total").increment(1);
            return respond(rpc::error_response(
                &id,
                &RpcError::new(
                    error_codes::PERMISSION_DENIED,
                    format!("permission denied: {} requires {capability}", request.method),
                ),
            ));
        }

        debug!(method = %request.method, session_id = %session.id, "rpc: dispatch");
        let ctx = MethodContext {
            request,
            session: Arc::clone(session),
            core: Arc::clone(core),
        };
        match (entry.handler)(ctx).await {
            Ok(result) => respond(rpc::result_response(&id, &result)),
            Err(error) => {
                session.metrics.errors.fetch_add(1, Ordering::Relaxed);
                if error.code == error_codes::INTERNAL_ERROR {
                    warn!(code = error.code, message = %error.message, "rpc: internal error");
                }
                respond(rpc::error_response(&id, &error))
            },
        }
    }
}

/// Wall-clock timestamp used in RPC results.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_the_closed_method_set() {
        let registry = MethodRegistry::standard();
        for method in [
            "authenticate",
            "tell",
            "emoteto",
            "channel_send",
            "channel_emote",
            "channel_join",
            "channel_leave",
            "channel_list",
            "channel_who",
            "channel_history",
            "who",
            "finger",
            "locate",
            "mudlist",
            "ping",
            "status",
            "stats",
            "reconnect",
            "heartbeat",
        ] {
            assert!(registry.contains(method), "{method} missing");
        }
        assert_eq!(registry.methods.len(), 19);
        assert!(!registry.contains("rpc.discover"));
    }
}
