//! Administrative methods and the authenticated `authenticate` no-op.

use std::sync::atomic::Ordering;

use serde_json::json;

use crate::methods::{MethodContext, MethodResult, now_timestamp};

/// Reached only on an already-authenticated session (the connection layer
/// intercepts the first `authenticate`).
pub async fn authenticate(ctx: MethodContext) -> MethodResult {
    Ok(json!({
        "status": "authenticated",
        "mud_name": ctx.session.mud_name,
        "session_id": ctx.session.id,
    }))
}

pub async fn ping(_ctx: MethodContext) -> MethodResult {
    Ok(json!({ "pong": true, "timestamp": now_timestamp() }))
}

pub async fn heartbeat(ctx: MethodContext) -> MethodResult {
    ctx.session.touch();
    Ok(json!({ "status": "ok", "timestamp": now_timestamp() }))
}

pub async fn status(ctx: MethodContext) -> MethodResult {
    Ok(json!({
        "connected": ctx.core.link.is_ready(),
        "router": ctx.core.link.current_router(),
        "mud_name": ctx.session.mud_name,
        "session_id": ctx.session.id,
        "uptime": ctx.session.uptime_seconds(),
    }))
}

pub async fn stats(ctx: MethodContext) -> MethodResult {
    let core = &ctx.core;
    let (muds, channels, users) = core.state.counts();
    let link_stats = core.link.stats();
    let bridge_stats = &core.bridge.stats;

    let session_stats: Vec<_> = core
        .sessions
        .all()
        .into_iter()
        .map(|session| {
            json!({
                "session_id": session.id,
                "mud_name": session.mud_name,
                "queue_len": session.queue_len(),
                "messages_sent": session.metrics.messages_sent.load(Ordering::Relaxed),
                "messages_received": session.metrics.messages_received.load(Ordering::Relaxed),
                "errors": session.metrics.errors.load(Ordering::Relaxed),
                "rate_limit_hits": session.metrics.rate_limit_hits.load(Ordering::Relaxed),
                "uptime_seconds": session.uptime_seconds(),
            })
        })
        .collect();

    Ok(json!({
        "gateway_connected": core.link.is_ready(),
        "router": core.link.current_router(),
        "uptime_seconds": core.started_at.elapsed().as_secs(),
        "link": {
            "state": core.link.state().as_str(),
            "packets_sent": link_stats.packets_sent.load(Ordering::Relaxed),
            "packets_received": link_stats.packets_received.load(Ordering::Relaxed),
            "reconnects": link_stats.reconnects.load(Ordering::Relaxed),
            "decode_errors": link_stats.decode_errors.load(Ordering::Relaxed),
        },
        "dispatcher": core.dispatcher.stats.snapshot(),
        "bridge": {
            "packets_processed": bridge_stats.packets_processed.load(Ordering::Relaxed),
            "events_generated": bridge_stats.events_generated.load(Ordering::Relaxed),
            "events_dispatched": bridge_stats.events_dispatched.load(Ordering::Relaxed),
            "events_dropped": bridge_stats.events_dropped.load(Ordering::Relaxed),
        },
        "state": {
            "muds": muds,
            "channels": channels,
            "users": users,
            "mudlist_id": core.state.mudlist_id(),
            "chanlist_id": core.state.chanlist_id(),
            "pending_locates": core.state.locates.pending(),
        },
        "sessions": {
            "active": core.sessions.len(),
            "detail": session_stats,
        },
    }))
}

pub async fn reconnect(ctx: MethodContext) -> MethodResult {
    ctx.core.link.reconnect().await;
    Ok(json!({ "status": "reconnecting" }))
}
