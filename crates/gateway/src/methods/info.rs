//! Information queries: who, finger, locate, mudlist.
//!
//! `who` and `finger` transmit the request packet and answer from the reply
//! cache, which inbound replies populate — clients poll or wait for the next
//! call. `locate` alone blocks on the pending-request table, resolving on the
//! first reply or its deadline.

use std::time::Duration;

use {
    mudgate_packet::{FingerReqPacket, Header, LocateReqPacket, Packet, WhoReqPacket},
    mudgate_state::{CacheKind, MudEntry},
    mudgate_wire::{Value as WireValue, ValueMap},
    serde_json::{Value, json},
};

use crate::methods::{MethodContext, MethodResult};

const LOCATE_DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const LOCATE_MAX_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn who(ctx: MethodContext) -> MethodResult {
    let target_mud = ctx.request.str_param("target_mud")?;
    let filter = wire_map(ctx.request.params.get("filters"));

    let packet = Packet::WhoReq(WhoReqPacket {
        header: Header::new(ctx.core.config.mud.name.as_str(), "", target_mud.as_str(), ""),
        filter,
    });
    let _ = ctx.core.dispatcher.route_outbound(packet).await;

    let users = ctx
        .core
        .state
        .cache
        .get(CacheKind::Who, &target_mud)
        .and_then(|payload| payload.get("users").cloned())
        .unwrap_or_else(|| json!([]));
    let count = users.as_array().map_or(0, Vec::len);

    Ok(json!({
        "status": "success",
        "mud_name": target_mud,
        "users": users,
        "count": count,
    }))
}

pub async fn finger(ctx: MethodContext) -> MethodResult {
    let target_mud = ctx.request.str_param("target_mud")?;
    let target_user = ctx.request.str_param("target_user")?;

    let packet = Packet::FingerReq(FingerReqPacket {
        header: Header::new(ctx.core.config.mud.name.as_str(), "", target_mud.as_str(), ""),
        username: target_user.clone(),
    });
    let _ = ctx.core.dispatcher.route_outbound(packet).await;

    let key = mudgate_services::info::finger_cache_key(&target_mud, &target_user);
    let user_info = ctx
        .core
        .state
        .cache
        .get(CacheKind::Finger, &key)
        .unwrap_or_else(|| json!({}));

    Ok(json!({ "status": "success", "user_info": user_info }))
}

pub async fn locate(ctx: MethodContext) -> MethodResult {
    let target_user = ctx.request.str_param("target_user")?;
    let timeout = ctx
        .request
        .u64_param("timeout")
        .map_or(LOCATE_DEFAULT_TIMEOUT, Duration::from_secs)
        .min(LOCATE_MAX_TIMEOUT);

    let handle = ctx.core.state.locates.register(&target_user);

    let packet = Packet::LocateReq(LocateReqPacket {
        header: Header::new(ctx.core.config.mud.name.as_str(), "", "*", ""),
        username: target_user.clone(),
    });
    let _ = ctx.core.dispatcher.route_outbound(packet).await;

    let located = match ctx.core.state.locates.wait(handle, timeout).await {
        Some(result) => Some(json!(result)),
        // No live reply before the deadline; fall back to a fresh cache hit.
        None => ctx.core.state.cache.get(CacheKind::Locate, &target_user),
    };

    let locations: Vec<Value> = located.into_iter().collect();
    Ok(json!({
        "status": "success",
        "user_name": target_user,
        "found": !locations.is_empty(),
        "count": locations.len(),
        "locations": locations,
    }))
}

pub async fn mudlist(ctx: MethodContext) -> MethodResult {
    let filter = ctx.request.params.get("filter").cloned().unwrap_or(Value::Null);
    let muds: Vec<Value> = ctx
        .core
        .state
        .list_muds()
        .into_iter()
        .filter(|mud| mud_matches(mud, &filter))
        .map(|mud| mud_to_json(&mud))
        .collect();

    Ok(json!({ "status": "success", "count": muds.len(), "muds": muds }))
}

fn mud_matches(mud: &MudEntry, filter: &Value) -> bool {
    let Some(filter) = filter.as_object() else {
        return true;
    };
    if let Some(status) = filter.get("status").and_then(Value::as_str)
        && json!(mud.status) != json!(status)
    {
        return false;
    }
    if let Some(driver) = filter.get("driver").and_then(Value::as_str)
        && mud.driver != driver
    {
        return false;
    }
    if let Some(service) = filter.get("has_service").and_then(Value::as_str)
        && !mud.has_service(service)
    {
        return false;
    }
    true
}

fn mud_to_json(mud: &MudEntry) -> Value {
    let services: serde_json::Map<String, Value> = mud
        .services
        .iter()
        .map(|(name, on)| (name.clone(), json!(on)))
        .collect();
    json!({
        "name": mud.name,
        "status": mud.status,
        "driver": mud.driver,
        "mudlib": mud.mudlib,
        "base_mudlib": mud.base_mudlib,
        "mud_type": mud.mud_type,
        "open_status": mud.open_status,
        "admin_email": mud.admin_email,
        "host": mud.host,
        "player_port": mud.player_port,
        "tcp_port": mud.tcp_port,
        "udp_port": mud.udp_port,
        "services": services,
        "last_seen": mud.last_seen,
    })
}

/// Client filter objects become wire mappings; only strings and integers
/// survive the trip.
fn wire_map(value: Option<&Value>) -> ValueMap {
    let mut map = ValueMap::new();
    if let Some(object) = value.and_then(Value::as_object) {
        for (key, entry) in object {
            match entry {
                Value::String(s) => map.insert(key.clone(), WireValue::Str(s.clone())),
                Value::Number(n) => {
                    if let Some(int) = n.as_i64().and_then(|n| i32::try_from(n).ok()) {
                        map.insert(key.clone(), WireValue::Int(int));
                    }
                },
                _ => {},
            }
        }
    }
    map
}
