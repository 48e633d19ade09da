//! Local side of the who/finger/locate information services.

use {
    chrono::Utc,
    mudgate_packet::{FingerInfo, Packet, WhoUser},
    mudgate_state::{CacheKind, LocateResult, StateStore, UserSession},
    mudgate_wire::{Value, ValueMap},
    serde_json::json,
    tracing::debug,
};

use crate::ServiceOutcome;

/// Cache key for a finger record.
#[must_use]
pub fn finger_cache_key(mud: &str, user: &str) -> String {
    format!("{}:{}", mud.to_lowercase(), user.to_lowercase())
}

pub fn handle(mud_name: &str, hide_ip: bool, state: &StateStore, packet: &Packet) -> ServiceOutcome {
    match packet {
        Packet::WhoReq(req) => {
            let now = Utc::now();
            let users: Vec<WhoUser> = state
                .online_users()
                .into_iter()
                .filter(|u| matches_filter(u, &req.filter))
                .map(|u| WhoUser {
                    name: u.user_name.clone(),
                    idle_seconds: u.idle_seconds(now),
                    level: u.level,
                    extra: u.title.clone(),
                })
                .collect();
            debug!(from = %req.header.originator_mud, count = users.len(), "who: request served");
            ServiceOutcome::reply(req.make_reply(mud_name, users))
        },

        Packet::WhoReply(reply) => {
            // We asked; remember the roster for the API to read.
            let payload = json!({
                "mud_name": reply.header.originator_mud,
                "users": reply.users,
            });
            state
                .cache
                .put(CacheKind::Who, &reply.header.originator_mud, payload);
            ServiceOutcome::ignore()
        },

        Packet::FingerReq(req) => match state.session_get(&req.username) {
            Some(user) => {
                let info = finger_info(&user, hide_ip);
                state.cache.put(
                    CacheKind::Finger,
                    &finger_cache_key(mud_name, &req.username),
                    json!(info),
                );
                ServiceOutcome::reply(req.make_reply(mud_name, info))
            },
            None => ServiceOutcome::reply(packet.error_reply(
                mud_name,
                "unk-user",
                format!("Unknown user: {}", req.username),
            )),
        },

        Packet::FingerReply(reply) => {
            let key = finger_cache_key(&reply.header.originator_mud, &reply.info.visname);
            state.cache.put(CacheKind::Finger, &key, json!(reply.info));
            ServiceOutcome::ignore()
        },

        Packet::LocateReq(req) => match state.session_get(&req.username) {
            Some(user) if user.is_online => {
                let status = if user.status_message.is_empty() {
                    "online"
                } else {
                    &user.status_message
                };
                ServiceOutcome::reply(req.make_reply(
                    mud_name,
                    &user.user_name,
                    user.idle_seconds(Utc::now()),
                    status,
                ))
            },
            // Not here: broadcast locate requests get no negative replies.
            _ => ServiceOutcome::ignore(),
        },

        Packet::LocateReply(reply) => {
            let result = LocateResult {
                mud_name: reply.located_mud.clone(),
                user_name: reply.located_user.clone(),
                idle_seconds: reply.idle_seconds,
                status: reply.status.clone(),
            };
            state.cache.put(
                CacheKind::Locate,
                &reply.located_user,
                json!(result),
            );
            state.locates.complete(&reply.located_user, &result);
            ServiceOutcome::ignore()
        },

        _ => ServiceOutcome::ignore(),
    }
}

fn finger_info(user: &UserSession, hide_ip: bool) -> FingerInfo {
    FingerInfo {
        visname: user.user_name.clone(),
        title: user.title.clone(),
        real_name: String::new(),
        email: user.website.clone().unwrap_or_default(),
        login_time: user.login_time.to_rfc3339(),
        idle_seconds: user.idle_seconds(Utc::now()),
        ip_addr: if hide_ip {
            String::new()
        } else {
            user.ip_address.clone().unwrap_or_default()
        },
        level: user.level,
        extra: user.status_message.clone(),
    }
}

fn matches_filter(user: &UserSession, filter: &ValueMap) -> bool {
    if let Some(min) = filter.get("level_min").map(Value::coerce_int)
        && user.level < min
    {
        return false;
    }
    if let Some(max) = filter.get("level_max").map(Value::coerce_int)
        && user.level > max
    {
        return false;
    }
    if let Some(race) = filter.get("race").and_then(Value::as_str)
        && user.race.as_deref() != Some(race)
    {
        return false;
    }
    if let Some(guild) = filter.get("guild").and_then(Value::as_str)
        && user.guild.as_deref() != Some(guild)
    {
        return false;
    }
    true
}
