//! Channel methods: send/emote, join/leave, list/who/history.

use {
    chrono::{DateTime, Utc},
    mudgate_packet::{
        ChannelListenPacket, ChannelMessagePacket, ChannelWhoPacket, Header, Packet, PacketKind,
    },
    mudgate_services::RouteError,
    mudgate_state::ChannelEntry,
    serde_json::{Value, json},
};

use crate::{
    events::{Event, EventType},
    methods::{MethodContext, MethodResult},
    rpc::{RpcError, error_codes},
};

pub async fn channel_send(ctx: MethodContext) -> MethodResult {
    send_channel(ctx, PacketKind::ChannelM, "message", "channel").await
}

pub async fn channel_emote(ctx: MethodContext) -> MethodResult {
    send_channel(ctx, PacketKind::ChannelE, "emote", "channel_emote").await
}

async fn send_channel(
    ctx: MethodContext,
    kind: PacketKind,
    body_param: &str,
    id_prefix: &str,
) -> MethodResult {
    let channel = ctx.request.str_param("channel")?;
    let message = ctx.request.str_param(body_param)?;
    let from_user = ctx
        .request
        .opt_str_param("from_user")
        .unwrap_or_else(|| "Someone".into());
    let visname = ctx
        .request
        .opt_str_param("visname")
        .unwrap_or_else(|| from_user.clone());

    if !ctx.core.state.has_channel(&channel) {
        return Ok(json!({
            "status": "failed",
            "error": "unk-channel",
            "message": format!("Unknown channel: {channel}"),
        }));
    }
    if message.len() > ctx.core.config.channels.max_message_bytes {
        return Err(RpcError::invalid_params("message too long"));
    }

    let mud_name = ctx.core.config.mud.name.clone();
    ctx.core.state.session_upsert(&mud_name, &from_user, |s| {
        s.is_online = true;
        s.last_activity = Utc::now();
    });

    let packet = Packet::ChannelMessage(ChannelMessagePacket {
        kind,
        header: Header::new(mud_name.as_str(), from_user.as_str(), "*", "*"),
        channel: channel.clone(),
        visname,
        message,
    });

    match ctx.core.dispatcher.route_outbound(packet).await {
        Ok(()) => Ok(json!({
            "status": "sent",
            "message_id": format!("{id_prefix}_{channel}_{}", Utc::now().timestamp_millis()),
        })),
        Err(RouteError::LinkDown) => Err(RpcError::new(
            error_codes::GATEWAY_ERROR,
            "router link is down",
        )),
        Err(route_error) => Ok(json!({
            "status": "failed",
            "error": route_error.code(),
            "message": route_error.to_string(),
        })),
    }
}

pub async fn channel_join(ctx: MethodContext) -> MethodResult {
    let channel = ctx.request.str_param("channel")?;
    let listen_only = ctx.request.bool_param("listen_only", false);
    let user_name = ctx.request.opt_str_param("user_name");

    ctx.core
        .subscriptions
        .subscribe(&ctx.session.id, &channel, listen_only);

    if let Some(user) = &user_name {
        let mud_name = ctx.core.config.mud.name.clone();
        ctx.core.state.session_upsert(&mud_name, user, |s| {
            s.is_online = true;
            s.last_activity = Utc::now();
        });
    }

    // Tune the mud in at the router unless the client only listens locally.
    if !listen_only {
        let packet = Packet::ChannelListen(ChannelListenPacket {
            header: Header::new(
                ctx.core.config.mud.name.as_str(),
                user_name.as_deref().unwrap_or_default(),
                "*",
                "",
            ),
            channel: channel.clone(),
            joining: true,
        });
        let _ = ctx.core.dispatcher.route_outbound(packet).await;
    }

    let event = Event::new(EventType::ChannelJoined, json!({ "channel": channel }));
    ctx.session
        .enqueue(event.to_notification(), event.priority, event.ttl);

    Ok(json!({ "status": "joined", "channel": channel }))
}

pub async fn channel_leave(ctx: MethodContext) -> MethodResult {
    let channel = ctx.request.str_param("channel")?;
    let user_name = ctx.request.opt_str_param("user_name");

    ctx.core.subscriptions.unsubscribe(&ctx.session.id, &channel);

    let packet = Packet::ChannelListen(ChannelListenPacket {
        header: Header::new(
            ctx.core.config.mud.name.as_str(),
            user_name.as_deref().unwrap_or_default(),
            "*",
            "",
        ),
        channel: channel.clone(),
        joining: false,
    });
    let _ = ctx.core.dispatcher.route_outbound(packet).await;

    let event = Event::new(EventType::ChannelLeft, json!({ "channel": channel }));
    ctx.session
        .enqueue(event.to_notification(), event.priority, event.ttl);

    Ok(json!({ "status": "left", "channel": channel }))
}

pub async fn channel_list(ctx: MethodContext) -> MethodResult {
    let filter = ctx.request.params.get("filter").cloned().unwrap_or(Value::Null);
    let channels: Vec<Value> = ctx
        .core
        .state
        .list_channels()
        .into_iter()
        .filter(|entry| channel_matches(entry, &filter))
        .map(|entry| channel_to_json(&entry, &ctx))
        .collect();

    Ok(json!({
        "status": "success",
        "count": channels.len(),
        "channels": channels,
        "subscribed_channels": ctx.core.subscriptions.subscriptions_of(&ctx.session.id),
    }))
}

fn channel_matches(entry: &ChannelEntry, filter: &Value) -> bool {
    let Some(filter) = filter.as_object() else {
        return true;
    };
    if let Some(wanted) = filter.get("type").and_then(Value::as_str) {
        let actual = match entry.channel_type {
            mudgate_state::ChannelType::Public => "public",
            mudgate_state::ChannelType::Private => "private",
        };
        if actual != wanted {
            return false;
        }
    }
    if let Some(owner) = filter.get("owner").and_then(Value::as_str)
        && entry.owner_mud != owner
    {
        return false;
    }
    true
}

fn channel_to_json(entry: &ChannelEntry, ctx: &MethodContext) -> Value {
    json!({
        "name": entry.name,
        "type": entry.channel_type,
        "owner": entry.owner_mud,
        "member_muds": entry.member_muds,
        "subscriber_count": ctx.core.subscriptions.subscriber_count(&entry.name),
    })
}

pub async fn channel_who(ctx: MethodContext) -> MethodResult {
    let channel = ctx.request.str_param("channel")?;

    // Ask the network; answer with what we know now.
    let packet = Packet::ChannelWho(ChannelWhoPacket {
        header: Header::new(ctx.core.config.mud.name.as_str(), "", "*", ""),
        channel: channel.clone(),
        users: Vec::new(),
    });
    let _ = ctx.core.dispatcher.route_outbound(packet).await;

    let members = ctx
        .core
        .state
        .get_channel(&channel)
        .map(|entry| entry.member_muds)
        .unwrap_or_default();

    Ok(json!({ "status": "success", "channel": channel, "members": members }))
}

pub async fn channel_history(ctx: MethodContext) -> MethodResult {
    let channel = ctx.request.str_param("channel")?;
    let limit = usize::try_from(ctx.request.u64_param("limit").unwrap_or(50))
        .unwrap_or(50)
        .min(100);
    let before = parse_time(&ctx.request.params, "before")?;
    let after = parse_time(&ctx.request.params, "after")?;

    match ctx.core.state.history_read(&channel, limit, before, after) {
        Some(messages) => Ok(json!({
            "status": "success",
            "count": messages.len(),
            "messages": messages,
        })),
        None => Ok(json!({
            "status": "failed",
            "error": "unk-channel",
            "message": format!("Unknown channel: {channel}"),
        })),
    }
}

fn parse_time(params: &Value, name: &str) -> Result<Option<DateTime<Utc>>, RpcError> {
    match params.get(name).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| RpcError::invalid_params(format!("{name} must be an RFC 3339 timestamp"))),
    }
}
