//! `tell` and `emoteto`.

use {
    chrono::Utc,
    mudgate_packet::{Header, Packet, PacketKind, TellPacket},
    mudgate_services::RouteError,
    serde_json::json,
};

use crate::{
    methods::{MethodContext, MethodResult},
    rpc::{RpcError, error_codes},
};

pub async fn tell(ctx: MethodContext) -> MethodResult {
    send_private(ctx, PacketKind::Tell, "message", "tell").await
}

pub async fn emoteto(ctx: MethodContext) -> MethodResult {
    send_private(ctx, PacketKind::Emoteto, "emote", "emoteto").await
}

async fn send_private(
    ctx: MethodContext,
    kind: PacketKind,
    body_param: &str,
    id_prefix: &str,
) -> MethodResult {
    let target_mud = ctx.request.str_param("target_mud")?;
    let target_user = ctx.request.str_param("target_user")?;
    let message = ctx.request.str_param(body_param)?;
    let from_user = ctx
        .request
        .opt_str_param("from_user")
        .unwrap_or_else(|| "Someone".into());
    let visname = ctx
        .request
        .opt_str_param("visname")
        .unwrap_or_else(|| from_user.clone());

    // Sending on behalf of a user keeps that user visible to who/finger.
    let mud_name = ctx.core.config.mud.name.clone();
    ctx.core.state.session_upsert(&mud_name, &from_user, |s| {
        s.is_online = true;
        s.last_activity = Utc::now();
    });

    let packet = Packet::Tell(TellPacket {
        kind,
        header: Header::new(mud_name.as_str(), from_user.as_str(), target_mud, target_user),
        visname,
        message,
    });

    match ctx.core.dispatcher.route_outbound(packet).await {
        Ok(()) => Ok(json!({
            "status": "sent",
            "message_id": format!("{id_prefix}_{}_{}", mud_name, Utc::now().timestamp_millis()),
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
