//! WebSocket transport. One connection per client; text frames carry one
//! JSON-RPC message each. The server pings on an interval and drops the
//! connection when neither pongs nor traffic arrive in time.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    axum::{
        extract::{
            ConnectInfo, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{auth::Verified, client::ClientConnection, methods::MethodRegistry, state::GatewayCore};

/// Time allowed for an error response to flush before a refused connection
/// closes.
const CLOSE_GRACE: Duration = Duration::from_millis(200);

pub struct WsServerState {
    pub core: Arc<GatewayCore>,
    pub registry: Arc<MethodRegistry>,
    pub active: AtomicUsize,
}

/// `GET /ws` upgrade handler. IP filtering and the connection cap run before
/// the upgrade; an `X-API-Key` header authenticates ahead of the first
/// message.
pub async fn ws_handler(
    State(app): State<Arc<WsServerState>>,
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !app.core.auth.ip_allowed(remote_addr.ip()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if app.active.load(Ordering::Relaxed) >= app.core.config.api.websocket.max_connections {
        warn!("ws: connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let header_verified = match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(key) if app.core.auth.enabled() => match app.core.auth.verify_key(key) {
            Some(verified) => Some(verified),
            // A present-but-wrong key is refused outright.
            None => return StatusCode::UNAUTHORIZED.into_response(),
        },
        _ => None,
    };

    ws.on_upgrade(move |socket| handle_connection(socket, app, remote_addr, header_verified))
}

/// Handle one WebSocket connection through its full lifecycle:
/// optional header auth → message loop → cleanup.
async fn handle_connection(
    socket: WebSocket,
    app: Arc<WsServerState>,
    remote_addr: SocketAddr,
    header_verified: Option<Verified>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote_ip = %remote_addr.ip(), "ws: new connection");
    app.active.fetch_add(1, Ordering::Relaxed);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: serialized frames out, protocol pings on the interval.
    let ping_interval = Duration::from_secs(app.core.config.api.websocket.ping_interval_s.max(1));
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                msg = client_rx.recv() => match msg {
                    Some(msg) => {
                        if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                            debug!(conn_id = %write_conn_id, "ws: write loop closed");
                            break;
                        }
                    },
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                },
            }
        }
    });

    let mut conn = ClientConnection::new(
        Arc::clone(&app.core),
        Arc::clone(&app.registry),
        client_tx,
        remote_addr.ip(),
        header_verified,
    );

    // Read loop. Pongs (and all other traffic) reset the deadline; silence
    // past ping_interval + pong_timeout means the peer is gone.
    let read_deadline =
        ping_interval + Duration::from_secs(app.core.config.api.websocket.pong_timeout_s.max(1));
    loop {
        let frame = tokio::select! {
            () = app.core.cancel.cancelled() => break,
            frame = tokio::time::timeout(read_deadline, ws_rx.next()) => frame,
        };
        match frame {
            Err(_) => {
                warn!(conn_id = %conn_id, "ws: pong timeout");
                break;
            },
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
            Ok(Some(Ok(Message::Text(text)))) => {
                conn.handle_text(text.as_str()).await;
                if conn.should_close() {
                    tokio::time::sleep(CLOSE_GRACE).await;
                    break;
                }
            },
            Ok(Some(Ok(Message::Close(_)))) => break,
            // Pong / Ping / Binary: deadline already reset by arrival.
            Ok(Some(Ok(_))) => {},
        }
    }

    conn.on_disconnect();
    write_handle.abort();
    app.active.fetch_sub(1, Ordering::Relaxed);
    info!(conn_id = %conn_id, "ws: connection closed");
}
