//! Line-delimited TCP transport. Newline-separated JSON-RPC messages, a
//! welcome notification on accept, and a generous idle timeout.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    futures::StreamExt,
    serde_json::json,
    tokio::{
        io::AsyncWriteExt,
        net::{TcpListener, TcpStream},
        sync::mpsc,
    },
    tokio_util::codec::{FramedRead, LinesCodec},
    tracing::{debug, info, warn},
};

use mudgate_common::{API_PROTOCOL, SERVICE_NAME};

use crate::{client::ClientConnection, methods::MethodRegistry, rpc, state::GatewayCore};

const CLOSE_GRACE: Duration = Duration::from_millis(200);

/// Accept loop. Excess connections beyond the cap are closed immediately;
/// blocked IPs never get past accept.
pub async fn run_tcp_server(
    core: Arc<GatewayCore>,
    registry: Arc<MethodRegistry>,
) -> std::io::Result<()> {
    let bind = format!("{}:{}", core.config.api.host, core.config.api.tcp.port);
    let listener = TcpListener::bind(&bind).await?;
    info!(addr = %bind, "tcp: listening");

    let active = Arc::new(AtomicUsize::new(0));
    loop {
        let accepted = tokio::select! {
            () = core.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, remote_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "tcp: accept failed");
                continue;
            },
        };

        if active.load(Ordering::Relaxed) >= core.config.api.tcp.max_connections {
            warn!(remote_ip = %remote_addr.ip(), "tcp: connection limit reached");
            drop(stream);
            continue;
        }
        if !core.auth.ip_allowed(remote_addr.ip()) {
            debug!(remote_ip = %remote_addr.ip(), "tcp: ip refused");
            drop(stream);
            continue;
        }

        active.fetch_add(1, Ordering::Relaxed);
        let core = Arc::clone(&core);
        let registry = Arc::clone(&registry);
        let active = Arc::clone(&active);
        tokio::spawn(async move {
            handle_client(stream, remote_addr, core, registry).await;
            active.fetch_sub(1, Ordering::Relaxed);
        });
    }
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    remote_addr: SocketAddr,
    core: Arc<GatewayCore>,
    registry: Arc<MethodRegistry>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote_ip = %remote_addr.ip(), "tcp: new connection");

    let (read_half, mut write_half) = stream.into_split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(mut line) = client_rx.recv().await {
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                debug!(conn_id = %write_conn_id, "tcp: write loop closed");
                break;
            }
        }
    });

    // The welcome tells clients what they connected to and that they must
    // authenticate before anything else works.
    let welcome = rpc::notification(
        "welcome",
        &json!({
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "protocol": API_PROTOCOL,
            "authentication": "required",
        }),
    );
    let _ = client_tx.send(welcome);

    let mut conn = ClientConnection::new(
        Arc::clone(&core),
        Arc::clone(&registry),
        client_tx,
        remote_addr.ip(),
        None,
    );

    let max_line = core.config.api.websocket.max_frame_bytes.max(4096);
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(max_line));
    let idle_timeout = Duration::from_secs(core.config.api.tcp.idle_timeout_s.max(1));

    loop {
        let next = tokio::select! {
            () = core.cancel.cancelled() => break,
            next = tokio::time::timeout(idle_timeout, lines.next()) => next,
        };
        match next {
            Err(_) => {
                info!(conn_id = %conn_id, "tcp: idle timeout");
                break;
            },
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(conn_id = %conn_id, error = %e, "tcp: read error");
                break;
            },
            Ok(Some(Ok(line))) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                conn.handle_text(line).await;
                if conn.should_close() {
                    tokio::time::sleep(CLOSE_GRACE).await;
                    break;
                }
            },
        }
    }

    conn.on_disconnect();
    write_handle.abort();
    info!(conn_id = %conn_id, "tcp: connection closed");
}
