//! The connection task: dial, handshake, framed I/O, keep-alive, failover.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    futures::{SinkExt, StreamExt},
    metrics::counter,
    mudgate_common::TTL_CEILING,
    mudgate_packet::{AuthMudPacket, ErrorPacket, Header, Packet, PacketError, PacketKind},
    mudgate_wire::{FrameCodec, Value},
    tokio::{
        net::TcpStream,
        sync::{mpsc, watch},
        task::JoinHandle,
    },
    tokio_util::{codec::Framed, sync::CancellationToken},
    tracing::{debug, info, warn},
};

use crate::{LinkState, backoff::full_jitter, error::LinkError};

/// Consecutive frame decode failures tolerated before the connection is torn
/// down as a protocol error.
const DECODE_ERROR_LIMIT: u32 = 5;

/// One router the link may dial.
#[derive(Debug, Clone)]
pub struct RouterCandidate {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub password: i32,
}

impl RouterCandidate {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// The mud identity used in heartbeats and synthesized error packets.
    pub mud_name: String,
    /// Primary first, fallbacks after; tried round-robin.
    pub candidates: Vec<RouterCandidate>,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    /// No peer activity for this long tears the connection down.
    pub connection_timeout: Duration,
    pub reconnect_delay: Duration,
    pub reconnect_delay_cap: Duration,
    /// None retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub max_frame_bytes: usize,
}

/// Builds the `startup-req-3` sent after every successful dial. The gateway
/// implements this over its config and state store (the link holds no
/// back-reference to either).
pub trait StartupProvider: Send + Sync {
    fn startup_packet(&self, router: &RouterCandidate) -> Packet;
}

#[derive(Debug, Clone, Copy)]
pub enum LinkCommand {
    /// Drop the current connection and dial again immediately.
    Reconnect,
}

#[derive(Debug, Default)]
pub struct LinkStats {
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub reconnects: AtomicU64,
    pub decode_errors: AtomicU64,
}

/// Capability handle other components hold. Sending enqueues on the writer;
/// packets queued while disconnected transmit once the link is Ready again.
pub struct LinkHandle {
    outbound: mpsc::Sender<Packet>,
    commands: mpsc::Sender<LinkCommand>,
    state: watch::Receiver<LinkState>,
    stats: Arc<LinkStats>,
    current_router: Arc<Mutex<Option<String>>>,
    _task: JoinHandle<()>,
}

impl LinkHandle {
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == LinkState::Ready
    }

    /// A fresh watcher for state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// A cloneable send handle for components that only transmit.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<Packet> {
        self.outbound.clone()
    }

    /// Queue a packet for transmission in order.
    pub async fn send(&self, packet: Packet) -> Result<(), LinkError> {
        self.outbound
            .send(packet)
            .await
            .map_err(|_| LinkError::NotConnected)
    }

    /// Force a drop-and-redial.
    pub async fn reconnect(&self) {
        let _ = self.commands.send(LinkCommand::Reconnect).await;
    }

    #[must_use]
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    #[must_use]
    pub fn current_router(&self) -> Option<String> {
        self.current_router.lock().ok().and_then(|g| g.clone())
    }
}

/// Spawn the connection task. Inbound packets flow to `inbound`; state
/// transitions publish on the returned handle's watcher. Cancelling `cancel`
/// closes the link cleanly (Closing → Disconnected, no reconnect).
#[must_use]
pub fn spawn(
    config: LinkConfig,
    startup: Arc<dyn StartupProvider>,
    inbound: mpsc::Sender<Packet>,
    cancel: CancellationToken,
) -> LinkHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(256);
    let (command_tx, command_rx) = mpsc::channel(8);
    let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
    let stats = Arc::new(LinkStats::default());
    let current_router = Arc::new(Mutex::new(None));

    let task = tokio::spawn(run(
        config,
        startup,
        inbound,
        outbound_rx,
        command_rx,
        state_tx,
        Arc::clone(&stats),
        Arc::clone(&current_router),
        cancel,
    ));

    LinkHandle {
        outbound: outbound_tx,
        commands: command_tx,
        state: state_rx,
        stats,
        current_router,
        _task: task,
    }
}

enum ConnectionEnd {
    Cancelled,
    Reconnect,
    Lost,
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: LinkConfig,
    startup: Arc<dyn StartupProvider>,
    inbound: mpsc::Sender<Packet>,
    mut outbound_rx: mpsc::Receiver<Packet>,
    mut command_rx: mpsc::Receiver<LinkCommand>,
    state_tx: watch::Sender<LinkState>,
    stats: Arc<LinkStats>,
    current_router: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut candidate_index = 0usize;

    if config.candidates.is_empty() {
        warn!("link: no router candidates configured");
        let _ = state_tx.send(LinkState::Disconnected);
        return;
    }

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let candidate = config.candidates[candidate_index % config.candidates.len()].clone();
        candidate_index += 1;

        let _ = state_tx.send(LinkState::Connecting);
        info!(router = %candidate.name, addr = %candidate.addr(), "link: dialing router");

        let dial = tokio::time::timeout(config.connect_timeout, TcpStream::connect(candidate.addr()));
        let stream = tokio::select! {
            () = cancel.cancelled() => break,
            result = dial => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(router = %candidate.name, error = %e, "link: dial failed");
                    attempt += 1;
                    if !wait_backoff(&config, attempt, &cancel).await {
                        break;
                    }
                    continue;
                },
                Err(_) => {
                    warn!(router = %candidate.name, "link: dial timed out");
                    attempt += 1;
                    if !wait_backoff(&config, attempt, &cancel).await {
                        break;
                    }
                    continue;
                },
            },
        };

        if let Ok(mut guard) = current_router.lock() {
            *guard = Some(candidate.name.clone());
        }
        let _ = state_tx.send(LinkState::Connected);
        stats.reconnects.fetch_add(1, Ordering::Relaxed);

        let end = run_connection(
            &config,
            &candidate,
            startup.as_ref(),
            stream,
            &inbound,
            &mut outbound_rx,
            &mut command_rx,
            &state_tx,
            &stats,
            &cancel,
        )
        .await;

        if let Ok(mut guard) = current_router.lock() {
            *guard = None;
        }

        match end {
            ConnectionEnd::Cancelled => break,
            ConnectionEnd::Reconnect => {
                let _ = state_tx.send(LinkState::Disconnected);
                attempt = 0;
            },
            ConnectionEnd::Lost => {
                let _ = state_tx.send(LinkState::Disconnected);
                attempt += 1;
                if !wait_backoff(&config, attempt, &cancel).await {
                    break;
                }
            },
        }
    }

    let _ = state_tx.send(LinkState::Closing);
    let _ = state_tx.send(LinkState::Disconnected);
    debug!("link: task exited");
}

/// Sleep the jittered backoff; false means give up (cancelled or out of
/// attempts).
async fn wait_backoff(config: &LinkConfig, attempt: u32, cancel: &CancellationToken) -> bool {
    if let Some(max) = config.max_reconnect_attempts
        && attempt > max
    {
        warn!(attempt, "link: reconnect attempts exhausted");
        return false;
    }
    let delay = full_jitter(config.reconnect_delay, config.reconnect_delay_cap, attempt);
    debug!(?delay, attempt, "link: backing off");
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    config: &LinkConfig,
    candidate: &RouterCandidate,
    startup: &dyn StartupProvider,
    stream: TcpStream,
    inbound: &mpsc::Sender<Packet>,
    outbound_rx: &mut mpsc::Receiver<Packet>,
    command_rx: &mut mpsc::Receiver<LinkCommand>,
    state_tx: &watch::Sender<LinkState>,
    stats: &LinkStats,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let mut framed = Framed::new(stream, FrameCodec::new(config.max_frame_bytes));

    // Handshake: startup-req-3 with the configured identity and the last
    // known list ids.
    let startup_packet = startup.startup_packet(candidate);
    if let Err(e) = framed.send(startup_packet.to_value()).await {
        warn!(error = %e, "link: startup send failed");
        return ConnectionEnd::Lost;
    }
    stats.packets_sent.fetch_add(1, Ordering::Relaxed);
    info!(router = %candidate.name, "link: startup sent, awaiting handshake");

    let mut last_received = Instant::now();
    let mut last_sent = Instant::now();
    let mut decode_errors: u32 = 0;
    let tick_period = config.keepalive_interval.min(Duration::from_secs(15)).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(tick_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = framed.close().await;
                return ConnectionEnd::Cancelled;
            },

            command = command_rx.recv() => {
                match command {
                    Some(LinkCommand::Reconnect) => {
                        info!("link: reconnect requested");
                        let _ = framed.close().await;
                        return ConnectionEnd::Reconnect;
                    },
                    None => return ConnectionEnd::Cancelled,
                }
            },

            frame = framed.next() => {
                match frame {
                    Some(Ok(value)) => {
                        last_received = Instant::now();
                        match handle_frame(&value, config, state_tx, stats) {
                            Ok(Some(packet)) => {
                                if inbound.send(packet).await.is_err() {
                                    // Dispatcher is gone; shut the link down.
                                    return ConnectionEnd::Cancelled;
                                }
                                decode_errors = 0;
                            },
                            Ok(None) => decode_errors = 0,
                            Err(reply) => {
                                decode_errors += 1;
                                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                                if let Some(reply) = reply
                                    && framed.send(reply.to_value()).await.is_err()
                                {
                                    return ConnectionEnd::Lost;
                                }
                                if decode_errors >= DECODE_ERROR_LIMIT {
                                    warn!("link: decode error threshold reached");
                                    return ConnectionEnd::Lost;
                                }
                            },
                        }
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "link: frame error");
                        return ConnectionEnd::Lost;
                    },
                    None => {
                        info!("link: peer closed connection");
                        return ConnectionEnd::Lost;
                    },
                }
            },

            packet = outbound_rx.recv() => {
                match packet {
                    Some(packet) => {
                        if let Err(e) = framed.send(packet.to_value()).await {
                            warn!(error = %e, "link: write failed");
                            return ConnectionEnd::Lost;
                        }
                        last_sent = Instant::now();
                        stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                    },
                    None => return ConnectionEnd::Cancelled,
                }
            },

            _ = ticker.tick() => {
                if last_received.elapsed() >= config.connection_timeout {
                    warn!(idle = ?last_received.elapsed(), "link: peer inactivity timeout");
                    return ConnectionEnd::Lost;
                }
                let idle = last_received.elapsed().min(last_sent.elapsed());
                if idle >= config.keepalive_interval {
                    let heartbeat = heartbeat_packet(&config.mud_name, &candidate.name);
                    if framed.send(heartbeat.to_value()).await.is_err() {
                        return ConnectionEnd::Lost;
                    }
                    last_sent = Instant::now();
                    counter!("link_heartbeats_total").increment(1);
                }
            },
        }
    }
}

/// Parse one inbound frame. `Ok(Some)` forwards to the dispatcher; `Ok(None)`
/// was consumed here; `Err` is a protocol error, optionally with an `error`
/// packet to bounce back at the originator.
fn handle_frame(
    value: &Value,
    config: &LinkConfig,
    state_tx: &watch::Sender<LinkState>,
    stats: &LinkStats,
) -> Result<Option<Packet>, Option<Packet>> {
    match Packet::from_value(value) {
        Ok(packet) => {
            stats.packets_received.fetch_add(1, Ordering::Relaxed);
            // Either handshake completion signal is accepted.
            if *state_tx.borrow() == LinkState::Connected
                && matches!(packet.kind(), PacketKind::StartupReply | PacketKind::Mudlist)
            {
                info!("link: handshake complete");
                let _ = state_tx.send(LinkState::Ready);
            }
            Ok(Some(packet))
        },
        Err(e) => {
            counter!("link_malformed_packets_total").increment(1);
            warn!(error = %e, "link: malformed packet");
            Err(protocol_error_reply(value, &e, &config.mud_name))
        },
    }
}

/// Bounce an `error` packet at the originator of a malformed sequence, when
/// the originator slot is addressable.
fn protocol_error_reply(value: &Value, error: &PacketError, mud_name: &str) -> Option<Packet> {
    let values = value.as_list()?;
    let originator_mud = values.get(2).map(Value::coerce_string)?;
    if originator_mud.is_empty() || originator_mud == "0" {
        return None;
    }
    let code = match error {
        PacketError::UnknownKind(_) => "unk-type",
        _ => "bad-pkt",
    };
    Some(Packet::Error(ErrorPacket {
        header: Header {
            ttl: TTL_CEILING,
            originator_mud: mud_name.to_owned(),
            originator_user: String::new(),
            target_mud: originator_mud,
            target_user: values.get(3).map(Value::coerce_string).unwrap_or_default(),
        },
        code: code.to_owned(),
        message: error.to_string(),
        bad_packet: values.to_vec(),
    }))
}

/// Application-level keep-alive. The wire protocol has no ping kind; a
/// zero-key `auth-mud-req` addressed at the router is harmless and elicits
/// peer activity.
fn heartbeat_packet(mud_name: &str, router_name: &str) -> Packet {
    Packet::AuthMud(AuthMudPacket {
        kind: PacketKind::AuthMudReq,
        header: Header::new(mud_name, "", router_name, ""),
        auth_key: 0,
    })
}
