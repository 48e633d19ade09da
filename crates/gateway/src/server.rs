//! Wires the gateway together: state store, router link, dispatcher, event
//! bridge, background sweepers, and both client transports.

use std::{
    net::SocketAddr,
    sync::{Arc, atomic::AtomicUsize},
    time::{Duration, Instant},
};

use {
    axum::{Router, routing::get},
    tokio_util::sync::CancellationToken,
    tower_http::trace::TraceLayer,
    tracing::{error, info, warn},
};

use {
    mudgate_config::MudgateConfig,
    mudgate_link::{LinkConfig, RouterCandidate, StartupProvider},
    mudgate_packet::{Header, Packet, StartupPacket},
    mudgate_services::Dispatcher,
    mudgate_state::{ChannelType, StateStore},
    mudgate_wire::ValueMap,
};

use crate::{
    auth::AuthEngine,
    bridge::EventBridge,
    methods::MethodRegistry,
    session::SessionManager,
    state::GatewayCore,
    subscriptions::SubscriptionManager,
    tcp::run_tcp_server,
    ws::{WsServerState, ws_handler},
};

/// Builds the `startup-req-3` for each (re)connect, with the last known list
/// ids so an unchanged router can skip the full resync.
struct GatewayStartup {
    config: MudgateConfig,
    state: Arc<StateStore>,
}

impl StartupProvider for GatewayStartup {
    fn startup_packet(&self, router: &RouterCandidate) -> Packet {
        let mud = &self.config.mud;
        Packet::Startup(StartupPacket {
            header: Header::new(mud.name.as_str(), "", router.name.as_str(), ""),
            password: router.password,
            old_mudlist_id: self.state.mudlist_id(),
            old_chanlist_id: self.state.chanlist_id(),
            player_port: i32::from(mud.port),
            tcp_port: i32::from(mud.tcp_port),
            udp_port: i32::from(mud.udp_port),
            mudlib: mud.mudlib.clone(),
            base_mudlib: mud.base_mudlib.clone(),
            driver: mud.driver.clone(),
            mud_type: mud.mud_type.clone(),
            open_status: mud.open_status.clone(),
            admin_email: mud.admin_email.clone(),
            services: self.config.startup_services(),
            other_data: ValueMap::new(),
        })
    }
}

pub struct Gateway {
    pub core: Arc<GatewayCore>,
    pub registry: Arc<MethodRegistry>,
}

impl Gateway {
    /// Construct every component and spawn the long-lived tasks. Must run
    /// inside a tokio runtime.
    #[must_use]
    pub fn build(config: MudgateConfig) -> Self {
        let cancel = CancellationToken::new();

        let state = Arc::new(StateStore::new(config.channels.history_size));
        for def in &config.channels.default_channels {
            let channel_type = if def.channel_type == "private" {
                ChannelType::Private
            } else {
                ChannelType::Public
            };
            state.add_channel(&def.name, channel_type, &def.owner_mud);
        }

        // Router link: inbound packets flow to the dispatcher pump.
        let (inbound_tx, mut inbound_rx) = tokio::sync::mpsc::channel(256);
        let link = mudgate_link::spawn(
            LinkConfig {
                mud_name: config.mud.name.clone(),
                candidates: config
                    .routers
                    .iter()
                    .map(|r| RouterCandidate {
                        name: r.name.clone(),
                        host: r.host.clone(),
                        port: r.port,
                        password: r.password,
                    })
                    .collect(),
                connect_timeout: Duration::from_secs(config.connection.connect_timeout_s),
                keepalive_interval: Duration::from_secs(config.connection.keepalive_interval_s),
                connection_timeout: Duration::from_secs(config.connection.timeout_s),
                reconnect_delay: Duration::from_secs(config.connection.reconnect_delay_s),
                reconnect_delay_cap: Duration::from_secs(config.connection.reconnect_delay_cap_s),
                max_reconnect_attempts: config.connection.max_reconnect_attempts,
                max_frame_bytes: config.connection.max_frame_bytes,
            },
            Arc::new(GatewayStartup {
                config: config.clone(),
                state: Arc::clone(&state),
            }),
            inbound_tx,
            cancel.child_token(),
        );

        let (bridge_tx, bridge_rx) = tokio::sync::mpsc::channel(256);
        let dispatcher = Arc::new(Dispatcher::new(
            config.mud.name.clone(),
            config.mud.hide_ip,
            Arc::clone(&state),
            link.sender(),
            bridge_tx,
        ));

        let sessions = Arc::new(SessionManager::new(
            config.session.clone(),
            config.rate_limits.clone(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new());
        let bridge = Arc::new(EventBridge::new(
            Arc::clone(&sessions),
            Arc::clone(&subscriptions),
        ));
        let auth = AuthEngine::new(&config.auth);

        let core = Arc::new(GatewayCore {
            started_at: Instant::now(),
            state: Arc::clone(&state),
            dispatcher: Arc::clone(&dispatcher),
            link,
            sessions: Arc::clone(&sessions),
            subscriptions: Arc::clone(&subscriptions),
            bridge: Arc::clone(&bridge),
            auth,
            cancel: cancel.clone(),
            config,
        });

        // Inbound pump: router frames → dispatcher, in receive order.
        {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        packet = inbound_rx.recv() => match packet {
                            Some(packet) => dispatcher.dispatch_inbound(packet).await,
                            None => break,
                        },
                    }
                }
            });
        }

        // Event bridge pump.
        tokio::spawn(Arc::clone(&bridge).run(
            bridge_rx,
            state.subscribe(),
            core.link.watch_state(),
            cancel.child_token(),
        ));

        // Session sweeper: destroy idle transportless sessions and purge
        // expired queue entries.
        {
            let sessions = Arc::clone(&sessions);
            let subscriptions = Arc::clone(&subscriptions);
            let cancel = cancel.clone();
            let period = Duration::from_secs(core.config.session.cleanup_interval_s.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            for session_id in sessions.sweep() {
                                subscriptions.unsubscribe_all(&session_id);
                            }
                        },
                    }
                }
            });
        }

        // Cache TTL + stale presence sweeper.
        {
            let state = Arc::clone(&state);
            let cancel = cancel.clone();
            let period = Duration::from_secs(core.config.state.cache_sweep_interval_s.max(1));
            let stale_after = Duration::from_secs(core.config.state.stale_timeout_s.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => state.sweep(Some(stale_after)),
                    }
                }
            });
        }

        Self {
            core,
            registry: Arc::new(MethodRegistry::standard()),
        }
    }

    /// Serve both transports until shutdown. In-flight requests finish; the
    /// link closes cleanly.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut tasks = Vec::new();

        if self.core.config.api.websocket.enabled {
            let bind = format!(
                "{}:{}",
                self.core.config.api.host, self.core.config.api.websocket.port
            );
            let ws_state = Arc::new(WsServerState {
                core: Arc::clone(&self.core),
                registry: Arc::clone(&self.registry),
                active: AtomicUsize::new(0),
            });
            let app = Router::new()
                .route("/ws", get(ws_handler))
                .layer(TraceLayer::new_for_http())
                .with_state(ws_state);
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!(addr = %bind, "ws: listening");
            let cancel = self.core.cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
                {
                    error!(error = %e, "ws: server error");
                }
            }));
        }

        if self.core.config.api.tcp.enabled {
            let core = Arc::clone(&self.core);
            let registry = Arc::clone(&self.registry);
            tasks.push(tokio::spawn(async move {
                if let Err(e) = run_tcp_server(core, registry).await {
                    error!(error = %e, "tcp: server error");
                }
            }));
        }

        if tasks.is_empty() {
            warn!("no client transport enabled");
            self.core.cancel.cancelled().await;
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("gateway stopped");
        Ok(())
    }

    /// Request a clean stop: transports drain, sweepers exit, the router
    /// link closes.
    pub fn shutdown(&self) {
        info!("gateway: shutdown requested");
        self.core.cancel.cancel();
    }
}
