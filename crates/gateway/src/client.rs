//! Per-connection protocol driver shared by both transports.
//!
//! The WebSocket and TCP servers feed raw text in and take serialized
//! responses out through the connection's write channel; everything in
//! between — parsing, the authenticate handshake, batching, dispatch — is
//! identical across transports.

use std::{net::IpAddr, sync::Arc};

use {
    metrics::counter,
    serde_json::json,
    tokio::sync::mpsc,
    tracing::{info, warn},
};

use crate::{
    auth::Verified,
    methods::MethodRegistry,
    rpc::{self, Incoming, ParseOutcome, Request, RpcError, error_codes},
    session::Session,
    state::GatewayCore,
};

pub struct ClientConnection {
    core: Arc<GatewayCore>,
    registry: Arc<MethodRegistry>,
    sender: mpsc::UnboundedSender<String>,
    remote_ip: IpAddr,
    session: Option<Arc<Session>>,
    /// Set after a failed credential check; the transport closes the
    /// connection once the error response has flushed.
    close_requested: bool,
}

impl ClientConnection {
    /// `header_verified` carries a credential already validated at the
    /// transport layer (the WebSocket `X-API-Key` header); the session is
    /// minted before the first message.
    #[must_use]
    pub fn new(
        core: Arc<GatewayCore>,
        registry: Arc<MethodRegistry>,
        sender: mpsc::UnboundedSender<String>,
        remote_ip: IpAddr,
        header_verified: Option<Verified>,
    ) -> Self {
        let mut conn = Self {
            core,
            registry,
            sender,
            remote_ip,
            session: None,
            close_requested: false,
        };
        if let Some(verified) = header_verified {
            conn.bind_session(&verified);
        }
        conn
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Transport gone: unbind, leaving the session and its queue for a
    /// possible later reconnect (which gets a new session id).
    pub fn on_disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.detach_transport();
            info!(session_id = %session.id, "client: transport detached");
        }
    }

    /// One inbound text frame / line. Responses (if owed) go out through the
    /// write channel.
    pub async fn handle_text(&mut self, text: &str) {
        let incoming = match rpc::parse_message(text) {
            Ok(incoming) => incoming,
            Err(error_text) => {
                self.send(&error_text);
                return;
            },
        };

        match incoming {
            Incoming::Single(outcome) => {
                if let Some(response) = self.process(outcome).await {
                    self.send(&response);
                }
            },
            Incoming::Batch(outcomes) => {
                let mut members = Vec::new();
                for outcome in outcomes {
                    if let Some(response) = self.process(outcome).await {
                        members.push(response);
                    }
                }
                // A batch of only notifications produces nothing at all.
                if let Some(body) = rpc::batch_response(members) {
                    self.send(&body);
                }
            },
        }
    }

    async fn process(&mut self, outcome: ParseOutcome) -> Option<String> {
        let request = match outcome {
            Ok(request) => request,
            Err(response) => return response,
        };

        // The session may have been destroyed underneath us (idle sweep,
        // token expiry); unbind so the client can authenticate again.
        if let Some(session) = &self.session
            && self.core.sessions.get(&session.id).is_none()
        {
            self.session = None;
        }

        match &self.session {
            None if request.method == "authenticate" => self.handle_authenticate(&request),
            None => {
                counter!("rpc_unauthenticated_total").increment(1);
                if request.is_notification() {
                    None
                } else {
                    Some(rpc::error_response(
                        &request.id,
                        &RpcError::new(error_codes::NOT_AUTHENTICATED, "not authenticated"),
                    ))
                }
            },
            Some(session) => {
                let session = Arc::clone(session);
                self.registry.dispatch(&self.core, &session, request).await
            },
        }
    }

    fn handle_authenticate(&mut self, request: &Request) -> Option<String> {
        let verified = if self.core.auth.enabled() {
            let api_key = match request.str_param("api_key") {
                Ok(key) => key,
                Err(error) => {
                    return (!request.is_notification())
                        .then(|| rpc::error_response(&request.id, &error));
                },
            };
            self.core.auth.verify_key(&api_key)
        } else {
            // Auth disabled: trust the caller's claimed identity.
            Some(Verified {
                mud_name: request
                    .opt_str_param("mud_name")
                    .unwrap_or_else(|| "anonymous".into()),
                permissions: vec!["*".into()],
                rate_limit_override: None,
            })
        };

        match verified {
            Some(verified) => {
                let session = self.bind_session(&verified);
                (!request.is_notification()).then(|| {
                    rpc::result_response(
                        &request.id,
                        &json!({
                            "status": "authenticated",
                            "mud_name": session.mud_name,
                            "session_id": session.id,
                        }),
                    )
                })
            },
            None => {
                warn!(remote_ip = %self.remote_ip, "client: authentication failed");
                self.close_requested = true;
                (!request.is_notification()).then(|| {
                    rpc::error_response(
                        &request.id,
                        &RpcError::new(error_codes::NOT_AUTHENTICATED, "invalid API key"),
                    )
                })
            },
        }
    }

    fn bind_session(&mut self, verified: &Verified) -> Arc<Session> {
        let session = self.core.sessions.create(verified);
        session.attach_transport(self.sender.clone());
        self.core.spawn_drain(&session);
        self.session = Some(Arc::clone(&session));
        info!(
            session_id = %session.id,
            mud_name = %session.mud_name,
            remote_ip = %self.remote_ip,
            "client: session bound"
        );
        session
    }

    fn send(&self, text: &str) {
        if self.sender.send(text.to_owned()).is_err() {
            warn!("client: write channel closed");
        }
    }
}
