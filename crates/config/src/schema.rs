//! Config schema (mud identity, routers, connection, api, auth, rate limits,
//! session, channels, state).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MudgateConfig {
    pub mud: MudConfig,
    pub routers: Vec<RouterHostConfig>,
    pub connection: ConnectionConfig,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub rate_limits: RateLimitsConfig,
    pub session: SessionConfig,
    pub channels: ChannelsConfig,
    pub state: StateConfig,
}

/// The identity this gateway presents to the router federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MudConfig {
    pub name: String,
    /// Player-facing telnet port, advertised in the startup packet.
    pub port: u16,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub admin_email: String,
    pub mudlib: String,
    pub base_mudlib: String,
    pub driver: String,
    pub mud_type: String,
    pub open_status: String,
    /// Elide user IP addresses from finger replies.
    pub hide_ip: bool,
    pub services: ServicesConfig,
    pub oob_services: OobServicesConfig,
}

impl Default for MudConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: 4000,
            tcp_port: 0,
            udp_port: 0,
            admin_email: String::new(),
            mudlib: "Custom".into(),
            base_mudlib: "LPMud".into(),
            driver: "FluffOS".into(),
            mud_type: "LP".into(),
            open_status: "open".into(),
            hide_ip: false,
            services: ServicesConfig::default(),
            oob_services: OobServicesConfig::default(),
        }
    }
}

/// In-band service toggles advertised in the startup services mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub tell: bool,
    pub emoteto: bool,
    pub channel: bool,
    pub who: bool,
    pub finger: bool,
    pub locate: bool,
    pub auth: bool,
    pub ucache: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            tell: true,
            emoteto: true,
            channel: true,
            who: true,
            finger: true,
            locate: true,
            auth: true,
            ucache: true,
        }
    }
}

/// Out-of-band service toggles. All off by default; the gateway answers
/// `not-imp` for kinds it does not serve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OobServicesConfig {
    pub mail: bool,
    pub news: bool,
    pub file: bool,
}

/// One router candidate. The first entry is the primary; the rest are
/// fallbacks tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterHostConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: i32,
}

/// Router connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP dial deadline.
    pub connect_timeout_s: u64,
    /// No peer activity for this long while Ready tears the link down.
    pub timeout_s: u64,
    /// Idle interval after which a heartbeat is sent.
    pub keepalive_interval_s: u64,
    /// Base reconnect delay; backoff doubles up to the cap with full jitter.
    pub reconnect_delay_s: u64,
    pub reconnect_delay_cap_s: u64,
    /// None = retry forever (the default).
    pub max_reconnect_attempts: Option<u32>,
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_s: 30,
            timeout_s: 300,
            keepalive_interval_s: 60,
            reconnect_delay_s: 1,
            reconnect_delay_cap_s: 60,
            max_reconnect_attempts: None,
            max_frame_bytes: 64 * 1024,
        }
    }
}

/// Client-facing API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub websocket: WebSocketConfig,
    pub tcp: TcpConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            websocket: WebSocketConfig::default(),
            tcp: TcpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    pub port: u16,
    pub ping_interval_s: u64,
    pub pong_timeout_s: u64,
    pub max_frame_bytes: usize,
    pub max_connections: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            ping_interval_s: 30,
            pong_timeout_s: 10,
            max_frame_bytes: 64 * 1024,
            max_connections: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub enabled: bool,
    pub port: u16,
    pub max_connections: usize,
    pub idle_timeout_s: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8081,
            max_connections: 500,
            idle_timeout_s: 3600,
        }
    }
}

/// One API credential. The key itself is never stored; `key_hash` is the
/// hex-encoded SHA-256 of the opaque key a client presents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub key_hash: String,
    pub mud_name: String,
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub rate_limit_override: Option<u32>,
}

fn default_permissions() -> Vec<String> {
    vec!["*".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub require_tls: bool,
    pub credentials: Vec<CredentialConfig>,
    pub token_ttl_s: u64,
    pub ip_filter: IpFilterConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_tls: false,
            credentials: Vec::new(),
            token_ttl_s: 86_400,
            ip_filter: IpFilterConfig::default(),
        }
    }
}

/// CIDR allow/block lists evaluated before the credential check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpFilterConfig {
    pub enabled: bool,
    pub allowlist: Vec<String>,
    pub blocklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 100,
            burst: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub default: RateLimitConfig,
    /// Per-method `per_minute` overrides.
    pub by_method: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle sessions with no transport are destroyed past this age.
    pub timeout_s: u64,
    pub max_queue_size: usize,
    /// Default TTL applied to queued messages without their own.
    pub queue_ttl_s: u64,
    pub cleanup_interval_s: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_s: 3600,
            max_queue_size: 1000,
            queue_ttl_s: 300,
            cleanup_interval_s: 60,
        }
    }
}

/// A channel that exists at boot, before the router's first chanlist diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDef {
    pub name: String,
    /// "public" or "private".
    #[serde(default = "default_channel_type")]
    pub channel_type: String,
    #[serde(default)]
    pub owner_mud: String,
}

fn default_channel_type() -> String {
    "public".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub history_size: usize,
    pub max_message_bytes: usize,
    pub default_channels: Vec<ChannelDef>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            history_size: 100,
            max_message_bytes: 2048,
            default_channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub persistence_enabled: bool,
    pub persistence_path: String,
    pub persistence_interval_s: u64,
    /// Queues for sessions gone longer than this are reaped.
    pub stale_timeout_s: u64,
    pub cache_sweep_interval_s: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persistence_enabled: false,
            persistence_path: "state/gateway.json".into(),
            persistence_interval_s: 300,
            stale_timeout_s: 3600,
            cache_sweep_interval_s: 60,
        }
    }
}

impl MudgateConfig {
    /// The services mapping advertised in `startup-req-3`.
    #[must_use]
    pub fn startup_services(&self) -> Vec<(String, i32)> {
        let s = &self.mud.services;
        let o = &self.mud.oob_services;
        let toggles: [(&str, bool); 11] = [
            ("tell", s.tell),
            ("emoteto", s.emoteto),
            ("channel", s.channel),
            ("who", s.who),
            ("finger", s.finger),
            ("locate", s.locate),
            ("auth", s.auth),
            ("ucache", s.ucache),
            ("mail", o.mail),
            ("news", o.news),
            ("file", o.file),
        ];
        toggles
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| (name.to_owned(), 1))
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = MudgateConfig::default();
        assert_eq!(cfg.session.max_queue_size, 1000);
        assert_eq!(cfg.channels.history_size, 100);
        assert_eq!(cfg.connection.timeout_s, 300);
        assert!(cfg.auth.enabled);
    }

    #[test]
    fn test_startup_services_respects_toggles() {
        let mut cfg = MudgateConfig::default();
        cfg.mud.services.locate = false;
        cfg.mud.oob_services.mail = true;
        let services = cfg.startup_services();
        assert!(services.iter().any(|(n, v)| n == "tell" && *v == 1));
        assert!(services.iter().any(|(n, _)| n == "mail"));
        assert!(!services.iter().any(|(n, _)| n == "locate"));
    }
}
