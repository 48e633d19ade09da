//! Semantic validation of a parsed configuration.
//!
//! Structural problems (bad TOML, wrong types) surface at parse time; this
//! pass catches configurations that parse but cannot run.

use crate::schema::MudgateConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "auth.credentials[0].key_hash".
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, returning every diagnostic found.
#[must_use]
pub fn validate(cfg: &MudgateConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if cfg.mud.name.is_empty() {
        out.push(Diagnostic::error("mud.name", "mud name is required"));
    }
    if cfg.routers.is_empty() {
        out.push(Diagnostic::error(
            "routers",
            "at least one router must be configured",
        ));
    }
    for (i, router) in cfg.routers.iter().enumerate() {
        if router.host.is_empty() {
            out.push(Diagnostic::error(
                format!("routers[{i}].host"),
                "router host is required",
            ));
        }
        if router.port == 0 {
            out.push(Diagnostic::error(
                format!("routers[{i}].port"),
                "router port must be non-zero",
            ));
        }
    }

    if cfg.auth.enabled && cfg.auth.credentials.is_empty() {
        out.push(Diagnostic::error(
            "auth.credentials",
            "auth is enabled but no credentials are configured",
        ));
    }
    for (i, cred) in cfg.auth.credentials.iter().enumerate() {
        let is_sha256_hex =
            cred.key_hash.len() == 64 && cred.key_hash.chars().all(|c| c.is_ascii_hexdigit());
        if !is_sha256_hex {
            out.push(Diagnostic::error(
                format!("auth.credentials[{i}].key_hash"),
                "key_hash must be the hex-encoded SHA-256 of the API key",
            ));
        }
        if cred.mud_name.is_empty() {
            out.push(Diagnostic::error(
                format!("auth.credentials[{i}].mud_name"),
                "credential mud_name is required",
            ));
        }
    }
    if !cfg.auth.enabled {
        out.push(Diagnostic::warning(
            "auth.enabled",
            "authentication is disabled; every client is trusted",
        ));
    }
    if cfg.auth.require_tls {
        out.push(Diagnostic::warning(
            "auth.require_tls",
            "the gateway does not terminate TLS; put it behind a TLS-terminating proxy",
        ));
    }

    if !cfg.api.websocket.enabled && !cfg.api.tcp.enabled {
        out.push(Diagnostic::error(
            "api",
            "both transports are disabled; no client can connect",
        ));
    }
    if cfg.api.websocket.enabled
        && cfg.api.tcp.enabled
        && cfg.api.websocket.port == cfg.api.tcp.port
    {
        out.push(Diagnostic::error(
            "api.tcp.port",
            "websocket and tcp transports share a port",
        ));
    }

    if cfg.rate_limits.default.per_minute == 0 {
        out.push(Diagnostic::error(
            "rate_limits.default.per_minute",
            "per_minute must be non-zero",
        ));
    }
    if cfg.channels.history_size == 0 {
        out.push(Diagnostic::warning(
            "channels.history_size",
            "history_size of 0 disables channel history",
        ));
    }
    if cfg.state.persistence_enabled {
        out.push(Diagnostic::warning(
            "state.persistence_enabled",
            "no persistence backend ships with the gateway; provide one via the Persistence trait",
        ));
    }
    if cfg.connection.reconnect_delay_s > cfg.connection.reconnect_delay_cap_s {
        out.push(Diagnostic::error(
            "connection.reconnect_delay_s",
            "base reconnect delay exceeds its cap",
        ));
    }

    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CredentialConfig, RouterHostConfig};

    fn valid_config() -> MudgateConfig {
        let mut cfg = MudgateConfig::default();
        cfg.mud.name = "Alpha".into();
        cfg.routers.push(RouterHostConfig {
            name: "*i3".into(),
            host: "204.209.44.3".into(),
            port: 8080,
            password: 0,
        });
        cfg.auth.credentials.push(CredentialConfig {
            key_hash: "a".repeat(64),
            mud_name: "Alpha".into(),
            permissions: vec!["*".into()],
            rate_limit_override: None,
        });
        cfg
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        let diags = validate(&valid_config());
        assert!(diags.iter().all(|d| d.severity != Severity::Error), "{diags:?}");
    }

    #[test]
    fn test_missing_name_and_routers() {
        let diags = validate(&MudgateConfig::default());
        assert!(diags.iter().any(|d| d.path == "mud.name"));
        assert!(diags.iter().any(|d| d.path == "routers"));
    }

    #[test]
    fn test_plaintext_key_rejected() {
        let mut cfg = valid_config();
        cfg.auth.credentials[0].key_hash = "my-secret-key".into();
        let diags = validate(&cfg);
        assert!(
            diags
                .iter()
                .any(|d| d.path == "auth.credentials[0].key_hash"
                    && d.severity == Severity::Error)
        );
    }

    #[test]
    fn test_port_collision() {
        let mut cfg = valid_config();
        cfg.api.tcp.port = cfg.api.websocket.port;
        let diags = validate(&cfg);
        assert!(diags.iter().any(|d| d.path == "api.tcp.port"));
    }
}
