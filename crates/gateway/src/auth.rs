//! Credential validation, rate limiting, and IP filtering.
//!
//! API keys are opaque strings; the config stores only their SHA-256 as hex.
//! Verification hashes the presented key and compares constant-time, every
//! configured credential on every attempt.

use std::{
    collections::HashMap,
    net::IpAddr,
    time::Instant,
};

use {
    ipnet::IpNet,
    metrics::counter,
    sha2::{Digest, Sha256},
    subtle::ConstantTimeEq,
    tracing::{info, warn},
};

use mudgate_config::{AuthConfig, IpFilterConfig, RateLimitsConfig};

// ── Credentials ──────────────────────────────────────────────────────────────

/// A configured API credential, resolved at load time.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Lowercased hex SHA-256 of the key.
    key_hash: String,
    pub mud_name: String,
    pub permissions: Vec<String>,
    pub rate_limit_override: Option<u32>,
}

/// The outcome of a successful credential check.
#[derive(Debug, Clone)]
pub struct Verified {
    pub mud_name: String,
    pub permissions: Vec<String>,
    pub rate_limit_override: Option<u32>,
}

pub struct AuthEngine {
    enabled: bool,
    credentials: Vec<Credential>,
    ip_filter: IpFilter,
}

impl AuthEngine {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let credentials = config
            .credentials
            .iter()
            .map(|c| Credential {
                key_hash: c.key_hash.to_lowercase(),
                mud_name: c.mud_name.clone(),
                permissions: c.permissions.clone(),
                rate_limit_override: c.rate_limit_override,
            })
            .collect();
        Self {
            enabled: config.enabled,
            credentials,
            ip_filter: IpFilter::new(&config.ip_filter),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The IP filter runs before any credential work.
    #[must_use]
    pub fn ip_allowed(&self, ip: IpAddr) -> bool {
        self.ip_filter.is_allowed(ip)
    }

    /// Validate an opaque API key. Every configured hash is compared in
    /// constant time regardless of where a match lands.
    #[must_use]
    pub fn verify_key(&self, api_key: &str) -> Option<Verified> {
        let presented = hex_digest(api_key);
        let mut matched: Option<&Credential> = None;
        for credential in &self.credentials {
            let equal: bool = presented
                .as_bytes()
                .ct_eq(credential.key_hash.as_bytes())
                .into();
            if equal && matched.is_none() {
                matched = Some(credential);
            }
        }
        match matched {
            Some(credential) => {
                counter!("auth_success_total").increment(1);
                info!(mud_name = %credential.mud_name, "auth: key accepted");
                Some(Verified {
                    mud_name: credential.mud_name.clone(),
                    permissions: credential.permissions.clone(),
                    rate_limit_override: credential.rate_limit_override,
                })
            },
            None => {
                counter!("auth_failure_total").increment(1);
                warn!("auth: key rejected");
                None
            },
        }
    }
}

fn hex_digest(key: &str) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ── IP filter ────────────────────────────────────────────────────────────────

/// CIDR allow/block lists. Blocklist wins; a non-empty allowlist is
/// exclusive.
pub struct IpFilter {
    enabled: bool,
    allowlist: Vec<IpNet>,
    blocklist: Vec<IpNet>,
}

impl IpFilter {
    #[must_use]
    pub fn new(config: &IpFilterConfig) -> Self {
        Self {
            enabled: config.enabled,
            allowlist: parse_nets(&config.allowlist),
            blocklist: parse_nets(&config.blocklist),
        }
    }

    #[must_use]
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        if self.blocklist.iter().any(|net| net.contains(&ip)) {
            counter!("auth_ip_blocked_total").increment(1);
            return false;
        }
        if !self.allowlist.is_empty() {
            return self.allowlist.iter().any(|net| net.contains(&ip));
        }
        true
    }
}

fn parse_nets(entries: &[String]) -> Vec<IpNet> {
    entries
        .iter()
        .filter_map(|entry| {
            // Bare addresses are /32 (or /128) networks.
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| warn!(entry = %entry, "auth: bad ip filter entry"))
                .ok()
        })
        .collect()
}

// ── Rate limiting ────────────────────────────────────────────────────────────

/// Token bucket advanced lazily on each check.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    #[must_use]
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self {
            capacity: f64::from(burst.max(1)),
            tokens: f64::from(burst.max(1)),
            refill_per_sec: f64::from(per_minute) / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Consume one token if available.
    pub fn check(&mut self) -> bool {
        self.advance(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn advance(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    #[cfg(test)]
    fn backdate(&mut self, by: std::time::Duration) {
        self.last_refill -= by;
    }
}

/// Per-session limiter: one default bucket plus lazily-created buckets for
/// methods with their own configured `per_minute`.
pub struct SessionLimiter {
    default: TokenBucket,
    by_method: HashMap<String, TokenBucket>,
    method_limits: HashMap<String, u32>,
}

impl SessionLimiter {
    /// `override_per_minute` comes from the credential, trumping the default
    /// bucket size.
    #[must_use]
    pub fn new(config: &RateLimitsConfig, override_per_minute: Option<u32>) -> Self {
        let (per_minute, burst) = match override_per_minute {
            Some(per_minute) => (per_minute, (per_minute / 3).max(1)),
            None => (config.default.per_minute, config.default.burst),
        };
        Self {
            default: TokenBucket::new(per_minute, burst),
            by_method: HashMap::new(),
            method_limits: config.by_method.clone(),
        }
    }

    /// One token per request, drawn from the method's bucket when the method
    /// has its own limit.
    pub fn check(&mut self, method: &str) -> bool {
        if let Some(&per_minute) = self.method_limits.get(method) {
            let bucket = self
                .by_method
                .entry(method.to_owned())
                .or_insert_with(|| TokenBucket::new(per_minute, (per_minute / 3).max(1)));
            return bucket.check();
        }
        self.default.check()
    }
}
