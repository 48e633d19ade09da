//! Configuration loading, validation, and env substitution.
//!
//! Config file: `mudgate.toml`, searched in the working directory unless an
//! explicit path is given. Supports `${ENV_VAR}` substitution in all string
//! values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

use thiserror::Error;

pub use {
    loader::{discover_and_load, load_config, load_str},
    schema::{
        ApiConfig, AuthConfig, ChannelDef, ChannelsConfig, ConnectionConfig, CredentialConfig,
        IpFilterConfig, MudConfig, MudgateConfig, OobServicesConfig, RateLimitConfig,
        RateLimitsConfig, RouterHostConfig, ServicesConfig, SessionConfig, StateConfig, TcpConfig,
        WebSocketConfig,
    },
    validate::{Diagnostic, Severity, validate},
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
