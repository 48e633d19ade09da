use std::path::Path;

use tracing::{debug, warn};

use crate::{ConfigError, env_subst::substitute_env, schema::MudgateConfig};

/// Standard config file name, looked for in the working directory.
const CONFIG_FILENAME: &str = "mudgate.toml";

/// Load config from an explicit path.
pub fn load_config(path: &Path) -> Result<MudgateConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&raw, &path.display().to_string())
}

/// Parse config from a string, applying `${ENV_VAR}` substitution first.
pub fn load_str(raw: &str, origin: &str) -> Result<MudgateConfig, ConfigError> {
    let raw = substitute_env(raw);
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: origin.to_owned(),
        source,
    })
}

/// Load `./mudgate.toml` when present, otherwise defaults.
#[must_use]
pub fn discover_and_load() -> MudgateConfig {
    let path = Path::new(CONFIG_FILENAME);
    if path.exists() {
        debug!(path = %path.display(), "loading config");
        match load_config(path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MudgateConfig::default()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {std::io::Write, tempfile::NamedTempFile};

    use super::*;

    const SAMPLE: &str = r#"
        [mud]
        name = "Alpha"
        port = 4000
        admin_email = "admin@alpha.example"

        [[routers]]
        name = "*i3"
        host = "204.209.44.3"
        port = 8080

        [[routers]]
        name = "*backup"
        host = "198.51.100.4"
        port = 8080
        password = 42

        [auth]
        enabled = true

        [[auth.credentials]]
        key_hash = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        mud_name = "Alpha"
        permissions = ["tell", "channel", "info"]

        [rate_limits.by_method]
        tell = 30
    "#;

    #[test]
    fn test_parse_sample() {
        let cfg = load_str(SAMPLE, "test").unwrap();
        assert_eq!(cfg.mud.name, "Alpha");
        assert_eq!(cfg.routers.len(), 2);
        assert_eq!(cfg.routers[1].password, 42);
        assert_eq!(cfg.auth.credentials.len(), 1);
        assert_eq!(
            cfg.auth.credentials[0].permissions,
            vec!["tell", "channel", "info"]
        );
        assert_eq!(cfg.rate_limits.by_method.get("tell"), Some(&30));
        // Untouched sections keep their defaults.
        assert_eq!(cfg.session.timeout_s, 3600);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.mud.name, "Alpha");
    }

    #[test]
    fn test_parse_error_reports_path() {
        let err = load_str("mud = 3", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
