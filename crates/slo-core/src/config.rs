//! Logout handler configuration.
//!
//! Loaded from a TOML file, optionally overridden by `SLO_*` environment
//! variables:
//!
//! ```toml
//! kill_session = true
//!
//! [store]
//! capacity = 10000
//! expiration = "1h"
//! backend = "memory"   # or "redis", which then requires `url`
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default maximum number of entries in each correlation map.
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default idle expiration, measured from the last write.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(3600);
/// Default key prefix used by the redis backend.
pub const DEFAULT_REDIS_PREFIX: &str = "slo:";

pub const ENV_KILL_SESSION: &str = "SLO_KILL_SESSION";
pub const ENV_STORE_CAPACITY: &str = "SLO_STORE_CAPACITY";
pub const ENV_STORE_EXPIRATION: &str = "SLO_STORE_EXPIRATION";

// ── Resolved configuration ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogoutConfig {
    /// Invalidate the whole web session on logout, not only the profiles.
    pub kill_session: bool,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub capacity: usize,
    pub expiration: Duration,
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            expiration: DEFAULT_EXPIRATION,
            backend: StoreBackend::Memory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis { url: String, prefix: String },
}

// ── File format ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    kill_session: bool,
    store: StoreSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StoreSection {
    capacity: Option<usize>,
    expiration: Option<String>,
    backend: Option<String>,
    url: Option<String>,
    prefix: Option<String>,
}

pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let parse = |n: &str, unit: &str, scale: u64| -> Result<Duration> {
        let n: u64 = n
            .parse()
            .map_err(|_| Error::Config(format!("invalid {unit} in duration '{s}'")))?;
        n.checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::Config(format!("duration '{s}' is too large")))
    };
    if let Some(hours) = s.strip_suffix('h') {
        return parse(hours, "hours", 3600);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return parse(mins, "minutes", 60);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return parse(secs, "seconds", 1);
    }
    Err(Error::Config(format!(
        "unsupported duration format: '{s}' (use '90s', '5m', or '1h')"
    )))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{name}: expected a boolean, got '{other}'"))),
    }
}

impl LogoutConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config TOML: {e}")))?;
        let config = Self {
            kill_session: file.kill_session,
            store: resolve_store(file.store)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `SLO_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_KILL_SESSION) {
            self.kill_session = parse_bool(ENV_KILL_SESSION, &v)?;
        }
        if let Some(v) = lookup(ENV_STORE_CAPACITY) {
            self.store.capacity = v.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_STORE_CAPACITY}: expected an integer, got '{v}'"))
            })?;
        }
        if let Some(v) = lookup(ENV_STORE_EXPIRATION) {
            self.store.expiration = parse_duration(&v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.capacity == 0 {
            return Err(Error::Config("store capacity must be greater than zero".into()));
        }
        if self.store.expiration.is_zero() {
            return Err(Error::Config("store expiration must be greater than zero".into()));
        }
        if let StoreBackend::Redis { url, .. } = &self.store.backend {
            if url.trim().is_empty() {
                return Err(Error::Config("redis backend requires a non-empty url".into()));
            }
        }
        Ok(())
    }
}

fn resolve_store(section: StoreSection) -> Result<StoreConfig> {
    let expiration = match &section.expiration {
        Some(e) => parse_duration(e)?,
        None => DEFAULT_EXPIRATION,
    };
    let backend = match section.backend.as_deref() {
        None | Some("memory") => StoreBackend::Memory,
        Some("redis") => StoreBackend::Redis {
            url: section.url.unwrap_or_default(),
            prefix: section
                .prefix
                .unwrap_or_else(|| DEFAULT_REDIS_PREFIX.to_string()),
        },
        Some(other) => {
            return Err(Error::Config(format!("unknown store backend: '{other}'")));
        }
    };
    Ok(StoreConfig {
        capacity: section.capacity.unwrap_or(DEFAULT_CAPACITY),
        expiration,
        backend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = LogoutConfig::default();
        assert!(!config.kill_session);
        assert_eq!(config.store.capacity, 10_000);
        assert_eq!(config.store.expiration, Duration::from_secs(3600));
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = LogoutConfig::from_toml_str("").unwrap();
        assert_eq!(config, LogoutConfig::default());
    }

    #[test]
    fn parses_full_file() {
        let config = LogoutConfig::from_toml_str(
            r#"
kill_session = true

[store]
capacity = 500
expiration = "30m"
backend = "redis"
url = "redis://127.0.0.1:6379"
"#,
        )
        .unwrap();
        assert!(config.kill_session);
        assert_eq!(config.store.capacity, 500);
        assert_eq!(config.store.expiration, Duration::from_secs(1800));
        assert_eq!(
            config.store.backend,
            StoreBackend::Redis {
                url: "redis://127.0.0.1:6379".into(),
                prefix: DEFAULT_REDIS_PREFIX.into(),
            }
        );
    }

    #[test]
    fn rejects_zero_capacity_and_unknown_backend() {
        assert!(LogoutConfig::from_toml_str("[store]\ncapacity = 0\n").is_err());
        assert!(LogoutConfig::from_toml_str("[store]\nbackend = \"disk\"\n").is_err());
        assert!(LogoutConfig::from_toml_str("[store]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("xh").is_err());
    }

    #[test]
    fn parse_duration_rejects_overflow() {
        let err = parse_duration("10000000000000000h").unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(parse_duration("400000000000000000m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s").unwrap(),
            Duration::from_secs(u64::MAX)
        );

        let mut config = LogoutConfig::default();
        let err = config
            .apply_env_from(|k| (k == ENV_STORE_EXPIRATION).then(|| "10000000000000000h".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (ENV_KILL_SESSION, "true"),
            (ENV_STORE_CAPACITY, "42"),
            (ENV_STORE_EXPIRATION, "10s"),
        ]
        .into_iter()
        .collect();
        let mut config = LogoutConfig::default();
        config
            .apply_env_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.kill_session);
        assert_eq!(config.store.capacity, 42);
        assert_eq!(config.store.expiration, Duration::from_secs(10));
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut config = LogoutConfig::default();
        let err = config
            .apply_env_from(|k| (k == ENV_KILL_SESSION).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_KILL_SESSION));
    }
}
