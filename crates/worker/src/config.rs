//! Worker settings read from the environment.

use core::str::FromStr;

use peoplehub_core::ModuleName;
use peoplehub_infra::config::parse;
use peoplehub_infra::{ConfigError, RelayConfig};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_MODULES: &str = "PEOPLEHUB_MODULES";
pub const ENV_DB_MAX_CONNECTIONS: &str = "PEOPLEHUB_DB_MAX_CONNECTIONS";
pub const ENV_LOCK_BACKEND: &str = "PEOPLEHUB_LOCK_BACKEND";

const DEFAULT_MODULES: &str = "identity";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Where the per-module relay locks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockBackend {
    /// Session advisory locks on the outbox database.
    #[default]
    Postgres,
    /// Expiring leases in Redis; requires `REDIS_URL`.
    Redis,
}

impl FromStr for LockBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(LockBackend::Postgres),
            "redis" => Ok(LockBackend::Redis),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Publish to Redis Streams when set; otherwise envelopes are only logged.
    pub redis_url: Option<String>,
    /// One relay runs per module.
    pub modules: Vec<ModuleName>,
    pub db_max_connections: u32,
    pub lock_backend: LockBackend,
    pub relay: RelayConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(ENV_DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;

        let redis_url = lookup(ENV_REDIS_URL).filter(|v| !v.trim().is_empty());

        let raw_modules = lookup(ENV_MODULES)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODULES.to_string());
        let mut modules: Vec<ModuleName> = Vec::new();
        for name in raw_modules.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let module = ModuleName::new(name).map_err(|_| ConfigError::Invalid {
                key: ENV_MODULES,
                value: raw_modules.clone(),
            })?;
            if !modules.contains(&module) {
                modules.push(module);
            }
        }

        let db_max_connections =
            parse(&lookup, ENV_DB_MAX_CONNECTIONS)?.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_DB_MAX_CONNECTIONS,
                value: "0".into(),
            });
        }

        let lock_backend: LockBackend = parse(&lookup, ENV_LOCK_BACKEND)?.unwrap_or_default();
        if lock_backend == LockBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing(ENV_REDIS_URL));
        }

        Ok(Self {
            database_url,
            redis_url,
            modules,
            db_max_connections,
            lock_backend,
            relay: RelayConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key: &str| vars.get(key).cloned())
    }

    #[test]
    fn database_url_is_required() {
        let err = config(&[]).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_DATABASE_URL));
    }

    #[test]
    fn defaults() {
        let config = config(&[(ENV_DATABASE_URL, "postgres://localhost/peoplehub")]).unwrap();

        assert_eq!(config.redis_url, None);
        assert_eq!(config.modules, vec![ModuleName::new("identity").unwrap()]);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.lock_backend, LockBackend::Postgres);
        assert_eq!(config.relay, RelayConfig::default());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            (ENV_DATABASE_URL, "postgres://db/peoplehub"),
            (ENV_REDIS_URL, "redis://cache:6379"),
            (ENV_MODULES, "identity, payroll,identity"),
            (ENV_DB_MAX_CONNECTIONS, "4"),
            ("PEOPLEHUB_OUTBOX_POLL_INTERVAL_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.relay.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn redis_locks_need_a_redis_url() {
        let err = config(&[
            (ENV_DATABASE_URL, "postgres://db/peoplehub"),
            (ENV_LOCK_BACKEND, "redis"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_REDIS_URL));

        let config = config(&[
            (ENV_DATABASE_URL, "postgres://db/peoplehub"),
            (ENV_REDIS_URL, "redis://cache:6379"),
            (ENV_LOCK_BACKEND, "Redis"),
        ])
        .unwrap();
        assert_eq!(config.lock_backend, LockBackend::Redis);
    }

    #[test]
    fn unknown_lock_backend_is_rejected() {
        let err = config(&[
            (ENV_DATABASE_URL, "postgres://db/peoplehub"),
            (ENV_LOCK_BACKEND, "zookeeper"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_LOCK_BACKEND, .. }));
    }

    #[test]
    fn invalid_module_name_is_rejected() {
        let err = config(&[
            (ENV_DATABASE_URL, "postgres://db/peoplehub"),
            (ENV_MODULES, "Identity"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_MODULES, .. }));
    }
}
