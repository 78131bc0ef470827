//! Ledger host configuration.

use std::env;

use oc_storage::StorageConfig;

/// Runtime parameters of the ledger host.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Port of the read server.
    pub read_port: u16,
    /// Port of the write server.
    pub write_port: u16,
    /// Workers on the read server.
    pub read_workers: usize,
    /// Storage roots.
    pub storage: StorageConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            read_port: 8000,
            write_port: 8010,
            read_workers: 4,
            storage: StorageConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by `OPAL_LH_READ_PORT`, `OPAL_LH_WRITE_PORT`,
    /// `OPAL_LH_READ_WORKERS`, and the storage variables.
    pub fn from_env() -> Self {
        let mut config = LedgerConfig {
            storage: StorageConfig::from_env(),
            ..LedgerConfig::default()
        };
        if let Some(port) = env_parse("OPAL_LH_READ_PORT") {
            config.read_port = port;
        }
        if let Some(port) = env_parse("OPAL_LH_WRITE_PORT") {
            config.write_port = port;
        }
        if let Some(workers) = env_parse("OPAL_LH_READ_WORKERS") {
            config.read_workers = workers;
        }
        config
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
