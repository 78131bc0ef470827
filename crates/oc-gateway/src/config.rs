//! Gateway configuration.

use std::env;
use std::time::Duration;

/// Runtime parameters of the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port of the client-facing read server.
    pub read_port: u16,
    /// Port of the client-facing write server.
    pub write_port: u16,
    /// Workers on each client-facing server.
    pub server_workers: usize,
    /// Ledger host name or address.
    pub ledger_host: String,
    /// Ledger host read port.
    pub ledger_read_port: u16,
    /// Ledger host write port.
    pub ledger_write_port: u16,
    /// Chunk queue capacity.
    pub queue_capacity: usize,
    /// Queue depth that triggers packing ahead of the tick.
    pub packer_threshold: usize,
    /// Packer tick interval.
    pub packer_interval: Duration,
    /// Miner worker threads.
    pub miner_count: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            read_port: 9000,
            write_port: 9010,
            server_workers: 4,
            ledger_host: "127.0.0.1".to_string(),
            ledger_read_port: 8000,
            ledger_write_port: 8010,
            queue_capacity: 8,
            packer_threshold: 5,
            packer_interval: Duration::from_secs(30),
            miner_count: 4,
        }
    }
}

impl GatewayConfig {
    /// Defaults overridden by the `OPAL_GW_*` and `OPAL_LEDGER_*`
    /// environment variables.
    pub fn from_env() -> Self {
        let mut config = GatewayConfig::default();
        if let Some(port) = env_parse("OPAL_GW_READ_PORT") {
            config.read_port = port;
        }
        if let Some(port) = env_parse("OPAL_GW_WRITE_PORT") {
            config.write_port = port;
        }
        if let Some(workers) = env_parse("OPAL_GW_SERVER_WORKERS") {
            config.server_workers = workers;
        }
        if let Ok(host) = env::var("OPAL_LEDGER_HOST") {
            config.ledger_host = host;
        }
        if let Some(port) = env_parse("OPAL_LEDGER_READ_PORT") {
            config.ledger_read_port = port;
        }
        if let Some(port) = env_parse("OPAL_LEDGER_WRITE_PORT") {
            config.ledger_write_port = port;
        }
        if let Some(capacity) = env_parse("OPAL_CHUNK_QUEUE_CAPACITY") {
            config.queue_capacity = capacity;
        }
        if let Some(threshold) = env_parse("OPAL_PACKER_THRESHOLD") {
            config.packer_threshold = threshold;
        }
        if let Some(seconds) = env_parse::<u64>("OPAL_PACKER_INTERVAL_SECS") {
            config.packer_interval = Duration::from_secs(seconds);
        }
        if let Some(count) = env_parse("OPAL_MINER_COUNT") {
            config.miner_count = count;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
