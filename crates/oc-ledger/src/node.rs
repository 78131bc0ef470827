//! Process wiring for the ledger host.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use oc_net::{Server, ServerConfig};
use oc_storage::{BlockRepository, StorageError};

use crate::config::LedgerConfig;
use crate::domain::ledger::Ledger;
use crate::service;

/// Failure to bring the ledger host up.
#[derive(Debug, Error)]
pub enum StartError {
    /// The store could not be opened.
    #[error("could not open the block store: {0}")]
    Storage(#[from] StorageError),

    /// A listener could not be bound.
    #[error("could not bind a server: {0}")]
    Io(#[from] std::io::Error),
}

/// A running ledger host: the store, one write server, one read
/// server.
pub struct LedgerNode {
    ledger: Arc<Ledger>,
    read_server: Server,
    write_server: Server,
}

impl LedgerNode {
    /// Opens the store and starts both servers.
    pub async fn start(config: LedgerConfig) -> Result<LedgerNode, StartError> {
        info!(
            blockchain_dir = %config.storage.blockchain_dir.display(),
            index_dir = %config.storage.index_dir.display(),
            "opening block store"
        );
        let repository = Arc::new(BlockRepository::open(config.storage.clone())?);
        let ledger = Arc::new(Ledger::new(repository));

        let write_ledger = Arc::clone(&ledger);
        let write_server = Server::bind(
            "ledger-write",
            ServerConfig {
                port: config.write_port,
                worker_count: 1,
            },
            move |stream| service::handle_write_connection(Arc::clone(&write_ledger), stream),
        )
        .await?;

        let read_ledger = Arc::clone(&ledger);
        let read_server = Server::bind(
            "ledger-read",
            ServerConfig {
                port: config.read_port,
                worker_count: config.read_workers,
            },
            move |stream| service::handle_read_connection(Arc::clone(&read_ledger), stream),
        )
        .await?;

        Ok(LedgerNode {
            ledger,
            read_server,
            write_server,
        })
    }

    /// Address of the read server.
    pub fn read_addr(&self) -> SocketAddr {
        self.read_server.local_addr()
    }

    /// Address of the write server.
    pub fn write_addr(&self) -> SocketAddr {
        self.write_server.local_addr()
    }

    /// The ledger behind the servers.
    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    /// Stops both servers and waits for their workers.
    pub async fn shutdown(self) {
        self.write_server.shutdown().await;
        self.read_server.shutdown().await;
        info!("ledger host stopped");
    }
}
