//! Process wiring for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use oc_net::{Server, ServerConfig};

use crate::client::TcpLedgerClient;
use crate::config::GatewayConfig;
use crate::domain::miner::MinerPool;
use crate::domain::packer::Packer;
use crate::domain::queue::ChunkQueue;
use crate::domain::writer::BlockWriter;
use crate::service;

/// A running gateway: servers, packer, miners, writer.
pub struct GatewayNode {
    read_server: Server,
    write_server: Server,
    packer_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl GatewayNode {
    /// Starts the pipeline and both servers.
    ///
    /// Spawn order follows the data flow: queue, packer, miners and
    /// writer, then the client-facing listeners.
    pub async fn start(config: GatewayConfig) -> std::io::Result<GatewayNode> {
        info!(
            ledger_host = %config.ledger_host,
            ledger_read_port = config.ledger_read_port,
            ledger_write_port = config.ledger_write_port,
            miners = config.miner_count,
            "starting gateway"
        );

        let (shutdown, shutdown_rx) = watch::channel(false);

        let (queue, notify_rx) = ChunkQueue::new(config.queue_capacity);
        let (status_tx, status_rx) = mpsc::channel(4);
        let (block_tx, block_rx) = mpsc::channel(1);

        let packer = Packer::new(
            Arc::clone(&queue),
            notify_rx,
            status_rx,
            block_tx,
            config.packer_interval,
            config.packer_threshold,
            shutdown_rx.clone(),
        );
        let packer_task = tokio::spawn(packer.run());

        let client = Arc::new(TcpLedgerClient::new(
            config.ledger_host.clone(),
            config.ledger_read_port,
            config.ledger_write_port,
        ));
        let writer = BlockWriter::new(
            Arc::clone(&client),
            MinerPool::spawn(config.miner_count),
            block_rx,
            status_tx,
            shutdown_rx,
        );
        let writer_task = tokio::spawn(writer.run());

        let write_queue = Arc::clone(&queue);
        let write_server = Server::bind(
            "gateway-write",
            ServerConfig {
                port: config.write_port,
                worker_count: config.server_workers,
            },
            move |stream| service::handle_write_connection(Arc::clone(&write_queue), stream),
        )
        .await?;

        let read_client = Arc::clone(&client);
        let read_server = Server::bind(
            "gateway-read",
            ServerConfig {
                port: config.read_port,
                worker_count: config.server_workers,
            },
            move |stream| service::handle_read_connection(Arc::clone(&read_client), stream),
        )
        .await?;

        Ok(GatewayNode {
            read_server,
            write_server,
            packer_task,
            writer_task,
            shutdown,
        })
    }

    /// Address of the client-facing read server.
    pub fn read_addr(&self) -> SocketAddr {
        self.read_server.local_addr()
    }

    /// Address of the client-facing write server.
    pub fn write_addr(&self) -> SocketAddr {
        self.write_server.local_addr()
    }

    /// Stops the servers first, then the pipeline, teardown in the
    /// reverse of the spawn order.
    pub async fn shutdown(self) {
        self.write_server.shutdown().await;
        self.read_server.shutdown().await;

        let _ = self.shutdown.send(true);
        if let Err(err) = self.packer_task.await {
            warn!(%err, "packer task ended abnormally");
        }
        if let Err(err) = self.writer_task.await {
            warn!(%err, "writer task ended abnormally");
        }
        info!("gateway stopped");
    }
}
