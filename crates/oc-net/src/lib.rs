//! # TCP Server Scaffolding
//!
//! A listener with an acceptor task and a fixed pool of worker tasks.
//! The acceptor pushes accepted connections into a queue; each worker
//! owns one connection at a time, runs the handler on it, and closes
//! it. Write paths use a pool of one to serialize their handling;
//! read paths run several workers.
//!
//! Shutdown is cooperative: the acceptor is signalled, stops taking
//! connections, and drops the queue, after which workers drain what
//! was already accepted and exit.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Listener parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind; zero picks an ephemeral port.
    pub port: u16,
    /// Number of worker tasks.
    pub worker_count: usize,
}

/// A running listener and its worker pool.
pub struct Server {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds `0.0.0.0:port` and starts the acceptor and workers.
    ///
    /// The handler is invoked once per accepted connection and owns
    /// the stream for its duration.
    pub async fn bind<H, Fut>(
        name: &'static str,
        config: ServerConfig,
        handler: H,
    ) -> io::Result<Server>
    where
        H: Fn(TcpStream) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(server = name, addr = %local_addr, workers = config.worker_count, "listening");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (conn_tx, conn_rx) = mpsc::channel::<TcpStream>(config.worker_count.max(1));
        let conn_rx = Arc::new(Mutex::new(conn_rx));

        let mut tasks = Vec::with_capacity(config.worker_count + 1);
        tasks.push(tokio::spawn(accept_loop(name, listener, conn_tx, shutdown_rx)));

        for worker_id in 0..config.worker_count.max(1) {
            let conn_rx = Arc::clone(&conn_rx);
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let conn = { conn_rx.lock().await.recv().await };
                    match conn {
                        Some(stream) => {
                            debug!(server = name, worker_id, "handling connection");
                            handler(stream).await;
                        }
                        None => {
                            debug!(server = name, worker_id, "queue closed, worker exiting");
                            break;
                        }
                    }
                }
            }));
        }

        Ok(Server {
            name,
            local_addr,
            shutdown,
            tasks,
        })
    }

    /// The address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, drains the workers, and waits for every task.
    pub async fn shutdown(self) {
        info!(server = self.name, "stopping");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(server = self.name, %err, "server task ended abnormally");
            }
        }
        info!(server = self.name, "stopped");
    }
}

async fn accept_loop(
    name: &'static str,
    listener: TcpListener,
    conn_tx: mpsc::Sender<TcpStream>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(server = name, "acceptor stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(server = name, %peer, "connection accepted");
                    if conn_tx.send(stream).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(server = name, %err, "accept failed");
                }
            },
        }
    }
    // Dropping the sender lets idle workers observe the close.
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn echo_server(workers: usize) -> Server {
        Server::bind(
            "echo",
            ServerConfig {
                port: 0,
                worker_count: workers,
            },
            |mut stream: TcpStream| async move {
                let mut buffer = Vec::new();
                if stream.read_to_end(&mut buffer).await.is_ok() {
                    let _ = stream.write_all(&buffer).await;
                }
            },
        )
        .await
        .unwrap()
    }

    async fn echo_once(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_connections_and_shuts_down() {
        let server = echo_server(2).await;
        let addr = server.local_addr();

        assert_eq!(echo_once(addr, b"hello").await, b"hello");
        assert_eq!(echo_once(addr, b"again").await, b"again");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn single_worker_serializes_but_serves_all() {
        let server = echo_server(1).await;
        let addr = server.local_addr();

        let mut handles = Vec::new();
        for i in 0..4u8 {
            handles.push(tokio::spawn(async move {
                echo_once(addr, &[i, i, i]).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), vec![i as u8; 3]);
        }

        server.shutdown().await;
    }
}
