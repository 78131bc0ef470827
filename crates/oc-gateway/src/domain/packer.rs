//! The block packer.
//!
//! Folds queued chunks into candidate blocks. Emission needs three
//! things at once: the downstream pipeline idle, a head pair to build
//! against, and chunks in the queue. Two events can trigger it: the
//! periodic tick takes whatever is queued, while the push notification
//! only reacts once the queue has reached its threshold, so a burst is
//! packed promptly but a trickle waits for the tick.
//!
//! The `downstream_ready` flag is the system's back-pressure point:
//! it is cleared when a block is handed to the writer and set again
//! only by the writer's next status update, so at most one block is
//! ever in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use oc_core::{Big256, Block};

use super::queue::ChunkQueue;

/// Head state published by the writer after boot and after every
/// ledger response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Hash the next block must extend.
    pub previous_hash: Big256,
    /// Difficulty the next block must carry.
    pub difficulty: Big256,
    /// Whether the preceding submission was accepted. Informational;
    /// the head pair is authoritative either way.
    pub ok: bool,
}

/// The packer task. Consumes queue notifications and writer status
/// updates, produces candidate blocks.
pub struct Packer {
    queue: Arc<ChunkQueue>,
    notify_rx: mpsc::Receiver<()>,
    status_rx: mpsc::Receiver<StatusUpdate>,
    block_tx: mpsc::Sender<Block>,
    interval: Duration,
    threshold: usize,
    shutdown: watch::Receiver<bool>,
}

impl Packer {
    /// Wires a packer to its queue and channels.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<ChunkQueue>,
        notify_rx: mpsc::Receiver<()>,
        status_rx: mpsc::Receiver<StatusUpdate>,
        block_tx: mpsc::Sender<Block>,
        interval: Duration,
        threshold: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Packer {
            queue,
            notify_rx,
            status_rx,
            block_tx,
            interval,
            threshold,
            shutdown,
        }
    }

    /// Runs until the shutdown signal fires.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            threshold = self.threshold,
            "packer started"
        );

        // No blocks can be built until the writer seeds the head.
        let mut head: Option<(Big256, Big256)> = None;
        let mut downstream_ready = false;

        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The interval fires immediately once; swallow that so the
        // first real tick lands a full period in.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("packer stopping");
                    break;
                }
                _ = tick.tick() => {
                    self.maybe_emit(&mut downstream_ready, &head, 1).await;
                }
                // While the pipeline is busy, push signals stay queued
                // in the notify channel and are replayed as soon as
                // the writer reports back.
                notified = self.notify_rx.recv(), if downstream_ready => {
                    if notified.is_none() {
                        debug!("queue closed, packer stopping");
                        break;
                    }
                    self.maybe_emit(&mut downstream_ready, &head, self.threshold).await;
                }
                update = self.status_rx.recv() => {
                    match update {
                        Some(update) => {
                            debug!(
                                previous_hash = %update.previous_hash,
                                difficulty = %update.difficulty,
                                ok = update.ok,
                                "head updated"
                            );
                            head = Some((update.previous_hash, update.difficulty));
                            downstream_ready = true;
                        }
                        None => {
                            debug!("status channel closed, packer stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Emits a block when the pipeline is idle, the head is known, and
    /// at least `min_chunks` are queued.
    async fn maybe_emit(
        &self,
        downstream_ready: &mut bool,
        head: &Option<(Big256, Big256)>,
        min_chunks: usize,
    ) {
        if !*downstream_ready {
            return;
        }
        let Some((previous_hash, difficulty)) = head else {
            return;
        };
        if self.queue.len() < min_chunks.max(1) {
            return;
        }

        let chunks = self.queue.drain();
        if chunks.is_empty() {
            return;
        }

        match Block::build(previous_hash, difficulty, &chunks) {
            Ok(block) => {
                info!(
                    entries = chunks.len(),
                    previous_hash = %previous_hash,
                    "candidate block packed"
                );
                *downstream_ready = false;
                if self.block_tx.send(block).await.is_err() {
                    warn!("writer is gone, dropping candidate block");
                }
            }
            Err(err) => {
                // The chunks are already out of the queue; they are
                // dropped with the failed build.
                warn!(%err, dropped = chunks.len(), "could not pack chunks into a block");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::Chunk;

    struct Rig {
        queue: Arc<ChunkQueue>,
        status_tx: mpsc::Sender<StatusUpdate>,
        block_rx: mpsc::Receiver<Block>,
        shutdown: watch::Sender<bool>,
    }

    fn start_packer(capacity: usize, threshold: usize, interval: Duration) -> Rig {
        let (queue, notify_rx) = ChunkQueue::new(capacity);
        let (status_tx, status_rx) = mpsc::channel(4);
        let (block_tx, block_rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let packer = Packer::new(
            Arc::clone(&queue),
            notify_rx,
            status_rx,
            block_tx,
            interval,
            threshold,
            shutdown_rx,
        );
        tokio::spawn(packer.run());

        Rig {
            queue,
            status_tx,
            block_rx,
            shutdown,
        }
    }

    fn chunk(tag: u8) -> Chunk {
        Chunk::new(vec![tag]).unwrap()
    }

    fn status(hash_byte: u8) -> StatusUpdate {
        StatusUpdate {
            previous_hash: Big256::from_bytes([hash_byte; 32]),
            difficulty: Big256::ONE,
            ok: true,
        }
    }

    async fn recv_block(rx: &mut mpsc::Receiver<Block>) -> Block {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a block")
            .expect("block channel closed")
    }

    #[tokio::test]
    async fn threshold_pushes_trigger_emission() {
        let mut rig = start_packer(8, 3, Duration::from_secs(3600));
        rig.status_tx.send(status(7)).await.unwrap();

        for i in 0..3 {
            rig.queue.push(chunk(i));
        }

        let block = recv_block(&mut rig.block_rx).await;
        assert_eq!(block.entry_count(), 3);
        assert_eq!(block.previous_hash(), Big256::from_bytes([7u8; 32]));
        assert!(block.difficulty().is_one());

        let entries: Vec<u8> = block.entries().map(|c| c.data()[0]).collect();
        assert_eq!(entries, vec![0, 1, 2]);

        let _ = rig.shutdown.send(true);
    }

    #[tokio::test]
    async fn nothing_emits_before_the_first_status() {
        let mut rig = start_packer(8, 1, Duration::from_millis(20));
        for i in 0..4 {
            rig.queue.push(chunk(i));
        }

        let waited =
            tokio::time::timeout(Duration::from_millis(200), rig.block_rx.recv()).await;
        assert!(waited.is_err(), "no head pair, no block");

        let _ = rig.shutdown.send(true);
    }

    #[tokio::test]
    async fn below_threshold_waits_for_the_tick() {
        let mut rig = start_packer(8, 5, Duration::from_millis(100));
        rig.status_tx.send(status(1)).await.unwrap();

        rig.queue.push(chunk(42));

        // The single chunk is below the threshold, so only the tick
        // can pick it up.
        let block = recv_block(&mut rig.block_rx).await;
        assert_eq!(block.entry_count(), 1);
        assert_eq!(block.entries().next().unwrap().data(), &[42]);

        let _ = rig.shutdown.send(true);
    }

    #[tokio::test]
    async fn one_block_in_flight_until_the_next_status() {
        let mut rig = start_packer(8, 1, Duration::from_millis(20));
        rig.status_tx.send(status(1)).await.unwrap();

        rig.queue.push(chunk(0));
        let first = recv_block(&mut rig.block_rx).await;
        assert_eq!(first.entry_count(), 1);

        // The pipeline is busy; more chunks must not produce a block.
        rig.queue.push(chunk(1));
        rig.queue.push(chunk(2));
        let waited =
            tokio::time::timeout(Duration::from_millis(200), rig.block_rx.recv()).await;
        assert!(waited.is_err(), "downstream not ready, nothing may emit");

        // The writer reports back; the queued chunks flow again.
        rig.status_tx.send(status(2)).await.unwrap();
        let second = recv_block(&mut rig.block_rx).await;
        assert_eq!(second.entry_count(), 2);
        assert_eq!(second.previous_hash(), Big256::from_bytes([2u8; 32]));

        let _ = rig.shutdown.send(true);
    }
}
