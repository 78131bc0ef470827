//! The block writer.
//!
//! A small state machine between the packer and the ledger host:
//!
//! - **Booting** - fetch the head pair from the ledger host and seed
//!   the packer's status channel with it;
//! - **WaitingForBlock** - a candidate arrives from the packer, fan it
//!   out to the miner pool, move on;
//! - **WaitingForMiners** - the first mined block comes back, submit
//!   it, stop the remaining miners, forward the ledger's answer as
//!   the next status update, return to WaitingForBlock.
//!
//! The ledger host is reached over short-lived connections and may be
//! away; both the boot fetch and the submission retry with doubling
//! backoff. A submission that stays unreachable is dropped and the
//! last known head is re-published so the pipeline keeps moving
//! instead of spinning on a dead peer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use oc_core::Block;

use super::miner::MinerPool;
use super::packer::StatusUpdate;
use crate::client::{LedgerApi, MiningInfo};

/// Boot-time fetch attempts before the gateway gives up.
const BOOT_ATTEMPTS: u32 = 10;

/// Submission attempts per mined block.
const SUBMIT_ATTEMPTS: u32 = 5;

/// First backoff step; doubles per retry.
const BACKOFF_START: Duration = Duration::from_millis(250);

/// Longest single backoff sleep.
const BACKOFF_CAP: Duration = Duration::from_secs(8);

/// The writer task.
pub struct BlockWriter<C: LedgerApi> {
    client: Arc<C>,
    pool: MinerPool,
    block_rx: mpsc::Receiver<Block>,
    status_tx: mpsc::Sender<StatusUpdate>,
    shutdown: watch::Receiver<bool>,
}

impl<C: LedgerApi> BlockWriter<C> {
    /// Wires a writer to its client, miners, and channels.
    pub fn new(
        client: Arc<C>,
        pool: MinerPool,
        block_rx: mpsc::Receiver<Block>,
        status_tx: mpsc::Sender<StatusUpdate>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        BlockWriter {
            client,
            pool,
            block_rx,
            status_tx,
            shutdown,
        }
    }

    /// Runs the state machine until shutdown or a failed boot.
    pub async fn run(mut self) {
        let Some(head) = self.boot().await else {
            self.finalize().await;
            return;
        };
        let mut head = head;

        info!(
            previous_hash = %head.previous_hash,
            difficulty = %head.difficulty,
            "block writer ready"
        );
        self.publish(&head, true).await;

        loop {
            // WaitingForBlock
            let block = tokio::select! {
                _ = self.shutdown.changed() => break,
                block = self.block_rx.recv() => match block {
                    Some(block) => block,
                    None => break,
                },
            };

            let (completion_tx, mut completion_rx) = mpsc::channel(self.pool.len());
            self.pool.dispatch(&block, &completion_tx);
            drop(completion_tx);

            // WaitingForMiners
            let mined = tokio::select! {
                _ = self.shutdown.changed() => break,
                mined = completion_rx.recv() => match mined {
                    Some(mined) => mined,
                    None => {
                        error!("all miners dropped the request");
                        self.publish(&head, false).await;
                        continue;
                    }
                },
            };

            info!(hash = %mined.hash(), "mined block received, submitting");
            match self.submit(mined).await {
                Some(outcome) => {
                    self.pool.stop_mining();
                    head = MiningInfo {
                        previous_hash: outcome.previous_hash,
                        difficulty: outcome.difficulty,
                    };
                    if !outcome.accepted {
                        warn!(
                            previous_hash = %head.previous_hash,
                            "ledger rejected the block, resynchronized to its head"
                        );
                    }
                    self.publish(&head, outcome.accepted).await;
                }
                None => {
                    // The ledger stayed unreachable; the mined block is
                    // lost but the pipeline must not wedge.
                    self.pool.stop_mining();
                    self.publish(&head, false).await;
                }
            }
        }

        self.finalize().await;
    }

    /// Fetches the initial head pair with bounded backoff.
    async fn boot(&mut self) -> Option<MiningInfo> {
        let mut backoff = BACKOFF_START;
        for attempt in 1..=BOOT_ATTEMPTS {
            match self.client.mining_info().await {
                Ok(info) => return Some(info),
                Err(err) => {
                    warn!(attempt, %err, "could not fetch mining info");
                }
            }
            if self.sleep_or_shutdown(backoff).await {
                return None;
            }
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
        error!(
            attempts = BOOT_ATTEMPTS,
            "ledger host unreachable, giving up boot"
        );
        None
    }

    /// Submits a mined block, retrying transient failures.
    async fn submit(&mut self, block: Block) -> Option<crate::client::WriteOutcome> {
        let mut backoff = BACKOFF_START;
        for attempt in 1..=SUBMIT_ATTEMPTS {
            match self.client.write_block(block.clone()).await {
                Ok(outcome) => return Some(outcome),
                Err(err) => {
                    warn!(attempt, %err, "block submission failed");
                }
            }
            if self.sleep_or_shutdown(backoff).await {
                return None;
            }
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
        error!(
            attempts = SUBMIT_ATTEMPTS,
            hash = %block.hash(),
            "dropping mined block, ledger host unreachable"
        );
        None
    }

    /// Sleeps for `duration` unless shutdown fires first.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.changed() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    async fn publish(&self, head: &MiningInfo, ok: bool) {
        let update = StatusUpdate {
            previous_hash: head.previous_hash,
            difficulty: head.difficulty,
            ok,
        };
        if self.status_tx.send(update).await.is_err() {
            warn!("packer is gone, status update dropped");
        }
    }

    async fn finalize(self) {
        info!("block writer finalizing, quitting miners");
        let pool = self.pool;
        // Joining OS threads must not park the async worker.
        if tokio::task::spawn_blocking(move || pool.quit()).await.is_err() {
            warn!("miner pool teardown panicked");
        }
        info!("block writer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, WriteOutcome};
    use async_trait::async_trait;
    use oc_core::{Big256, Chunk};
    use parking_lot::Mutex;

    /// Ledger double: scripted mining info and a log of submissions.
    struct MockLedger {
        info: MiningInfo,
        fail_info_times: Mutex<u32>,
        submissions: Mutex<Vec<Block>>,
        accept: bool,
    }

    impl MockLedger {
        fn new(accept: bool) -> Self {
            MockLedger {
                info: MiningInfo {
                    previous_hash: Big256::ZERO,
                    difficulty: Big256::ONE,
                },
                fail_info_times: Mutex::new(0),
                submissions: Mutex::new(Vec::new()),
                accept,
            }
        }

        fn failing_boot(times: u32) -> Self {
            let mock = Self::new(true);
            *mock.fail_info_times.lock() = times;
            mock
        }
    }

    #[async_trait]
    impl LedgerApi for MockLedger {
        async fn mining_info(&self) -> Result<MiningInfo, ClientError> {
            let mut failures = self.fail_info_times.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(ClientError::UnexpectedResponse(0xee));
            }
            Ok(self.info)
        }

        async fn write_block(&self, block: Block) -> Result<WriteOutcome, ClientError> {
            let hash = block.hash();
            self.submissions.lock().push(block);
            Ok(WriteOutcome {
                accepted: self.accept,
                previous_hash: hash,
                difficulty: Big256::ONE,
            })
        }
    }

    struct Rig {
        block_tx: mpsc::Sender<Block>,
        status_rx: mpsc::Receiver<StatusUpdate>,
        shutdown: watch::Sender<bool>,
        client: Arc<MockLedger>,
    }

    fn start_writer(client: MockLedger, miners: usize) -> Rig {
        let client = Arc::new(client);
        let (block_tx, block_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = mpsc::channel(4);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let writer = BlockWriter::new(
            Arc::clone(&client),
            MinerPool::spawn(miners),
            block_rx,
            status_tx,
            shutdown_rx,
        );
        tokio::spawn(writer.run());

        Rig {
            block_tx,
            status_rx,
            shutdown,
            client,
        }
    }

    fn candidate() -> Block {
        let chunk = Chunk::new(b"data".to_vec()).unwrap();
        Block::build(&Big256::ZERO, &Big256::ONE, &[chunk]).unwrap()
    }

    async fn recv_status(rx: &mut mpsc::Receiver<StatusUpdate>) -> StatusUpdate {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a status update")
            .expect("status channel closed")
    }

    #[tokio::test]
    async fn boot_seeds_the_packer() {
        let mut rig = start_writer(MockLedger::new(true), 1);

        let status = recv_status(&mut rig.status_rx).await;
        assert!(status.ok);
        assert!(status.previous_hash.is_zero());
        assert!(status.difficulty.is_one());

        let _ = rig.shutdown.send(true);
    }

    #[tokio::test]
    async fn boot_retries_through_transient_failures() {
        let mut rig = start_writer(MockLedger::failing_boot(2), 1);

        let status = recv_status(&mut rig.status_rx).await;
        assert!(status.ok, "boot must succeed after the failures pass");

        let _ = rig.shutdown.send(true);
    }

    #[tokio::test]
    async fn mined_block_is_submitted_and_status_forwarded() {
        let mut rig = start_writer(MockLedger::new(true), 2);

        let boot = recv_status(&mut rig.status_rx).await;
        assert!(boot.ok);

        rig.block_tx.send(candidate()).await.unwrap();

        let status = recv_status(&mut rig.status_rx).await;
        assert!(status.ok);
        assert!(
            !status.previous_hash.is_zero(),
            "head must advance to the mined block's hash"
        );

        let submissions = rig.client.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].is_valid_at_difficulty());

        let _ = rig.shutdown.send(true);
    }

    #[tokio::test]
    async fn rejection_still_updates_the_head() {
        let mut rig = start_writer(MockLedger::new(false), 1);

        let _boot = recv_status(&mut rig.status_rx).await;
        rig.block_tx.send(candidate()).await.unwrap();

        let status = recv_status(&mut rig.status_rx).await;
        assert!(!status.ok, "rejection is reported");
        assert!(
            !status.previous_hash.is_zero(),
            "the ledger's head pair is adopted even on rejection"
        );

        let _ = rig.shutdown.send(true);
    }
}
