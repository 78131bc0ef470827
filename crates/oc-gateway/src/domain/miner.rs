//! The miner pool.
//!
//! Each miner is a dedicated OS thread: the nonce search is pure CPU
//! work and must not sit on the async runtime. A miner owns two
//! inbound channels. While idle it blocks on the control channel;
//! `Start` tells it a request is waiting in the request channel.
//! While mining it polls the control channel between attempts, so a
//! `Stop` is honored at most one hash attempt late.
//!
//! Every miner receives its own copy of the candidate block and the
//! first to find a conforming nonce publishes it on the shared
//! completion channel. The channel is as deep as the pool, so a late
//! winner never blocks on a result nobody will read.

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use oc_core::Block;

/// A unit of mining work: the candidate and where to publish success.
#[derive(Debug)]
pub struct MiningRequest {
    block: Block,
    completion: mpsc::Sender<Block>,
}

impl MiningRequest {
    /// Pairs a candidate block with a completion channel.
    pub fn new(block: Block, completion: mpsc::Sender<Block>) -> Self {
        MiningRequest { block, completion }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Start,
    Stop,
    Quit,
}

/// Attempt counters for one miner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinerStats {
    /// Blocks this miner solved first.
    pub successes: u64,
    /// Hash attempts that missed the target.
    pub failures: u64,
}

/// Shared snapshot store, miner id to counters.
pub type SharedStats = Arc<RwLock<HashMap<usize, MinerStats>>>;

struct MinerHandle {
    id: usize,
    request_tx: std_mpsc::Sender<MiningRequest>,
    control_tx: std_mpsc::Sender<Control>,
    thread: JoinHandle<()>,
}

/// A fixed pool of miner threads.
pub struct MinerPool {
    miners: Vec<MinerHandle>,
    stats: SharedStats,
}

impl MinerPool {
    /// Spawns `count` miner threads, all idle.
    pub fn spawn(count: usize) -> Self {
        let stats: SharedStats = Arc::new(RwLock::new(HashMap::new()));
        let miners = (0..count.max(1))
            .map(|id| {
                let (request_tx, request_rx) = std_mpsc::channel();
                let (control_tx, control_rx) = std_mpsc::channel();
                let stats = Arc::clone(&stats);
                stats.write().insert(id, MinerStats::default());

                let thread = std::thread::Builder::new()
                    .name(format!("miner-{id}"))
                    .spawn(move || miner_loop(id, request_rx, control_rx, stats))
                    .expect("spawn miner thread");

                MinerHandle {
                    id,
                    request_tx,
                    control_tx,
                    thread,
                }
            })
            .collect();

        info!(count = count.max(1), "miner pool started");
        MinerPool { miners, stats }
    }

    /// Number of miners in the pool.
    pub fn len(&self) -> usize {
        self.miners.len()
    }

    /// True for an empty pool; never the case after `spawn`.
    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    /// Fans a candidate block out to every miner. Each miner gets its
    /// own copy; the first to finish wins on the shared channel.
    pub fn dispatch(&self, block: &Block, completion: &mpsc::Sender<Block>) {
        for miner in &self.miners {
            let request = MiningRequest::new(block.clone(), completion.clone());
            if miner.request_tx.send(request).is_err()
                || miner.control_tx.send(Control::Start).is_err()
            {
                warn!(miner_id = miner.id, "miner is gone, skipping dispatch");
            }
        }
    }

    /// Tells every miner to abandon its current search.
    pub fn stop_mining(&self) {
        for miner in &self.miners {
            let _ = miner.control_tx.send(Control::Stop);
        }
    }

    /// Snapshot of the per-miner counters.
    pub fn stats(&self) -> Vec<(usize, MinerStats)> {
        let stats = self.stats.read();
        let mut snapshot: Vec<_> = stats.iter().map(|(id, s)| (*id, *s)).collect();
        snapshot.sort_by_key(|(id, _)| *id);
        snapshot
    }

    /// Sends `Quit` to every miner and joins the threads.
    pub fn quit(self) {
        for miner in &self.miners {
            let _ = miner.control_tx.send(Control::Quit);
        }
        for miner in self.miners {
            if miner.thread.join().is_err() {
                warn!(miner_id = miner.id, "miner thread panicked");
            }
        }
        info!("miner pool stopped");
    }
}

fn miner_loop(
    id: usize,
    request_rx: std_mpsc::Receiver<MiningRequest>,
    control_rx: std_mpsc::Receiver<Control>,
    stats: SharedStats,
) {
    let mut current: Option<MiningRequest> = None;

    loop {
        match current.take() {
            None => {
                // Idle: nothing to do until a control signal arrives.
                match control_rx.recv() {
                    Ok(Control::Start) => {
                        // The dispatcher queues the request before the
                        // signal, so this does not block.
                        match request_rx.try_recv() {
                            Ok(request) => current = Some(request),
                            Err(_) => debug!(miner_id = id, "start signal without a request"),
                        }
                    }
                    Ok(Control::Stop) => {}
                    Ok(Control::Quit) | Err(_) => break,
                }
            }
            Some(mut request) => {
                // Mining: poll for control, then take one attempt.
                match control_rx.try_recv() {
                    Ok(Control::Stop) => continue,
                    Ok(Control::Quit) => break,
                    Ok(Control::Start) => {
                        if let Ok(next) = request_rx.try_recv() {
                            current = Some(next);
                        }
                        continue;
                    }
                    Err(std_mpsc::TryRecvError::Disconnected) => break,
                    Err(std_mpsc::TryRecvError::Empty) => {}
                }

                if request.block.attempt_hash() {
                    debug!(miner_id = id, hash = %request.block.hash(), "block mined");
                    if let Some(entry) = stats.write().get_mut(&id) {
                        entry.successes += 1;
                    }
                    let MiningRequest { block, completion } = request;
                    // A full channel means another miner already won.
                    let _ = completion.try_send(block);
                } else {
                    if let Some(entry) = stats.write().get_mut(&id) {
                        entry.failures += 1;
                    }
                    current = Some(request);
                }
            }
        }
    }

    debug!(miner_id = id, "miner finalized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::{Big256, Chunk};
    use std::time::Duration;

    fn candidate(difficulty: Big256) -> Block {
        let chunk = Chunk::new(b"payload".to_vec()).unwrap();
        Block::build(&Big256::ZERO, &difficulty, &[chunk]).unwrap()
    }

    #[tokio::test]
    async fn pool_mines_an_easy_block() {
        let pool = MinerPool::spawn(2);
        let (completion_tx, mut completion_rx) = mpsc::channel(pool.len());

        let block = candidate(Big256::ONE);
        pool.dispatch(&block, &completion_tx);

        let mined = tokio::time::timeout(Duration::from_secs(5), completion_rx.recv())
            .await
            .expect("mining timed out")
            .expect("completion channel closed");

        assert!(mined.is_valid_at_difficulty());
        assert_eq!(mined.previous_hash(), block.previous_hash());
        assert_ne!(mined.nonce(), Big256::ZERO);

        pool.stop_mining();
        let successes: u64 = pool.stats().iter().map(|(_, s)| s.successes).sum();
        assert!(successes >= 1);

        pool.quit();
    }

    #[tokio::test]
    async fn stop_mining_interrupts_a_hopeless_search() {
        let pool = MinerPool::spawn(2);
        let (completion_tx, completion_rx) = mpsc::channel(pool.len());

        // An all-ones target rejects essentially every hash, so the
        // miners would spin forever without the stop.
        let block = candidate(Big256::from_bytes([0xff; 32]));
        pool.dispatch(&block, &completion_tx);

        std::thread::sleep(Duration::from_millis(50));
        pool.stop_mining();

        let failures: u64 = pool.stats().iter().map(|(_, s)| s.failures).sum();
        assert!(failures > 0, "miners should have burned some attempts");

        // Quit must return promptly because every miner is idle again.
        pool.quit();
        drop(completion_rx);
    }

    #[tokio::test]
    async fn quit_reaches_idle_miners() {
        let pool = MinerPool::spawn(3);
        pool.quit();
    }

    #[tokio::test]
    async fn each_miner_keeps_its_own_counters() {
        let pool = MinerPool::spawn(2);
        let stats = pool.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].0, 0);
        assert_eq!(stats[1].0, 1);
        pool.quit();
    }
}
