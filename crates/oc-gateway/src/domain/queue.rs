//! The bounded chunk queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use oc_core::Chunk;

/// FIFO of accepted chunks awaiting packing.
///
/// `push` never blocks: a full queue rejects the chunk and the caller
/// reports that to the client. Each successful push fires the notify
/// channel; the channel is one deeper than the queue so a signal is
/// never lost, and signals simply coalesce while the packer is busy.
#[derive(Debug)]
pub struct ChunkQueue {
    inner: Mutex<VecDeque<Chunk>>,
    capacity: usize,
    notify: mpsc::Sender<()>,
}

impl ChunkQueue {
    /// Creates a queue of the given capacity and hands back the
    /// receiving end of its notify channel.
    pub fn new(capacity: usize) -> (Arc<ChunkQueue>, mpsc::Receiver<()>) {
        let (notify, notify_rx) = mpsc::channel(capacity + 1);
        let queue = Arc::new(ChunkQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify,
        });
        (queue, notify_rx)
    }

    /// Appends a chunk. Returns `false`, without mutating anything,
    /// when the queue is at capacity.
    pub fn push(&self, chunk: Chunk) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.len() >= self.capacity {
                return false;
            }
            inner.push_back(chunk);
        }
        // A full notify channel means a wake-up is already pending.
        let _ = self.notify.try_send(());
        true
    }

    /// Atomically empties the queue, preserving arrival order.
    pub fn drain(&self) -> Vec<Chunk> {
        self.inner.lock().drain(..).collect()
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
