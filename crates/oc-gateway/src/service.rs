//! Connection handlers for the gateway's two servers.

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use oc_core::Chunk;
use oc_wire::{read_message, write_message, Message};

use crate::client::TcpLedgerClient;
use crate::domain::queue::ChunkQueue;

/// Handles one connection on the write port: a single `WriteChunk`.
///
/// Acceptance means the chunk entered the queue; a full queue answers
/// `accepted = 0` immediately and drops the payload.
pub async fn handle_write_connection(queue: Arc<ChunkQueue>, mut stream: TcpStream) {
    let message = match read_message(&mut stream).await {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "write connection dropped");
            return;
        }
    };

    let data = match message {
        Message::WriteChunk { data } => data,
        other => {
            warn!(opcode = other.opcode(), "unexpected opcode on the write port");
            return;
        }
    };

    let accepted = match Chunk::new(data) {
        Ok(chunk) => {
            let accepted = queue.push(chunk);
            debug!(accepted, queued = queue.len(), "chunk offered");
            accepted
        }
        Err(err) => {
            // Unreachable through the wire codec's 16-bit length, but
            // rejection is the right answer regardless.
            warn!(%err, "oversized chunk rejected");
            false
        }
    };

    let response = Message::WriteChunkResponse { accepted };
    if let Err(err) = write_message(&mut stream, &response).await {
        warn!(%err, "could not send chunk response");
    }
}

/// Handles one connection on the read port, proxying the query to the
/// ledger host. Proxy failures degrade to "not found" answers, the
/// same shape an empty ledger would produce.
pub async fn handle_read_connection(client: Arc<TcpLedgerClient>, mut stream: TcpStream) {
    let message = match read_message(&mut stream).await {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "read connection dropped");
            return;
        }
    };

    let response = match message {
        Message::GetBlockByHash { hash } => {
            let block = match client.get_block_by_hash(hash).await {
                Ok(block) => block,
                Err(err) => {
                    error!(%err, hash = %hash, "hash lookup proxy failed");
                    None
                }
            };
            Message::GetBlockByHashResponse { block }
        }
        Message::ReadBlocksInMinute { timestamp } => {
            let blocks = match client.read_blocks_in_minute(timestamp).await {
                Ok(blocks) => blocks,
                Err(err) => {
                    error!(%err, timestamp, "minute enumeration proxy failed");
                    Vec::new()
                }
            };
            Message::ReadBlocksInMinuteResponse { timestamp, blocks }
        }
        other => {
            warn!(opcode = other.opcode(), "unexpected opcode on the read port");
            return;
        }
    };

    if let Err(err) = write_message(&mut stream, &response).await {
        warn!(%err, "could not send read response");
    }
}
