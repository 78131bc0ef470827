//! Connection handlers for the two ledger servers.
//!
//! Every connection carries one request. Unknown or out-of-place
//! opcodes terminate the connection without a reply; storage errors
//! on the read path degrade to "not found" rather than surfacing to
//! the peer.

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use oc_wire::{read_message, write_message, Message};

use crate::domain::ledger::Ledger;

/// Handles one connection on the write port.
///
/// The only request served here is `WriteBlock`; the response always
/// reflects the post-attempt head, so a rejected writer learns the
/// hash and difficulty it should have used.
pub async fn handle_write_connection(ledger: Arc<Ledger>, mut stream: TcpStream) {
    let message = match read_message(&mut stream).await {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "write connection dropped");
            return;
        }
    };

    let block = match message {
        Message::WriteBlock { block } => block,
        other => {
            warn!(opcode = other.opcode(), "unexpected opcode on the write port");
            return;
        }
    };

    info!(
        hash = %block.hash(),
        previous_hash = %block.previous_hash(),
        timestamp = block.timestamp(),
        entries = block.entry_count(),
        "block offered for admission"
    );

    let worker = Arc::clone(&ledger);
    let result = tokio::task::spawn_blocking(move || worker.write_block(&block)).await;

    let accepted = match result {
        Ok(Ok(())) => {
            info!("block admitted");
            true
        }
        Ok(Err(err)) => {
            warn!(%err, "block rejected");
            false
        }
        Err(err) => {
            error!(%err, "admission task failed");
            false
        }
    };

    let head = ledger.head();
    let response = Message::WriteBlockResponse {
        accepted,
        previous_hash: head.previous_hash,
        difficulty: head.difficulty,
    };
    if let Err(err) = write_message(&mut stream, &response).await {
        warn!(%err, "could not send write response");
    }
}

/// Handles one connection on the read port: mining info, hash lookup,
/// or minute enumeration.
pub async fn handle_read_connection(ledger: Arc<Ledger>, mut stream: TcpStream) {
    let message = match read_message(&mut stream).await {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "read connection dropped");
            return;
        }
    };

    let response = match message {
        Message::GetMiningInfo => {
            let head = ledger.head();
            debug!(previous_hash = %head.previous_hash, difficulty = %head.difficulty,
                "serving mining info");
            Message::GetMiningInfoResponse {
                previous_hash: head.previous_hash,
                difficulty: head.difficulty,
            }
        }
        Message::GetBlockByHash { hash } => {
            let worker = Arc::clone(&ledger);
            let block = match tokio::task::spawn_blocking(move || worker.get_by_hash(&hash)).await {
                Ok(Ok(block)) => block,
                Ok(Err(err)) => {
                    error!(%err, hash = %hash, "hash lookup failed");
                    None
                }
                Err(err) => {
                    error!(%err, "lookup task failed");
                    None
                }
            };
            debug!(hash = %hash, found = block.is_some(), "hash lookup served");
            Message::GetBlockByHashResponse { block }
        }
        Message::ReadBlocksInMinute { timestamp } => {
            let worker = Arc::clone(&ledger);
            let blocks =
                match tokio::task::spawn_blocking(move || worker.get_in_minute(timestamp)).await {
                    Ok(Ok(blocks)) => blocks,
                    Ok(Err(err)) => {
                        error!(%err, timestamp, "minute enumeration failed");
                        Vec::new()
                    }
                    Err(err) => {
                        error!(%err, "enumeration task failed");
                        Vec::new()
                    }
                };
            debug!(timestamp, count = blocks.len(), "minute enumeration served");
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
