//! The gateway's view of the ledger host.
//!
//! Connections are opened per request and closed after the response,
//! so a ledger restart costs nothing but the requests that were in
//! flight.

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use oc_core::{Big256, Block};
use oc_wire::{read_message, write_message, Message, ProtocolError};

/// The head pair a miner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningInfo {
    /// Hash the next block must extend.
    pub previous_hash: Big256,
    /// Difficulty the next block must carry.
    pub difficulty: Big256,
}

/// The ledger host's answer to a block submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Whether the block was admitted.
    pub accepted: bool,
    /// Head hash after the attempt.
    pub previous_hash: Big256,
    /// Difficulty after the attempt.
    pub difficulty: Big256,
}

/// Failures talking to the ledger host.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not connect or the connection broke.
    #[error("ledger host connection failed: {0}")]
    Io(#[from] std::io::Error),

    /// The response could not be decoded.
    #[error("ledger host protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// The response had an unexpected opcode.
    #[error("unexpected response opcode 0x{0:02x}")]
    UnexpectedResponse(u8),
}

/// What the block writer needs from the ledger host.
#[async_trait]
pub trait LedgerApi: Send + Sync + 'static {
    /// Fetches the current head pair.
    async fn mining_info(&self) -> Result<MiningInfo, ClientError>;

    /// Submits a mined block for admission.
    async fn write_block(&self, block: Block) -> Result<WriteOutcome, ClientError>;
}

/// TCP implementation of [`LedgerApi`] plus the read-side proxy calls.
#[derive(Debug, Clone)]
pub struct TcpLedgerClient {
    host: String,
    read_port: u16,
    write_port: u16,
}

impl TcpLedgerClient {
    /// Targets a ledger host by name and port pair.
    pub fn new(host: impl Into<String>, read_port: u16, write_port: u16) -> Self {
        TcpLedgerClient {
            host: host.into(),
            read_port,
            write_port,
        }
    }

    async fn exchange(&self, port: u16, request: &Message) -> Result<Message, ClientError> {
        let mut stream = TcpStream::connect((self.host.as_str(), port)).await?;
        write_message(&mut stream, request).await?;
        let response = read_message(&mut stream).await?;
        Ok(response)
    }

    /// Looks a block up by hash on the ledger host.
    pub async fn get_block_by_hash(&self, hash: Big256) -> Result<Option<Block>, ClientError> {
        let response = self
            .exchange(self.read_port, &Message::GetBlockByHash { hash })
            .await?;
        match response {
            Message::GetBlockByHashResponse { block } => Ok(block),
            other => Err(ClientError::UnexpectedResponse(other.opcode())),
        }
    }

    /// Enumerates a minute's blocks on the ledger host.
    pub async fn read_blocks_in_minute(&self, timestamp: u64) -> Result<Vec<Block>, ClientError> {
        let response = self
            .exchange(self.read_port, &Message::ReadBlocksInMinute { timestamp })
            .await?;
        match response {
            Message::ReadBlocksInMinuteResponse { blocks, .. } => Ok(blocks),
            other => Err(ClientError::UnexpectedResponse(other.opcode())),
        }
    }
}

#[async_trait]
impl LedgerApi for TcpLedgerClient {
    async fn mining_info(&self) -> Result<MiningInfo, ClientError> {
        let response = self
            .exchange(self.read_port, &Message::GetMiningInfo)
            .await?;
        match response {
            Message::GetMiningInfoResponse {
                previous_hash,
                difficulty,
            } => {
                debug!(%previous_hash, %difficulty, "fetched mining info");
                Ok(MiningInfo {
                    previous_hash,
                    difficulty,
                })
            }
            other => Err(ClientError::UnexpectedResponse(other.opcode())),
        }
    }

    async fn write_block(&self, block: Block) -> Result<WriteOutcome, ClientError> {
        let response = self
            .exchange(self.write_port, &Message::WriteBlock { block })
            .await?;
        match response {
            Message::WriteBlockResponse {
                accepted,
                previous_hash,
                difficulty,
            } => Ok(WriteOutcome {
                accepted,
                previous_hash,
                difficulty,
            }),
            other => Err(ClientError::UnexpectedResponse(other.opcode())),
        }
    }
}
