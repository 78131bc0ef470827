//! Message types and their binary codec.

use oc_core::{Big256, Block, CodecError, MAX_BLOCK_PAYLOAD_LEN, MAX_CHUNK_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Opcode bytes, one per message kind.
pub mod opcode {
    /// Request the current head hash and difficulty.
    pub const GET_MINING_INFO: u8 = 0x00;
    /// Response to [`GET_MINING_INFO`].
    pub const GET_MINING_INFO_RESPONSE: u8 = 0x01;
    /// Look a block up by its hash.
    pub const GET_BLOCK_BY_HASH: u8 = 0x02;
    /// Response to [`GET_BLOCK_BY_HASH`].
    pub const GET_BLOCK_BY_HASH_RESPONSE: u8 = 0x03;
    /// Enumerate the blocks of one UTC minute.
    pub const READ_BLOCKS_IN_MINUTE: u8 = 0x04;
    /// Response to [`READ_BLOCKS_IN_MINUTE`].
    pub const READ_BLOCKS_IN_MINUTE_RESPONSE: u8 = 0x05;
    /// Submit a mined block for admission.
    pub const WRITE_BLOCK: u8 = 0x06;
    /// Response to [`WRITE_BLOCK`].
    pub const WRITE_BLOCK_RESPONSE: u8 = 0x07;
    /// Submit a chunk to the gateway.
    pub const WRITE_CHUNK: u8 = 0x08;
    /// Response to [`WRITE_CHUNK`].
    pub const WRITE_CHUNK_RESPONSE: u8 = 0x09;
}

/// One protocol message, request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `0x00` - no payload.
    GetMiningInfo,
    /// `0x01` - previous hash and current difficulty, 32 bytes each.
    GetMiningInfoResponse {
        /// Hash of the chain tip.
        previous_hash: Big256,
        /// Difficulty the next block must carry.
        difficulty: Big256,
    },
    /// `0x02` - the requested hash.
    GetBlockByHash {
        /// Hash to look up.
        hash: Big256,
    },
    /// `0x03` - a found flag, then the framed block when found.
    GetBlockByHashResponse {
        /// The block, if the ledger holds it.
        block: Option<Block>,
    },
    /// `0x04` - a UNIX timestamp selecting a UTC minute.
    ReadBlocksInMinute {
        /// Any second inside the requested minute.
        timestamp: u64,
    },
    /// `0x05` - the echoed timestamp and the minute's blocks in
    /// admission order.
    ReadBlocksInMinuteResponse {
        /// Timestamp from the request.
        timestamp: u64,
        /// Framed blocks, file order.
        blocks: Vec<Block>,
    },
    /// `0x06` - a framed block.
    WriteBlock {
        /// The mined candidate.
        block: Block,
    },
    /// `0x07` - acceptance flag and the post-admission head pair.
    WriteBlockResponse {
        /// Whether the block was admitted.
        accepted: bool,
        /// Head hash after the attempt.
        previous_hash: Big256,
        /// Difficulty after the attempt.
        difficulty: Big256,
    },
    /// `0x08` - a 2-byte length and that many payload bytes.
    WriteChunk {
        /// The chunk payload.
        data: Vec<u8>,
    },
    /// `0x09` - acceptance flag.
    WriteChunkResponse {
        /// Whether the chunk entered the queue.
        accepted: bool,
    },
}

impl Message {
    /// The opcode byte this message is encoded with.
    pub fn opcode(&self) -> u8 {
        match self {
            Message::GetMiningInfo => opcode::GET_MINING_INFO,
            Message::GetMiningInfoResponse { .. } => opcode::GET_MINING_INFO_RESPONSE,
            Message::GetBlockByHash { .. } => opcode::GET_BLOCK_BY_HASH,
            Message::GetBlockByHashResponse { .. } => opcode::GET_BLOCK_BY_HASH_RESPONSE,
            Message::ReadBlocksInMinute { .. } => opcode::READ_BLOCKS_IN_MINUTE,
            Message::ReadBlocksInMinuteResponse { .. } => opcode::READ_BLOCKS_IN_MINUTE_RESPONSE,
            Message::WriteBlock { .. } => opcode::WRITE_BLOCK,
            Message::WriteBlockResponse { .. } => opcode::WRITE_BLOCK_RESPONSE,
            Message::WriteChunk { .. } => opcode::WRITE_CHUNK,
            Message::WriteChunkResponse { .. } => opcode::WRITE_CHUNK_RESPONSE,
        }
    }
}

/// Reads one message from `reader`.
///
/// Fails with [`ProtocolError::UnknownOpcode`] on an unrecognized
/// opcode byte and with an I/O error when the stream ends inside a
/// message.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let op = reader.read_u8().await?;

    match op {
        opcode::GET_MINING_INFO => Ok(Message::GetMiningInfo),
        opcode::GET_MINING_INFO_RESPONSE => {
            let previous_hash = read_big256(reader).await?;
            let difficulty = read_big256(reader).await?;
            Ok(Message::GetMiningInfoResponse {
                previous_hash,
                difficulty,
            })
        }
        opcode::GET_BLOCK_BY_HASH => {
            let hash = read_big256(reader).await?;
            Ok(Message::GetBlockByHash { hash })
        }
        opcode::GET_BLOCK_BY_HASH_RESPONSE => {
            let found = reader.read_u8().await?;
            let block = if found == 1 {
                Some(read_framed_block(reader).await?)
            } else {
                None
            };
            Ok(Message::GetBlockByHashResponse { block })
        }
        opcode::READ_BLOCKS_IN_MINUTE => {
            let timestamp = reader.read_u64_le().await?;
            Ok(Message::ReadBlocksInMinute { timestamp })
        }
        opcode::READ_BLOCKS_IN_MINUTE_RESPONSE => {
            let timestamp = reader.read_u64_le().await?;
            let count = reader.read_u32_le().await?;
            let mut blocks = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                blocks.push(read_framed_block(reader).await?);
            }
            Ok(Message::ReadBlocksInMinuteResponse { timestamp, blocks })
        }
        opcode::WRITE_BLOCK => {
            let block = read_framed_block(reader).await?;
            Ok(Message::WriteBlock { block })
        }
        opcode::WRITE_BLOCK_RESPONSE => {
            let accepted = reader.read_u8().await? == 1;
            let previous_hash = read_big256(reader).await?;
            let difficulty = read_big256(reader).await?;
            Ok(Message::WriteBlockResponse {
                accepted,
                previous_hash,
                difficulty,
            })
        }
        opcode::WRITE_CHUNK => {
            let len = reader.read_u16_le().await? as usize;
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data).await?;
            Ok(Message::WriteChunk { data })
        }
        opcode::WRITE_CHUNK_RESPONSE => {
            let accepted = reader.read_u8().await? == 1;
            Ok(Message::WriteChunkResponse { accepted })
        }
        other => Err(ProtocolError::UnknownOpcode(other)),
    }
}

/// Writes one message to `writer` and flushes it.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u8(message.opcode()).await?;

    match message {
        Message::GetMiningInfo => {}
        Message::GetMiningInfoResponse {
            previous_hash,
            difficulty,
        } => {
            writer.write_all(previous_hash.as_bytes()).await?;
            writer.write_all(difficulty.as_bytes()).await?;
        }
        Message::GetBlockByHash { hash } => {
            writer.write_all(hash.as_bytes()).await?;
        }
        Message::GetBlockByHashResponse { block } => match block {
            Some(block) => {
                writer.write_u8(1).await?;
                writer.write_all(&block.framed_bytes()).await?;
            }
            None => writer.write_u8(0).await?,
        },
        Message::ReadBlocksInMinute { timestamp } => {
            writer.write_u64_le(*timestamp).await?;
        }
        Message::ReadBlocksInMinuteResponse { timestamp, blocks } => {
            writer.write_u64_le(*timestamp).await?;
            writer.write_u32_le(blocks.len() as u32).await?;
            for block in blocks {
                writer.write_all(&block.framed_bytes()).await?;
            }
        }
        Message::WriteBlock { block } => {
            writer.write_all(&block.framed_bytes()).await?;
        }
        Message::WriteBlockResponse {
            accepted,
            previous_hash,
            difficulty,
        } => {
            writer.write_u8(u8::from(*accepted)).await?;
            writer.write_all(previous_hash.as_bytes()).await?;
            writer.write_all(difficulty.as_bytes()).await?;
        }
        Message::WriteChunk { data } => {
            debug_assert!(data.len() <= MAX_CHUNK_LEN);
            writer.write_u16_le(data.len() as u16).await?;
            writer.write_all(data).await?;
        }
        Message::WriteChunkResponse { accepted } => {
            writer.write_u8(u8::from(*accepted)).await?;
        }
    }

    writer.flush().await?;
    Ok(())
}

async fn read_big256<R>(reader: &mut R) -> Result<Big256, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes).await?;
    Ok(Big256::from_bytes(bytes))
}

/// Reads one framed block: length prefix, hash, payload.
async fn read_framed_block<R>(reader: &mut R) -> Result<Block, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let payload_len = reader.read_u32_le().await? as usize;
    if payload_len > MAX_BLOCK_PAYLOAD_LEN {
        return Err(ProtocolError::Codec(CodecError::FrameTooLarge {
            len: payload_len,
        }));
    }

    let mut hash = [0u8; 32];
    reader.read_exact(&mut hash).await?;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Ok(Block::from_parts(Big256::from_bytes(hash), payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::Chunk;

    async fn round_trip(message: Message) -> Message {
        let mut bytes = Vec::new();
        write_message(&mut bytes, &message).await.unwrap();
        assert_eq!(bytes[0], message.opcode());
        read_message(&mut bytes.as_slice()).await.unwrap()
    }

    fn sample_block() -> Block {
        let chunks = vec![
            Chunk::new(b"Chunk 1".to_vec()).unwrap(),
            Chunk::new(b"Chunk 2".to_vec()).unwrap(),
        ];
        Block::build(&Big256::ZERO, &Big256::ONE, &chunks).unwrap()
    }

    #[tokio::test]
    async fn mining_info_round_trip() {
        assert_eq!(round_trip(Message::GetMiningInfo).await, Message::GetMiningInfo);

        let response = Message::GetMiningInfoResponse {
            previous_hash: Big256::from_bytes([1u8; 32]),
            difficulty: Big256::from_bytes([2u8; 32]),
        };
        assert_eq!(round_trip(response.clone()).await, response);
    }

    #[tokio::test]
    async fn block_by_hash_round_trip() {
        let request = Message::GetBlockByHash {
            hash: Big256::from_bytes([7u8; 32]),
        };
        assert_eq!(round_trip(request.clone()).await, request);

        let found = Message::GetBlockByHashResponse {
            block: Some(sample_block()),
        };
        assert_eq!(round_trip(found.clone()).await, found);

        let missing = Message::GetBlockByHashResponse { block: None };
        assert_eq!(round_trip(missing.clone()).await, missing);
    }

    #[tokio::test]
    async fn blocks_in_minute_round_trip() {
        let request = Message::ReadBlocksInMinute { timestamp: 1_700_000_000 };
        assert_eq!(round_trip(request.clone()).await, request);

        let response = Message::ReadBlocksInMinuteResponse {
            timestamp: 1_700_000_000,
            blocks: vec![sample_block(), sample_block()],
        };
        assert_eq!(round_trip(response.clone()).await, response);

        let empty = Message::ReadBlocksInMinuteResponse {
            timestamp: 42,
            blocks: Vec::new(),
        };
        assert_eq!(round_trip(empty.clone()).await, empty);
    }

    #[tokio::test]
    async fn write_block_round_trip() {
        let request = Message::WriteBlock {
            block: sample_block(),
        };
        assert_eq!(round_trip(request.clone()).await, request);

        let response = Message::WriteBlockResponse {
            accepted: true,
            previous_hash: Big256::from_bytes([9u8; 32]),
            difficulty: Big256::ONE,
        };
        assert_eq!(round_trip(response.clone()).await, response);
    }

    #[tokio::test]
    async fn write_chunk_round_trip() {
        let request = Message::WriteChunk {
            data: b"payload".to_vec(),
        };
        assert_eq!(round_trip(request.clone()).await, request);

        for accepted in [true, false] {
            let response = Message::WriteChunkResponse { accepted };
            assert_eq!(round_trip(response.clone()).await, response);
        }
    }

    #[tokio::test]
    async fn unknown_opcode_is_rejected() {
        let bytes = [0xffu8];
        let err = read_message(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOpcode(0xff)));
    }

    #[tokio::test]
    async fn truncated_message_is_an_error() {
        let mut bytes = Vec::new();
        write_message(
            &mut bytes,
            &Message::GetBlockByHash {
                hash: Big256::from_bytes([7u8; 32]),
            },
        )
        .await
        .unwrap();
        bytes.truncate(bytes.len() - 5);

        let err = read_message(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocation() {
        let mut bytes = vec![opcode::WRITE_BLOCK];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]);

        let err = read_message(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Codec(CodecError::FrameTooLarge { .. })
        ));
    }
}
