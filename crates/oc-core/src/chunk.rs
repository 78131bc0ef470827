//! Client payloads.

use crate::error::CodecError;

/// Upper bound on a chunk payload, fixed by the 16-bit length prefix.
pub const MAX_CHUNK_LEN: usize = u16::MAX as usize;

/// An opaque client payload of at most [`MAX_CHUNK_LEN`] bytes.
///
/// Chunks carry no structure the ledger cares about; only their length
/// is validated. Inside a block each chunk is stored as a 2-byte
/// little-endian length followed by the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Vec<u8>,
}

impl Chunk {
    /// Wraps a payload, rejecting anything the length prefix cannot hold.
    pub fn new(data: Vec<u8>) -> Result<Self, CodecError> {
        if data.len() > MAX_CHUNK_LEN {
            return Err(CodecError::ChunkTooLarge { len: data.len() });
        }
        Ok(Chunk { data })
    }

    /// The payload length as carried in the prefix.
    pub fn len(&self) -> u16 {
        self.data.len() as u16
    }

    /// True for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encoded size inside a block: prefix plus payload.
    pub fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }
}

impl TryFrom<&[u8]> for Chunk {
    type Error = CodecError;

    fn try_from(data: &[u8]) -> Result<Self, CodecError> {
        Chunk::new(data.to_vec())
    }
}
