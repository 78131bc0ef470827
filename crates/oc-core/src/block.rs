//! The block codec.
//!
//! A block is kept as one contiguous buffer in exactly the layout that
//! is hashed and persisted:
//!
//! ```text
//! offset   0  previous_hash   32 bytes, big-endian
//! offset  32  nonce           32 bytes
//! offset  64  timestamp        8 bytes, little-endian UNIX seconds
//! offset  72  entry_count      1 byte
//! offset  73  difficulty      32 bytes, big-endian
//! offset 105  entries         entry_count x { len: u16 LE, bytes }
//! ```
//!
//! The block hash is SHA-256 over the whole buffer and is memoized;
//! any mutation marks the buffer dirty and the next hash computation
//! starts fresh. On disk and on the wire a block travels framed as
//! `{ payload_len: u32 LE, hash: 32 bytes, payload }`.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use primitive_types::{U256, U512};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::big256::Big256;
use crate::chunk::Chunk;
use crate::error::CodecError;

const PREVIOUS_HASH_OFFSET: usize = 0;
const NONCE_OFFSET: usize = 32;
const TIMESTAMP_OFFSET: usize = 64;
const ENTRY_COUNT_OFFSET: usize = 72;
const DIFFICULTY_OFFSET: usize = 73;

/// Fixed size of the block header that precedes the entries.
pub const BLOCK_HEADER_LEN: usize = 105;

/// Extra bytes added by the frame: length prefix plus hash.
pub const FRAME_OVERHEAD: usize = 4 + 32;

/// Largest payload a well-formed block can occupy: the header plus
/// 255 entries of the maximum chunk size. Frames declaring more than
/// this are rejected before any allocation.
pub const MAX_BLOCK_PAYLOAD_LEN: usize =
    BLOCK_HEADER_LEN + 255 * (2 + crate::chunk::MAX_CHUNK_LEN);

/// A hash-chained record of chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    buffer: Vec<u8>,
    hash: [u8; 32],
    dirty: bool,
}

impl Block {
    /// Builds a block over `chunks` in the given order, chained to
    /// `previous_hash` and carrying `difficulty` as its target.
    ///
    /// The timestamp is set to the current UTC second and the nonce is
    /// left zeroed for the miners to fill in.
    pub fn build(
        previous_hash: &Big256,
        difficulty: &Big256,
        chunks: &[Chunk],
    ) -> Result<Self, CodecError> {
        if chunks.len() > u8::MAX as usize {
            return Err(CodecError::TooManyEntries {
                count: chunks.len(),
            });
        }

        let total = BLOCK_HEADER_LEN + chunks.iter().map(Chunk::encoded_len).sum::<usize>();
        let mut block = Block {
            buffer: vec![0u8; total],
            hash: [0u8; 32],
            dirty: true,
        };

        block.set_previous_hash(previous_hash);
        block.set_difficulty(difficulty);
        block.set_timestamp(unix_now());
        block.buffer[ENTRY_COUNT_OFFSET] = chunks.len() as u8;

        let mut offset = BLOCK_HEADER_LEN;
        for chunk in chunks {
            block.buffer[offset..offset + 2].copy_from_slice(&chunk.len().to_le_bytes());
            offset += 2;
            block.buffer[offset..offset + chunk.data().len()].copy_from_slice(chunk.data());
            offset += chunk.data().len();
        }

        block.rehash();
        Ok(block)
    }

    /// Reassembles a block from a frame's hash and payload.
    ///
    /// The payload layout is validated and the hash is recomputed and
    /// checked against the frame before the block is accepted.
    pub fn from_parts(hash: Big256, payload: Vec<u8>) -> Result<Self, CodecError> {
        validate_layout(&payload)?;
        let digest: [u8; 32] = Sha256::digest(&payload).into();
        if digest != *hash.as_bytes() {
            return Err(CodecError::HashMismatch);
        }
        Ok(Block {
            buffer: payload,
            hash: digest,
            dirty: false,
        })
    }

    /// Reads one framed block from `reader`.
    pub fn read_framed<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let payload_len = u32::from_le_bytes(len_bytes) as usize;
        if payload_len > MAX_BLOCK_PAYLOAD_LEN {
            return Err(CodecError::FrameTooLarge { len: payload_len });
        }

        let mut hash = [0u8; 32];
        reader.read_exact(&mut hash)?;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        Block::from_parts(Big256::from_bytes(hash), payload)
    }

    /// Like [`Block::read_framed`], but a clean end of stream before
    /// the first byte yields `None` instead of an error.
    pub fn try_read_framed<R: Read>(reader: &mut R) -> Result<Option<Self>, CodecError> {
        let mut len_bytes = [0u8; 4];
        let mut filled = 0;
        while filled < len_bytes.len() {
            match reader.read(&mut len_bytes[filled..])? {
                0 if filled == 0 => return Ok(None),
                0 => {
                    return Err(CodecError::Io(std::io::Error::from(
                        std::io::ErrorKind::UnexpectedEof,
                    )))
                }
                n => filled += n,
            }
        }
        let payload_len = u32::from_le_bytes(len_bytes) as usize;
        if payload_len > MAX_BLOCK_PAYLOAD_LEN {
            return Err(CodecError::FrameTooLarge { len: payload_len });
        }

        let mut hash = [0u8; 32];
        reader.read_exact(&mut hash)?;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        Block::from_parts(Big256::from_bytes(hash), payload).map(Some)
    }

    /// Writes the framed representation to `writer`.
    pub fn write_framed<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        let hash = self.hash();
        writer.write_all(&(self.buffer.len() as u32).to_le_bytes())?;
        writer.write_all(hash.as_bytes())?;
        writer.write_all(&self.buffer)?;
        Ok(())
    }

    /// The framed representation as a byte vector.
    pub fn framed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.framed_len());
        // Writing into a Vec cannot fail.
        self.write_framed(&mut out).expect("vec write");
        out
    }

    /// Length of the framed representation.
    pub fn framed_len(&self) -> usize {
        FRAME_OVERHEAD + self.buffer.len()
    }

    /// The raw payload, header plus entries.
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    /// SHA-256 over the payload. Served from the memo when the buffer
    /// has not been mutated since the last computation.
    pub fn hash(&self) -> Big256 {
        if self.dirty {
            Big256::from_bytes(Sha256::digest(&self.buffer).into())
        } else {
            Big256::from_bytes(self.hash)
        }
    }

    fn rehash(&mut self) {
        self.hash = Sha256::digest(&self.buffer).into();
        self.dirty = false;
    }

    /// Hash of the block this one extends.
    pub fn previous_hash(&self) -> Big256 {
        self.read_big256(PREVIOUS_HASH_OFFSET)
    }

    /// The proof-of-work search value.
    pub fn nonce(&self) -> Big256 {
        self.read_big256(NONCE_OFFSET)
    }

    /// The difficulty target recorded in the block.
    pub fn difficulty(&self) -> Big256 {
        self.read_big256(DIFFICULTY_OFFSET)
    }

    /// Creation time, UNIX seconds UTC.
    pub fn timestamp(&self) -> u64 {
        let bytes: [u8; 8] = self.buffer[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]
            .try_into()
            .expect("fixed slice");
        u64::from_le_bytes(bytes)
    }

    /// Number of entries the header declares.
    pub fn entry_count(&self) -> u8 {
        self.buffer[ENTRY_COUNT_OFFSET]
    }

    /// Overwrites the nonce with 32 fresh random bytes.
    pub fn generate_nonce(&mut self) {
        rand::thread_rng().fill_bytes(&mut self.buffer[NONCE_OFFSET..NONCE_OFFSET + 32]);
        self.dirty = true;
    }

    /// Stamps the block with the current UTC second.
    pub fn update_timestamp(&mut self) {
        self.set_timestamp(unix_now());
    }

    /// Stamps the block with an explicit creation time.
    pub fn set_creation_time(&mut self, unix_seconds: u64) {
        self.set_timestamp(unix_seconds);
    }

    /// One mining attempt: fresh nonce, fresh timestamp, recompute the
    /// hash, and test it against the recorded difficulty.
    pub fn attempt_hash(&mut self) -> bool {
        self.generate_nonce();
        self.update_timestamp();
        self.rehash();
        self.is_valid_at_difficulty()
    }

    /// Whether `hash x difficulty < 2^256`.
    ///
    /// A difficulty of one accepts every hash; each doubling of the
    /// target halves the acceptable hash range.
    pub fn is_valid_at_difficulty(&self) -> bool {
        let product = self.hash().to_u256().full_mul(self.difficulty().to_u256());
        product < (U512::one() << 256)
    }

    /// A restartable iterator over the block's entries.
    pub fn entries(&self) -> EntryIter<'_> {
        EntryIter {
            buffer: &self.buffer,
            offset: BLOCK_HEADER_LEN,
            remaining: self.entry_count(),
        }
    }

    fn read_big256(&self, offset: usize) -> Big256 {
        Big256::from_slice(&self.buffer[offset..offset + 32]).expect("fixed slice")
    }

    fn set_previous_hash(&mut self, hash: &Big256) {
        self.buffer[PREVIOUS_HASH_OFFSET..PREVIOUS_HASH_OFFSET + 32]
            .copy_from_slice(hash.as_bytes());
        self.dirty = true;
    }

    fn set_difficulty(&mut self, difficulty: &Big256) {
        self.buffer[DIFFICULTY_OFFSET..DIFFICULTY_OFFSET + 32]
            .copy_from_slice(difficulty.as_bytes());
        self.dirty = true;
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.buffer[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]
            .copy_from_slice(&timestamp.to_le_bytes());
        self.dirty = true;
    }
}

/// Checks that a payload is a well-formed block image: long enough for
/// the header, and with entries that cover the remainder exactly.
fn validate_layout(payload: &[u8]) -> Result<(), CodecError> {
    if payload.len() < BLOCK_HEADER_LEN {
        return Err(CodecError::ShortPayload { len: payload.len() });
    }

    let declared = payload[ENTRY_COUNT_OFFSET];
    let mut offset = BLOCK_HEADER_LEN;
    for index in 0..declared as usize {
        let prefix = payload
            .get(offset..offset + 2)
            .ok_or(CodecError::EntryOverrun { index })?;
        let len = u16::from_le_bytes(prefix.try_into().expect("fixed slice")) as usize;
        offset += 2;
        if payload.len() < offset + len {
            return Err(CodecError::EntryOverrun { index });
        }
        offset += len;
    }

    if offset != payload.len() {
        // Trailing bytes past the last declared entry.
        let mut actual = declared as usize;
        let mut probe = offset;
        while probe + 2 <= payload.len() {
            let len =
                u16::from_le_bytes(payload[probe..probe + 2].try_into().expect("fixed slice"))
                    as usize;
            if payload.len() < probe + 2 + len {
                break;
            }
            probe += 2 + len;
            actual += 1;
        }
        return Err(CodecError::EntryCountMismatch { declared, actual });
    }

    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Lazy walk over the entries of a block.
///
/// The iterator borrows the block buffer and decodes one chunk per
/// step; calling [`Block::entries`] again restarts from the first.
pub struct EntryIter<'a> {
    buffer: &'a [u8],
    offset: usize,
    remaining: u8,
}

impl Iterator for EntryIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }
        let prefix = self.buffer.get(self.offset..self.offset + 2)?;
        let len = u16::from_le_bytes(prefix.try_into().ok()?) as usize;
        let data = self.buffer.get(self.offset + 2..self.offset + 2 + len)?;
        self.offset += 2 + len;
        self.remaining -= 1;
        // Length was validated at construction time.
        Chunk::new(data.to_vec()).ok()
    }
}
