//! # Core Ledger Types
//!
//! The leaf crate of the workspace: the 256-bit value type used for
//! hashes and difficulty targets, the chunk payload type, and the
//! block codec with its framed on-disk/on-wire envelope.
//!
//! Everything above this crate (wire protocol, storage engine, the
//! ledger and gateway processes) speaks in these types.

pub mod big256;
pub mod block;
pub mod chunk;
pub mod error;

pub use big256::Big256;
pub use block::{Block, EntryIter, BLOCK_HEADER_LEN, FRAME_OVERHEAD, MAX_BLOCK_PAYLOAD_LEN};
pub use chunk::{Chunk, MAX_CHUNK_LEN};
pub use error::CodecError;
