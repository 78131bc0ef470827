//! Error types for the block and chunk codecs.

use thiserror::Error;

/// Errors produced while building, parsing, or framing blocks.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A block holds at most 255 entries.
    #[error("too many entries for one block: {count} (max 255)")]
    TooManyEntries {
        /// Number of chunks that were offered.
        count: usize,
    },

    /// A chunk payload exceeds the 16-bit length prefix.
    #[error("chunk of {len} bytes exceeds the {max}-byte limit", max = crate::MAX_CHUNK_LEN)]
    ChunkTooLarge {
        /// Length of the rejected payload.
        len: usize,
    },

    /// The payload is shorter than the fixed block header.
    #[error("block payload of {len} bytes is shorter than the {header}-byte header", header = crate::BLOCK_HEADER_LEN)]
    ShortPayload {
        /// Length of the rejected payload.
        len: usize,
    },

    /// The declared entry count does not match the encoded entries.
    #[error("entry layout mismatch: header declares {declared} entries, payload encodes {actual}")]
    EntryCountMismatch {
        /// Entry count from the header byte.
        declared: u8,
        /// Entries actually decodable from the payload.
        actual: usize,
    },

    /// An entry's length prefix runs past the end of the payload.
    #[error("entry {index} overruns the block payload")]
    EntryOverrun {
        /// Zero-based index of the offending entry.
        index: usize,
    },

    /// The hash carried in the frame does not match the payload.
    #[error("frame hash does not match the block payload")]
    HashMismatch,

    /// A frame declares a payload no valid block can occupy.
    #[error("frame declares {len} payload bytes, limit is {max}", max = crate::MAX_BLOCK_PAYLOAD_LEN)]
    FrameTooLarge {
        /// Declared payload length.
        len: usize,
    },

    /// An I/O failure while reading or writing a framed block.
    #[error("framed block I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to parse a hex string into a [`crate::Big256`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseBig256Error {
    /// The input was not 64 hex digits.
    #[error("expected 64 hex digits, got {len}")]
    BadLength {
        /// Length of the offered string.
        len: usize,
    },

    /// The input held a non-hex character.
    #[error("invalid hex input")]
    BadDigit,
}
