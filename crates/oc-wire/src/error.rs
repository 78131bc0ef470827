//! Protocol failure modes.

use oc_core::CodecError;
use thiserror::Error;

/// Errors raised while decoding or encoding wire messages.
///
/// Any of these terminates the connection; the protocol has no error
/// responses below the per-operation accept/found flags.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The opcode byte does not name a known message.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// An embedded framed block failed to parse.
    #[error("embedded block rejected: {0}")]
    Codec(#[from] CodecError),

    /// The underlying stream failed or ended mid-message.
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
