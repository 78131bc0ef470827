//! # Wire Protocol
//!
//! The binary protocol spoken on every TCP connection in the system:
//! client to gateway, gateway to ledger host.
//!
//! Every message is a single opcode byte followed by an
//! opcode-specific payload. Multi-byte integers are little-endian;
//! hashes and difficulty targets are 32-byte big-endian values. Blocks
//! are embedded in their framed form, `{ len: u32 LE, hash: 32 bytes,
//! payload }`, exactly as they rest on disk.
//!
//! Connections are one-shot: the peer writes a request, reads one
//! response, and closes. An unknown opcode or a short read surfaces as
//! [`ProtocolError`] and the connection is dropped without a reply.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{read_message, write_message, Message};
