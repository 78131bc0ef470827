//! # Gateway
//!
//! The client-facing process. Chunks arrive on the write port and sit
//! in a bounded queue; the packer folds them into candidate blocks;
//! the miner pool searches for a conforming nonce; the block writer
//! submits the winner to the ledger host and feeds the resulting head
//! back to the packer. Read requests are proxied to the ledger host
//! over short-lived connections.
//!
//! Back-pressure is structural: the queue admits at most its capacity
//! in unpacked chunks, and the packer keeps at most one block in
//! flight, releasing the next only after the ledger host has answered
//! for the previous one.

pub mod client;
pub mod config;
pub mod domain;
pub mod node;
pub mod service;

pub use client::{LedgerApi, MiningInfo, TcpLedgerClient, WriteOutcome};
pub use config::GatewayConfig;
pub use node::GatewayNode;
