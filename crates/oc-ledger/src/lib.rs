//! # Ledger Host
//!
//! The process that owns the block store. One write port with a
//! single worker serializes admissions; one read port with a small
//! pool serves lookups concurrently. Admission feeds the difficulty
//! controller, which retargets the proof-of-work once per 256-block
//! window.

pub mod config;
pub mod domain;
pub mod node;
pub mod service;

pub use config::LedgerConfig;
pub use domain::ledger::Ledger;
pub use node::LedgerNode;
