//! The write pipeline: queue, packer, miners, writer.

pub mod miner;
pub mod packer;
pub mod queue;
pub mod writer;
