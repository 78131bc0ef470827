//! Difficulty retargeting.
//!
//! The target rate is one block per [`TARGET_BLOCK_SECONDS`] seconds,
//! measured over windows of [`ADJUSTMENT_WINDOW`] admitted blocks. At
//! each window boundary the new difficulty is
//!
//! ```text
//! new = floor(old * ADJUSTMENT_WINDOW * TARGET_BLOCK_SECONDS / delta_seconds)
//! ```
//!
//! so a window mined in exactly `256 * 12` seconds leaves the
//! difficulty unchanged, a faster window raises it proportionally,
//! and a slower one lowers it. The product is taken in 512 bits; a
//! quotient that no longer fits 256 bits is reported as an overflow
//! and the caller keeps the previous difficulty.

use oc_core::Big256;
use primitive_types::{U256, U512};

/// Blocks per retargeting window.
pub const ADJUSTMENT_WINDOW: u64 = 256;

/// Intended seconds between blocks.
pub const TARGET_BLOCK_SECONDS: u64 = 12;

/// Outcome of a retargeting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retarget {
    /// Not at a window boundary; difficulty carried over.
    Unchanged,
    /// New difficulty computed from the window duration.
    Adjusted(Big256),
    /// The computed value exceeded 256 bits; difficulty carried over.
    Overflowed,
}

/// Computes the difficulty after admitting block number `mined_count`
/// (1-based), where `delta_seconds` is the wall time since the last
/// admission, floored to whole seconds.
pub fn retarget(current: &Big256, mined_count: u64, delta_seconds: u64) -> Retarget {
    if mined_count % ADJUSTMENT_WINDOW != 0 {
        return Retarget::Unchanged;
    }

    let delta = delta_seconds.max(1);
    let numerator = current
        .to_u256()
        .full_mul(U256::from(ADJUSTMENT_WINDOW * TARGET_BLOCK_SECONDS));
    let quotient = numerator / U512::from(delta);

    match u512_to_u256(quotient) {
        Some(value) => Retarget::Adjusted(Big256::from_u256(value)),
        None => Retarget::Overflowed,
    }
}

fn u512_to_u256(value: U512) -> Option<U256> {
    if value >> 256 != U512::zero() {
        return None;
    }
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    Some(U256::from_big_endian(&bytes[32..]))
}
