//! The persistent chain tip.

use oc_core::Big256;

/// Size of the head record on disk.
pub const HEAD_RECORD_LEN: usize = 32 + 32 + 8;

/// The chain tip as the ledger host tracks it: the hash and timestamp
/// of the last admitted block and the difficulty the next block must
/// carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    /// Hash of the last admitted block, zero before the first.
    pub previous_hash: Big256,
    /// Difficulty required of the next block.
    pub difficulty: Big256,
    /// Timestamp of the last admitted block, zero before the first.
    pub timestamp: u64,
}

impl Head {
    /// The boot state of an empty store: zero hash, difficulty one.
    pub fn genesis() -> Self {
        Head {
            previous_hash: Big256::ZERO,
            difficulty: Big256::ONE,
            timestamp: 0,
        }
    }

    /// Encodes the 72-byte on-disk record.
    pub fn encode(&self) -> [u8; HEAD_RECORD_LEN] {
        let mut bytes = [0u8; HEAD_RECORD_LEN];
        bytes[..32].copy_from_slice(self.previous_hash.as_bytes());
        bytes[32..64].copy_from_slice(self.difficulty.as_bytes());
        bytes[64..].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    /// Decodes a 72-byte on-disk record.
    pub fn decode(bytes: &[u8; HEAD_RECORD_LEN]) -> Self {
        Head {
            previous_hash: Big256::from_slice(&bytes[..32]).expect("fixed slice"),
            difficulty: Big256::from_slice(&bytes[32..64]).expect("fixed slice"),
            timestamp: u64::from_le_bytes(bytes[64..].try_into().expect("fixed slice")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_defaults() {
        let head = Head::genesis();
        assert!(head.previous_hash.is_zero());
        assert!(head.difficulty.is_one());
        assert_eq!(head.timestamp, 0);
    }

    #[test]
    fn record_round_trip() {
        let head = Head {
            previous_hash: Big256::from_bytes([3u8; 32]),
            difficulty: Big256::from_bytes([4u8; 32]),
            timestamp: 1_700_000_123,
        };
        assert_eq!(Head::decode(&head.encode()), head);
    }
}
