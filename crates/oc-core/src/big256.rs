//! A 256-bit unsigned big-endian value.
//!
//! Hashes and difficulty targets are both 32-byte big-endian integers.
//! The wrapper keeps the byte representation canonical for hashing and
//! wire encoding while allowing exact arithmetic through
//! [`primitive_types::U256`].

use std::fmt;

use primitive_types::U256;

use crate::error::ParseBig256Error;

/// A 32-byte unsigned integer, stored big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Big256([u8; 32]);

impl Big256 {
    /// The all-zero value.
    pub const ZERO: Big256 = Big256([0u8; 32]);

    /// The value one.
    pub const ONE: Big256 = {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        Big256(bytes)
    };

    /// Wraps a big-endian byte array.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Big256(bytes)
    }

    /// Copies the first 32 bytes of `source`.
    ///
    /// Returns `None` when the slice is too short.
    pub fn from_slice(source: &[u8]) -> Option<Self> {
        let head: [u8; 32] = source.get(..32)?.try_into().ok()?;
        Some(Big256(head))
    }

    /// Parses exactly 64 hex digits.
    pub fn from_hex(input: &str) -> Result<Self, ParseBig256Error> {
        if input.len() != 64 {
            return Err(ParseBig256Error::BadLength { len: input.len() });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(input, &mut bytes).map_err(|_| ParseBig256Error::BadDigit)?;
        Ok(Big256(bytes))
    }

    /// Converts from an arbitrary-precision value.
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Big256(bytes)
    }

    /// Converts to an arbitrary-precision value.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// The big-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The most significant byte. Used to shard the hash index.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Lowercase hex rendering, 64 digits.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True for the all-zero value.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// True for the value one.
    pub fn is_one(&self) -> bool {
        *self == Self::ONE
    }
}

impl fmt::Display for Big256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for Big256 {
    fn from(bytes: [u8; 32]) -> Self {
        Big256(bytes)
    }
}

impl From<U256> for Big256 {
    fn from(value: U256) -> Self {
        Big256::from_u256(value)
    }
}
