//! File naming.
//!
//! Minute files are named after the UTC civil time of the block
//! timestamp with unpadded components, `blockchain-2024-3-7-9-5`.
//! The unpadded form is what existing stores contain, so it is kept
//! as the on-disk convention. Index shards are `index-NNN` with NNN
//! the decimal value of the hash's first byte.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use oc_core::Big256;

/// The UTC minute a timestamp falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteBucket {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
}

impl MinuteBucket {
    /// Buckets a UNIX timestamp by its UTC minute.
    pub fn from_unix(timestamp: u64) -> Self {
        let time: DateTime<Utc> = Utc
            .timestamp_opt(timestamp as i64, 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch"));
        MinuteBucket {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            hour: time.hour(),
            minute: time.minute(),
        }
    }

    /// The minute file holding blocks of this bucket.
    pub fn filename(&self) -> String {
        format!(
            "blockchain-{}-{}-{}-{}-{}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// Name of the minute file for a block timestamp.
pub fn minute_filename(timestamp: u64) -> String {
    MinuteBucket::from_unix(timestamp).filename()
}

/// Name of the index shard for a hash.
pub fn index_filename(hash: &Big256) -> String {
    format!("index-{}", hash.first_byte())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_filename_is_unpadded() {
        // 2024-03-07 09:05:33 UTC
        assert_eq!(minute_filename(1_709_802_333), "blockchain-2024-3-7-9-5");
    }

    #[test]
    fn same_minute_same_bucket() {
        let start = 1_709_802_300; // xx:05:00
        assert_eq!(
            MinuteBucket::from_unix(start),
            MinuteBucket::from_unix(start + 59)
        );
        assert_ne!(
            MinuteBucket::from_unix(start),
            MinuteBucket::from_unix(start + 60)
        );
    }

    #[test]
    fn index_filename_uses_first_byte() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xfe;
        assert_eq!(index_filename(&Big256::from_bytes(bytes)), "index-254");
        assert_eq!(index_filename(&Big256::ZERO), "index-0");
    }
}
