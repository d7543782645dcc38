//! Training fingerprints — deterministic identification of training data.
//!
//! The fingerprint stored in every model envelope is the BLAKE3 hash of the
//! canonical byte encoding of the history the model was trained on. Two trainings
//! on identical history carry identical fingerprints.

use crate::domain::PriceBar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// BLAKE3 hex digest of a price history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    /// Hash a history. Each bar contributes its date and the little-endian bytes of
    /// every field, so the digest does not depend on float formatting.
    pub fn of_history(bars: &[PriceBar]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(bars.len() as u64).to_le_bytes());
        for bar in bars {
            hasher.update(bar.date.to_string().as_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close] {
                hasher.update(&v.to_le_bytes());
            }
            hasher.update(&bar.volume.to_le_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
