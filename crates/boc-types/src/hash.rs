use std::fmt;

use serde::{Deserialize, Serialize};

/// Deterministic 64-bit hash of an external object key.
///
/// Indices store this hash instead of the key string itself. The value is the
/// first eight bytes (little-endian) of the key's BLAKE3 digest, so it is
/// stable across processes and platforms. Two distinct keys may collide; the
/// index treats colliding keys as the same object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHash(u64);

impl ObjectHash {
    /// Hash an object key.
    pub fn of(key: &str) -> Self {
        let digest = blake3::hash(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_le_bytes(prefix))
    }

    /// Wrap a pre-computed hash value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Hex-encoded big-endian representation (16 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.to_hex())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<&str> for ObjectHash {
    fn from(key: &str) -> Self {
        Self::of(key)
    }
}
