use alloy_primitives::U256;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::str::FromStr;

use crate::serialization::hex_bytes;

/// A 32-byte big-endian value. Roots, leaf hashes and args hashes are all
/// carried in this form so calldata and the circuit agree bit for bit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl Digest {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn hash(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data.as_ref());
        Self(hasher.finalize().into())
    }

    pub fn hash_items(items: &[impl AsRef<[u8]>]) -> Self {
        let mut hasher = Sha256::new();
        for item in items {
            hasher.update(item.as_ref());
        }
        Self(hasher.finalize().into())
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.0)
    }

    pub fn from_u256(value: U256) -> Self {
        Self(value.to_be_bytes::<32>())
    }

    /// Decimal rendering, as circuit input files expect.
    pub fn to_decimal(&self) -> String {
        self.to_u256().to_string()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// left-pads shorter arrays, so addresses and block numbers map onto the field
impl<const N: usize> From<[u8; N]> for Digest {
    fn from(value: [u8; N]) -> Self {
        assert!(N <= 32, "input array must not exceed 32 bytes");
        let mut digest = [0u8; 32];
        digest[32 - N..].copy_from_slice(&value);
        Self(digest)
    }
}

impl From<U256> for Digest {
    fn from(value: U256) -> Self {
        Self::from_u256(value)
    }
}

impl From<Digest> for U256 {
    fn from(value: Digest) -> Self {
        value.to_u256()
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let bytes: [u8; 32] =
            bytes.try_into().map_err(|b: Vec<u8>| anyhow!("expected 32 bytes, got {}", b.len()))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
