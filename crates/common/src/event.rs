use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::digest::Digest;

/// Byte width of one encoded leaf record: hash, instance, block.
pub const LEAF_RECORD_SIZE: usize = 32 + 20 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Deposit,
    Withdrawal,
}

impl EventKind {
    pub const ALL: [Self; 2] = [Self::Deposit, Self::Withdrawal];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of an event that is committed on chain and bound by the args hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafRecord {
    pub payload_hash: Digest,
    pub instance: Address,
    pub block: u32,
}

impl LeafRecord {
    pub const fn new(instance: Address, payload_hash: Digest, block: u32) -> Self {
        Self {
            payload_hash,
            instance,
            block,
        }
    }

    pub fn encode(&self) -> [u8; LEAF_RECORD_SIZE] {
        let mut out = [0u8; LEAF_RECORD_SIZE];
        out[..32].copy_from_slice(self.payload_hash.as_ref());
        out[32..52].copy_from_slice(self.instance.as_slice());
        out[52..].copy_from_slice(&self.block.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8; LEAF_RECORD_SIZE]) -> Self {
        let mut payload_hash = [0u8; 32];
        payload_hash.copy_from_slice(&bytes[..32]);
        let mut block = [0u8; 4];
        block.copy_from_slice(&bytes[52..]);
        Self {
            payload_hash: Digest(payload_hash),
            instance: Address::from_slice(&bytes[32..52]),
            block: u32::from_be_bytes(block),
        }
    }

    /// Instance address widened to a field element.
    pub fn instance_digest(&self) -> Digest {
        Digest::from(self.instance.0.0)
    }

    pub fn block_digest(&self) -> Digest {
        Digest::from(self.block.to_be_bytes())
    }
}

/// One entry of the ledger's append-only deposit or withdrawal log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEvent {
    pub kind: EventKind,
    pub instance: Address,
    pub payload_hash: Digest,
    pub block: u32,
    pub index: u64,
}

impl LeafEvent {
    pub const fn record(&self) -> LeafRecord {
        LeafRecord::new(self.instance, self.payload_hash, self.block)
    }
}
