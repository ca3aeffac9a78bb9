use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trellis_contracts::ContractsConfig;
use trellis_tree::{
    MerkleTree, Sha256FieldHasher, assembler::DEFAULT_BATCH_HEIGHT,
    merkle_tree::DEFAULT_TREE_DEPTH,
};

pub const DEFAULT_BLOCK_TIME_SECS: u64 = 15;
pub const DEFAULT_GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub batch_size: usize,
    pub tree_depth: usize,
    /// Wall-clock interval between produced blocks. Also the number of
    /// ledger seconds each block advances.
    pub block_time_secs: u64,
    pub genesis_timestamp: u64,
    pub token: Address,
    pub auction: Address,
    pub auction_owner: Address,
    pub stream_registry: Address,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1 << DEFAULT_BATCH_HEIGHT,
            tree_depth: DEFAULT_TREE_DEPTH,
            block_time_secs: DEFAULT_BLOCK_TIME_SECS,
            genesis_timestamp: DEFAULT_GENESIS_TIMESTAMP,
            token: Address::repeat_byte(0x70),
            auction: Address::repeat_byte(0xa0),
            auction_owner: Address::repeat_byte(0x0e),
            stream_registry: Address::repeat_byte(0x5a),
        }
    }
}

impl LedgerConfig {
    pub const fn block_time(&self) -> Duration {
        Duration::from_secs(self.block_time_secs)
    }

    pub fn contracts(&self) -> ContractsConfig {
        ContractsConfig {
            batch_size: self.batch_size,
            empty_root: MerkleTree::new(self.tree_depth, Sha256FieldHasher).root(),
            token: self.token,
            auction: self.auction,
            auction_owner: self.auction_owner,
            stream_registry: self.stream_registry,
        }
    }
}
