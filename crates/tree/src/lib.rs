pub mod assembler;
pub mod hasher;
pub mod merkle_tree;

pub use assembler::{AccumulatorSnapshot, BatchAssembler};
pub use hasher::{FieldHasher, Sha256FieldHasher};
pub use merkle_tree::{MerklePath, MerkleTree};
