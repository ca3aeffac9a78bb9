use serde::{Deserialize, Serialize};

use crate::{
    args::args_hash,
    digest::Digest,
    event::{EventKind, LeafRecord},
};

/// Arguments of an on-chain batch update. This is exactly what calldata carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchArgs {
    pub args_hash: Digest,
    pub old_root: Digest,
    pub new_root: Digest,
    pub path_indices: u32,
    pub leaves: Vec<LeafRecord>,
}

impl BatchArgs {
    pub fn new(
        old_root: Digest,
        new_root: Digest,
        path_indices: u32,
        leaves: Vec<LeafRecord>,
    ) -> Self {
        let args_hash = args_hash(&old_root, &new_root, path_indices, &leaves);
        Self {
            args_hash,
            old_root,
            new_root,
            path_indices,
            leaves,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.leaves.len()
    }

    /// Recomputes the args hash from the other fields, ignoring the carried one.
    pub fn computed_args_hash(&self) -> Digest {
        args_hash(&self.old_root, &self.new_root, self.path_indices, &self.leaves)
    }
}

/// Everything the prover needs for one batch: the public calldata fields plus
/// the private merkle path above the batch subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdateInput {
    pub kind: EventKind,
    /// Sequence index of the first leaf in the batch.
    pub first_index: u64,
    pub old_root: Digest,
    pub new_root: Digest,
    pub path_indices: u32,
    pub path_elements: Vec<Digest>,
    pub leaves: Vec<LeafRecord>,
    pub args_hash: Digest,
}

impl BatchUpdateInput {
    pub fn batch_size(&self) -> usize {
        self.leaves.len()
    }

    pub fn args(&self) -> BatchArgs {
        BatchArgs {
            args_hash: self.args_hash,
            old_root: self.old_root,
            new_root: self.new_root,
            path_indices: self.path_indices,
            leaves: self.leaves.clone(),
        }
    }

    pub fn circuit_input(&self) -> CircuitInput {
        CircuitInput {
            args_hash: self.args_hash.to_decimal(),
            old_root: self.old_root.to_decimal(),
            new_root: self.new_root.to_decimal(),
            path_indices: self.path_indices.to_string(),
            path_elements: self.path_elements.iter().map(Digest::to_decimal).collect(),
            instances: self.leaves.iter().map(|l| l.instance_digest().to_decimal()).collect(),
            hashes: self.leaves.iter().map(|l| l.payload_hash.to_decimal()).collect(),
            blocks: self.leaves.iter().map(|l| l.block.to_string()).collect(),
        }
    }
}

/// Witness generator input file. Field elements are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitInput {
    pub args_hash: String,
    pub old_root: String,
    pub new_root: String,
    pub path_indices: String,
    pub path_elements: Vec<String>,
    pub instances: Vec<String>,
    pub hashes: Vec<String>,
    pub blocks: Vec<String>,
}
