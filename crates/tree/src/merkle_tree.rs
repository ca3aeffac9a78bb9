use trellis_common::{digest::Digest, field};
use trellis_errors::ValidationError;

use crate::hasher::{FieldHasher, Sha256FieldHasher};

pub const DEFAULT_TREE_DEPTH: usize = 20;

/// Sibling hashes from a leaf up to the root, lowest level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub elements: Vec<Digest>,
    /// `true` where the path node is a right child.
    pub indices: Vec<bool>,
}

impl MerklePath {
    /// Packs the direction bits from `from_level` upwards, lowest level in bit 0.
    pub fn packed_indices(&self, from_level: usize) -> u64 {
        self.indices
            .iter()
            .skip(from_level)
            .enumerate()
            .fold(0u64, |acc, (i, bit)| acc | (u64::from(*bit) << i))
    }
}

/// Append-only merkle tree of fixed depth. Empty positions hold the zero
/// value, and every interior node of an empty subtree is the hash of two
/// empty children.
#[derive(Debug, Clone)]
pub struct MerkleTree<H = Sha256FieldHasher> {
    depth: usize,
    hasher: H,
    zeros: Vec<Digest>,
    layers: Vec<Vec<Digest>>,
}

impl<H: FieldHasher> MerkleTree<H> {
    pub fn new(depth: usize, hasher: H) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(field::zero_value());
        for level in 0..depth {
            let below = zeros[level];
            zeros.push(hasher.hash_pair(&below, &below));
        }

        Self {
            depth,
            hasher,
            zeros,
            layers: vec![Vec::new(); depth + 1],
        }
    }

    pub fn with_leaves(
        depth: usize,
        hasher: H,
        leaves: &[Digest],
    ) -> Result<Self, ValidationError> {
        let mut tree = Self::new(depth, hasher);
        tree.bulk_insert(leaves)?;
        Ok(tree)
    }

    pub const fn depth(&self) -> usize {
        self.depth
    }

    pub const fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.layers[0]
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn root(&self) -> Digest {
        self.node(self.depth, 0)
    }

    pub fn zero(&self, level: usize) -> Digest {
        self.zeros[level]
    }

    pub fn insert(&mut self, leaf: Digest) -> Result<(), ValidationError> {
        self.bulk_insert(&[leaf])
    }

    /// Appends leaves and rehashes only the nodes on their paths.
    pub fn bulk_insert(&mut self, leaves: &[Digest]) -> Result<(), ValidationError> {
        if leaves.is_empty() {
            return Ok(());
        }
        let requested = (self.len() + leaves.len()) as u64;
        if requested > self.capacity() {
            return Err(ValidationError::TreeFull {
                depth: self.depth,
                requested,
            });
        }

        let mut start = self.len();
        self.layers[0].extend_from_slice(leaves);

        for level in 1..=self.depth {
            start /= 2;
            let end = (self.layers[level - 1].len() - 1) / 2;
            self.layers[level].truncate(start);
            for i in start..=end {
                let left = self.node(level - 1, 2 * i);
                let right = self.node(level - 1, 2 * i + 1);
                let parent = self.hasher.hash_pair(&left, &right);
                self.layers[level].push(parent);
            }
        }
        Ok(())
    }

    pub fn path(&self, index: usize) -> Option<MerklePath> {
        if index >= self.len() {
            return None;
        }

        let mut elements = Vec::with_capacity(self.depth);
        let mut indices = Vec::with_capacity(self.depth);
        let mut position = index;
        for level in 0..self.depth {
            elements.push(self.node(level, position ^ 1));
            indices.push(position & 1 == 1);
            position >>= 1;
        }
        Some(MerklePath { elements, indices })
    }

    fn node(&self, level: usize, index: usize) -> Digest {
        self.layers[level].get(index).copied().unwrap_or(self.zeros[level])
    }
}

impl Default for MerkleTree<Sha256FieldHasher> {
    fn default() -> Self {
        Self::new(DEFAULT_TREE_DEPTH, Sha256FieldHasher)
    }
}
