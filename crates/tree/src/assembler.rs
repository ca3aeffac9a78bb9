use tracing::debug;
use trellis_common::{
    args::args_hash,
    batch::BatchUpdateInput,
    digest::Digest,
    event::{EventKind, LeafEvent, LeafRecord},
};
use trellis_errors::{InsufficientBacklogError, TrellisError, ValidationError};

use crate::{
    hasher::{FieldHasher, Sha256FieldHasher},
    merkle_tree::{DEFAULT_TREE_DEPTH, MerkleTree},
};

pub const DEFAULT_BATCH_HEIGHT: usize = 4;

/// Confirmed on-chain state of one accumulator: its root and every leaf
/// record already folded into it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorSnapshot {
    pub kind: EventKind,
    pub root: Digest,
    pub committed: Vec<LeafRecord>,
}

impl AccumulatorSnapshot {
    pub const fn new(kind: EventKind, root: Digest, committed: Vec<LeafRecord>) -> Self {
        Self {
            kind,
            root,
            committed,
        }
    }

    pub fn last_processed(&self) -> u64 {
        self.committed.len() as u64
    }
}

/// Builds [`BatchUpdateInput`]s for a fixed tree depth and batch size.
///
/// Working trees are rebuilt from a confirmed snapshot for every batch and
/// never kept between attempts, so an abandoned proof cannot leave behind
/// state that later batches depend on.
#[derive(Debug, Clone)]
pub struct BatchAssembler<H = Sha256FieldHasher> {
    depth: usize,
    batch_size: usize,
    hasher: H,
}

impl Default for BatchAssembler<Sha256FieldHasher> {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TREE_DEPTH,
            batch_size: 1 << DEFAULT_BATCH_HEIGHT,
            hasher: Sha256FieldHasher,
        }
    }
}

impl<H: FieldHasher> BatchAssembler<H> {
    pub fn new(depth: usize, batch_size: usize, hasher: H) -> Result<Self, ValidationError> {
        if !batch_size.is_power_of_two() {
            return Err(ValidationError::NotPowerOfTwo(batch_size));
        }
        if batch_size.trailing_zeros() as usize > depth {
            return Err(ValidationError::TreeFull {
                depth,
                requested: batch_size as u64,
            });
        }
        Ok(Self {
            depth,
            batch_size,
            hasher,
        })
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaf_hash(&self, record: &LeafRecord) -> Digest {
        self.hasher.hash_leaf(record)
    }

    /// Reconstructs the working tree and checks it against the confirmed root.
    pub fn rebuild(
        &self,
        snapshot: &AccumulatorSnapshot,
    ) -> Result<MerkleTree<H>, ValidationError> {
        let leaves: Vec<Digest> = snapshot.committed.iter().map(|r| self.leaf_hash(r)).collect();
        let tree = MerkleTree::with_leaves(self.depth, self.hasher.clone(), &leaves)?;

        if tree.root() != snapshot.root {
            return Err(ValidationError::RootMismatch {
                confirmed: snapshot.root.to_string(),
                computed: tree.root().to_string(),
            });
        }
        Ok(tree)
    }

    /// Picks the slice of pending events the next batch will cover: the largest
    /// power-of-two prefix, capped at the batch size. Anything past it stays
    /// pending.
    pub fn select<'a>(
        &self,
        pending: &'a [LeafEvent],
    ) -> Result<&'a [LeafEvent], InsufficientBacklogError> {
        let take = largest_power_of_two_prefix(pending.len()).min(self.batch_size);
        if take < self.batch_size {
            return Err(InsufficientBacklogError {
                available: pending.len() as u64,
                required: self.batch_size as u64,
            });
        }
        Ok(&pending[..take])
    }

    /// Folds `events` into a copy of `tree` and records everything the prover
    /// and the verifier need. `tree` itself is left untouched.
    pub fn assemble(
        &self,
        tree: &MerkleTree<H>,
        kind: EventKind,
        events: &[LeafEvent],
    ) -> Result<BatchUpdateInput, ValidationError> {
        if events.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if !events.len().is_power_of_two() {
            return Err(ValidationError::NotPowerOfTwo(events.len()));
        }
        let batch_height = events.len().trailing_zeros() as usize;

        let first_index = tree.len() as u64;
        for (offset, event) in events.iter().enumerate() {
            let expected = first_index + offset as u64;
            if event.index != expected {
                return Err(ValidationError::NonContiguous {
                    expected,
                    got: event.index,
                });
            }
        }

        let records: Vec<LeafRecord> = events.iter().map(LeafEvent::record).collect();
        let leaves: Vec<Digest> = records.iter().map(|r| self.leaf_hash(r)).collect();

        let mut working = tree.clone();
        let old_root = working.root();
        working.bulk_insert(&leaves)?;
        let new_root = working.root();

        let path = working.path(working.len() - 1).ok_or(ValidationError::EmptyBatch)?;
        let path_elements = path.elements[batch_height..].to_vec();
        let path_indices = path.packed_indices(batch_height) as u32;

        let args_hash = args_hash(&old_root, &new_root, path_indices, &records);
        debug!(
            "assembled {} batch of {} leaves at {}: {} -> {}",
            kind,
            records.len(),
            first_index,
            old_root,
            new_root
        );

        Ok(BatchUpdateInput {
            kind,
            first_index,
            old_root,
            new_root,
            path_indices,
            path_elements,
            leaves: records,
            args_hash,
        })
    }

    /// Rebuild, select and assemble in one step.
    pub fn next_batch(
        &self,
        snapshot: &AccumulatorSnapshot,
        pending: &[LeafEvent],
    ) -> Result<BatchUpdateInput, TrellisError> {
        let tree = self.rebuild(snapshot)?;
        let selected = self.select(pending)?;
        Ok(self.assemble(&tree, snapshot.kind, selected)?)
    }
}

pub const fn largest_power_of_two_prefix(n: usize) -> usize {
    if n == 0 { 0 } else { 1 << (usize::BITS - 1 - n.leading_zeros()) }
}
