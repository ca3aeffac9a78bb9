use std::{fmt, sync::Arc};
use tracing::{debug, warn};
use trellis_common::{
    batch::BatchArgs,
    digest::Digest,
    event::{EventKind, LeafRecord},
    field::is_field_element,
    proof::Proof,
};
use trellis_errors::{ProofVerificationError, StaleRootError, TrellisError, ValidationError};

use crate::verifier::ProofVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeState {
    root: Digest,
    /// Number of registered events already folded into `root`.
    last_processed: u64,
    /// Shared so cloning the state for a transition does not copy the log.
    registered: Arc<Vec<LeafRecord>>,
}

impl TreeState {
    fn new(root: Digest) -> Self {
        Self {
            root,
            last_processed: 0,
            registered: Arc::new(Vec::new()),
        }
    }
}

/// The authoritative roots of both accumulators and the event log they
/// consume. A batch is applied only if it builds on the stored root, so two
/// submitters racing on the same root cannot both win.
#[derive(Clone)]
pub struct AccumulatorState {
    batch_size: usize,
    deposits: TreeState,
    withdrawals: TreeState,
    verifier: Arc<dyn ProofVerifier>,
}

impl fmt::Debug for AccumulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorState")
            .field("batch_size", &self.batch_size)
            .field("deposits", &self.deposits)
            .field("withdrawals", &self.withdrawals)
            .finish_non_exhaustive()
    }
}

impl AccumulatorState {
    /// Both trees start from `empty_root`, the root of a tree holding only
    /// zero leaves.
    pub fn new(
        empty_root: Digest,
        batch_size: usize,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self, ValidationError> {
        if !batch_size.is_power_of_two() {
            return Err(ValidationError::NotPowerOfTwo(batch_size));
        }
        Ok(Self {
            batch_size,
            deposits: TreeState::new(empty_root),
            withdrawals: TreeState::new(empty_root),
            verifier,
        })
    }

    const fn tree(&self, kind: EventKind) -> &TreeState {
        match kind {
            EventKind::Deposit => &self.deposits,
            EventKind::Withdrawal => &self.withdrawals,
        }
    }

    const fn tree_mut(&mut self, kind: EventKind) -> &mut TreeState {
        match kind {
            EventKind::Deposit => &mut self.deposits,
            EventKind::Withdrawal => &mut self.withdrawals,
        }
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn batch_height(&self) -> u32 {
        self.batch_size.trailing_zeros()
    }

    pub const fn current_root(&self, kind: EventKind) -> Digest {
        self.tree(kind).root
    }

    pub const fn last_processed(&self, kind: EventKind) -> u64 {
        self.tree(kind).last_processed
    }

    pub fn total_registered(&self, kind: EventKind) -> u64 {
        self.tree(kind).registered.len() as u64
    }

    /// Events registered but not yet in the tree.
    pub fn pending_count(&self, kind: EventKind) -> u64 {
        self.total_registered(kind) - self.last_processed(kind)
    }

    /// Registered records starting at index `from`.
    pub fn registered(&self, kind: EventKind, from: u64) -> &[LeafRecord] {
        let registered = &self.tree(kind).registered;
        let from = usize::try_from(from).unwrap_or(usize::MAX).min(registered.len());
        &registered[from..]
    }

    /// Appends to the event log and returns the index of the new event.
    pub fn register_event(&mut self, kind: EventKind, record: LeafRecord) -> u64 {
        let tree = self.tree_mut(kind);
        Arc::make_mut(&mut tree.registered).push(record);
        tree.registered.len() as u64 - 1
    }

    #[cfg(test)]
    pub(crate) fn shares_event_log(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.deposits.registered, &other.deposits.registered)
            && Arc::ptr_eq(&self.withdrawals.registered, &other.withdrawals.registered)
    }

    /// Runs every check [`Self::apply_batch`] does without touching state.
    pub fn check_batch(
        &self,
        kind: EventKind,
        proof: &Proof,
        args: &BatchArgs,
    ) -> Result<(), TrellisError> {
        let tree = self.tree(kind);

        if args.old_root != tree.root {
            return Err(StaleRootError {
                stored: tree.root.to_string(),
                submitted: args.old_root.to_string(),
            }
            .into());
        }

        if args.batch_size() != self.batch_size {
            return Err(ValidationError::BatchSizeMismatch {
                expected: self.batch_size,
                got: args.batch_size(),
            }
            .into());
        }

        for value in [&args.new_root, &args.args_hash] {
            if !is_field_element(value) {
                return Err(ValidationError::NotAFieldElement(value.to_string()).into());
            }
        }

        let computed = args.computed_args_hash();
        if computed != args.args_hash {
            return Err(ProofVerificationError::ArgsHashMismatch {
                computed: computed.to_string(),
                submitted: args.args_hash.to_string(),
            }
            .into());
        }

        let expected = (tree.last_processed >> self.batch_height()) as u32;
        if args.path_indices != expected {
            return Err(ProofVerificationError::PathIndexMismatch {
                expected,
                got: args.path_indices,
            }
            .into());
        }

        for (offset, leaf) in args.leaves.iter().enumerate() {
            let index = tree.last_processed + offset as u64;
            let registered = usize::try_from(index).ok().and_then(|i| tree.registered.get(i));
            if registered != Some(leaf) {
                return Err(ProofVerificationError::UnregisteredLeaf { index }.into());
            }
        }

        self.verifier.verify(proof, &args.args_hash)?;
        Ok(())
    }

    /// Verifies a batch and advances the stored root. Returns the number of
    /// leaves applied. Nothing changes unless every check passes.
    pub fn apply_batch(
        &mut self,
        kind: EventKind,
        proof: &Proof,
        args: &BatchArgs,
    ) -> Result<u64, TrellisError> {
        if let Err(err) = self.check_batch(kind, proof, args) {
            warn!("rejected {} batch at {}: {}", kind, self.last_processed(kind), err);
            return Err(err);
        }

        let applied = args.batch_size() as u64;
        let tree = self.tree_mut(kind);
        tree.root = args.new_root;
        tree.last_processed += applied;
        debug!(
            "{} root advanced to {} ({} leaves processed)",
            kind, tree.root, tree.last_processed
        );
        Ok(applied)
    }
}
