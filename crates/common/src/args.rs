use sha2::{Digest as _, Sha256};

use crate::{digest::Digest, event::LeafRecord, field};

/// Binds a batch to the proof that covers it.
///
/// SHA-256 over `old_root ‖ new_root ‖ path_indices (4B BE)` followed by
/// `payload_hash ‖ instance ‖ block (4B BE)` for every leaf in order, reduced
/// into the scalar field. The circuit computes the same value internally and
/// exposes it as its only public input.
pub fn args_hash(
    old_root: &Digest,
    new_root: &Digest,
    path_indices: u32,
    leaves: &[LeafRecord],
) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(old_root.as_ref());
    hasher.update(new_root.as_ref());
    hasher.update(path_indices.to_be_bytes());
    for leaf in leaves {
        hasher.update(leaf.payload_hash.as_ref());
        hasher.update(leaf.instance.as_slice());
        hasher.update(leaf.block.to_be_bytes());
    }
    field::reduce(hasher.finalize().into())
}
