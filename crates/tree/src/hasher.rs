use sha2::{Digest as _, Sha256};
use trellis_common::{digest::Digest, event::LeafRecord, field};

/// Two-to-one and leaf hashing over the scalar field. The batch circuit must
/// use the same function, so the hasher is fixed per deployment.
pub trait FieldHasher: Clone + Send + Sync {
    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest;

    fn hash_items(&self, items: &[Digest]) -> Digest;

    /// `hash(instance, payload_hash, block)`
    fn hash_leaf(&self, record: &LeafRecord) -> Digest {
        self.hash_items(&[record.instance_digest(), record.payload_hash, record.block_digest()])
    }
}

/// SHA-256 over the 32-byte big-endian encodings, reduced into the field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256FieldHasher;

impl FieldHasher for Sha256FieldHasher {
    fn hash_pair(&self, left: &Digest, right: &Digest) -> Digest {
        self.hash_items(&[*left, *right])
    }

    fn hash_items(&self, items: &[Digest]) -> Digest {
        let mut hasher = Sha256::new();
        for item in items {
            hasher.update(item.as_ref());
        }
        field::reduce(hasher.finalize().into())
    }
}
