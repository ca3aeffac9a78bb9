//! Wire format of a batch update call.
//!
//! ```text
//! selector     4B
//! proof        8 x 32B
//! args_hash    32B
//! old_root     32B
//! new_root     32B
//! path_indices 4B big-endian
//! leaf_count   4B big-endian
//! leaves       leaf_count x (hash 32B, instance 20B, block 4B)
//! ```
//!
//! The leaf count is recoverable from the array header alone, and the total
//! length must agree with it.

use alloy_primitives::keccak256;
use trellis_errors::ValidationError;

use crate::{
    batch::BatchArgs,
    digest::Digest,
    event::{EventKind, LEAF_RECORD_SIZE, LeafRecord},
    proof::{PROOF_SIZE, Proof},
};

pub const SELECTOR_SIZE: usize = 4;
pub const HEADER_SIZE: usize = SELECTOR_SIZE + PROOF_SIZE + 3 * 32 + 4 + 4;

const DEPOSIT_SIGNATURE: &str =
    "updateDepositTree(bytes,bytes32,bytes32,bytes32,bytes4,(bytes32,address,uint32)[])";
const WITHDRAWAL_SIGNATURE: &str =
    "updateWithdrawalTree(bytes,bytes32,bytes32,bytes32,bytes4,(bytes32,address,uint32)[])";

pub fn selector(kind: EventKind) -> [u8; SELECTOR_SIZE] {
    let signature = match kind {
        EventKind::Deposit => DEPOSIT_SIGNATURE,
        EventKind::Withdrawal => WITHDRAWAL_SIGNATURE,
    };
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; SELECTOR_SIZE];
    out.copy_from_slice(&hash[..SELECTOR_SIZE]);
    out
}

/// Which tree a calldata blob targets, read from its selector.
pub fn kind_of(calldata: &[u8]) -> Result<EventKind, ValidationError> {
    let Some(sel) = calldata.get(..SELECTOR_SIZE) else {
        return Err(ValidationError::CalldataLength {
            expected: HEADER_SIZE,
            got: calldata.len(),
        });
    };
    EventKind::ALL
        .into_iter()
        .find(|kind| selector(*kind) == sel)
        .ok_or_else(|| ValidationError::UnknownSelector(hex::encode(sel)))
}

/// Number of leaves a calldata blob applies. Derived only from the encoded
/// leaf array, never from chain state.
pub fn path_index(calldata: &[u8]) -> Result<u64, ValidationError> {
    if calldata.len() < HEADER_SIZE {
        return Err(ValidationError::CalldataLength {
            expected: HEADER_SIZE,
            got: calldata.len(),
        });
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(&calldata[HEADER_SIZE - 4..HEADER_SIZE]);
    let count = u32::from_be_bytes(count) as usize;

    let expected = HEADER_SIZE + count * LEAF_RECORD_SIZE;
    if calldata.len() != expected {
        return Err(ValidationError::CalldataLength {
            expected,
            got: calldata.len(),
        });
    }
    Ok(count as u64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub kind: EventKind,
    pub proof: Proof,
    pub args: BatchArgs,
}

impl BatchCall {
    pub const fn new(kind: EventKind, proof: Proof, args: BatchArgs) -> Self {
        Self { kind, proof, args }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.args.leaves.len() * LEAF_RECORD_SIZE);
        out.extend_from_slice(&selector(self.kind));
        out.extend_from_slice(&self.proof.to_bytes());
        out.extend_from_slice(self.args.args_hash.as_ref());
        out.extend_from_slice(self.args.old_root.as_ref());
        out.extend_from_slice(self.args.new_root.as_ref());
        out.extend_from_slice(&self.args.path_indices.to_be_bytes());
        out.extend_from_slice(&(self.args.leaves.len() as u32).to_be_bytes());
        for leaf in &self.args.leaves {
            out.extend_from_slice(&leaf.encode());
        }
        out
    }

    pub fn decode(calldata: &[u8]) -> Result<Self, ValidationError> {
        let kind = kind_of(calldata)?;
        let count = path_index(calldata)? as usize;

        let mut cursor = SELECTOR_SIZE;
        let proof = Proof::from_bytes(&calldata[cursor..cursor + PROOF_SIZE])?;
        cursor += PROOF_SIZE;

        let mut word = || {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&calldata[cursor..cursor + 32]);
            cursor += 32;
            Digest(bytes)
        };
        let args_hash = word();
        let old_root = word();
        let new_root = word();

        let mut path_indices = [0u8; 4];
        path_indices.copy_from_slice(&calldata[HEADER_SIZE - 8..HEADER_SIZE - 4]);

        let leaves = calldata[HEADER_SIZE..]
            .chunks_exact(LEAF_RECORD_SIZE)
            .take(count)
            .map(|chunk| {
                let mut record = [0u8; LEAF_RECORD_SIZE];
                record.copy_from_slice(chunk);
                LeafRecord::decode(&record)
            })
            .collect();

        Ok(Self {
            kind,
            proof,
            args: BatchArgs {
                args_hash,
                old_root,
                new_root,
                path_indices: u32::from_be_bytes(path_indices),
                leaves,
            },
        })
    }
}
