use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use trellis_common::{batch::BatchUpdateInput, digest::Digest, event::EventKind};

/// The parts of an assembled batch worth keeping after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub kind: EventKind,
    pub first_index: u64,
    pub size: u64,
    pub old_root: Digest,
    pub new_root: Digest,
    pub args_hash: Digest,
}

impl From<&BatchUpdateInput> for BatchSummary {
    fn from(batch: &BatchUpdateInput) -> Self {
        Self {
            kind: batch.kind,
            first_index: batch.first_index,
            size: batch.batch_size() as u64,
            old_root: batch.old_root,
            new_root: batch.new_root,
            args_hash: batch.args_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Accepted { reward: U256 },
    /// Another submitter advanced the root first.
    LostRace,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: u64,
    /// Ledger height the submission was made at.
    pub height: u64,
    pub deposit: Option<BatchSummary>,
    pub withdrawal: Option<BatchSummary>,
    pub outcome: SubmissionOutcome,
}
