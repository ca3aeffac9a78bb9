use alloy_primitives::U256;
use core::fmt;
use serde::Serialize;
use std::time::SystemTime;
use trellis_common::{digest::Digest, event::EventKind};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum TrellisEvent {
    /// Sent when the keeper has loaded its state and starts polling the ledger.
    Ready,
    /// Sent after new log entries were copied into local storage.
    EventsSynced {
        kind: EventKind,
        from: u64,
        count: u64,
    },
    /// Sent when fewer leaves are pending than one batch needs.
    BacklogInsufficient {
        kind: EventKind,
        available: u64,
        required: u64,
    },
    /// Sent when a batch was assembled against the confirmed root.
    BatchAssembled {
        kind: EventKind,
        first_index: u64,
        size: u64,
        old_root: Digest,
        new_root: Digest,
    },
    /// Sent when the prover returned a proof for the given args hash.
    ProofGenerated { kind: EventKind, args_hash: Digest },
    /// Sent when proving failed. Carries the prover's error message.
    ProverFailed { kind: EventKind, error: String },
    /// Sent when an update was accepted and the caller was paid.
    RootsUpdated {
        deposits: u64,
        withdrawals: u64,
        reward: U256,
    },
    /// Sent when another submitter moved the root first.
    LostRace { error: String },
    /// Sent when a stream adjustment replaced the auction's funding stream.
    StreamAdjusted { previous: u64, current: u64 },
    /// Sent when an unspecific error occurs during operation.
    OperationError { error: String },
}

impl TrellisEvent {
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::ProverFailed { .. } | Self::OperationError { .. })
    }
}

impl fmt::Display for TrellisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Keeper is ready and polling the ledger"),
            Self::EventsSynced { kind, from, count } => {
                write!(f, "Synced {} {} events from index {}", count, kind, from)
            }
            Self::BacklogInsufficient {
                kind,
                available,
                required,
            } => {
                write!(
                    f,
                    "Waiting for {} backlog: {} pending, {} required",
                    kind, available, required
                )
            }
            Self::BatchAssembled {
                kind,
                first_index,
                size,
                old_root,
                new_root,
            } => {
                write!(
                    f,
                    "Assembled {} batch of {} at index {}: {} -> {}",
                    kind, size, first_index, old_root, new_root
                )
            }
            Self::ProofGenerated { kind, args_hash } => {
                write!(f, "Generated {} proof for args hash {}", kind, args_hash)
            }
            Self::ProverFailed { kind, error } => {
                write!(f, "Proving {} batch failed: {}", kind, error)
            }
            Self::RootsUpdated {
                deposits,
                withdrawals,
                reward,
            } => {
                write!(
                    f,
                    "Updated roots with {} deposits and {} withdrawals, earned {}",
                    deposits, withdrawals, reward
                )
            }
            Self::LostRace { error } => write!(f, "Lost submission race: {}", error),
            Self::StreamAdjusted { previous, current } => {
                write!(f, "Funding stream {} replaced by {}", previous, current)
            }
            Self::OperationError { error } => write!(f, "Operation error: {}", error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventInfo {
    pub event: TrellisEvent,
    pub time: SystemTime,
    pub formatted_log: String,
}

impl EventInfo {
    pub const fn is_error(&self) -> bool {
        self.event.is_error()
    }
}
