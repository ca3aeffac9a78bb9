use anyhow::Result;
use auto_impl::auto_impl;
use trellis_common::event::{EventKind, LeafEvent};

use crate::submission::SubmissionRecord;

/// Keeper-side persistence: a local copy of the ledger's event log and the
/// history of every update the keeper submitted.
#[auto_impl(&, Box, Arc)]
pub trait Database: Send + Sync {
    /// Appends events that continue the stored log without gaps.
    fn append_events(&self, kind: EventKind, events: &[LeafEvent]) -> Result<()>;
    fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>>;
    fn event_count(&self, kind: EventKind) -> Result<u64>;

    fn get_last_synced_height(&self) -> Result<u64>;
    fn set_last_synced_height(&self, height: &u64) -> Result<()>;

    /// Submissions are numbered from zero without gaps.
    fn add_submission(&self, record: &SubmissionRecord) -> Result<()>;
    fn get_submission(&self, id: &u64) -> Result<SubmissionRecord>;
    fn get_latest_submission_id(&self) -> Result<u64>;
    fn get_latest_submission(&self) -> Result<SubmissionRecord>;

    fn flush_database(&self) -> Result<()>;
}

/// Checks that `events` are all of `kind` and continue a log of `stored`
/// entries.
pub(crate) fn check_continuation(kind: EventKind, stored: u64, events: &[LeafEvent]) -> Result<()> {
    for (offset, event) in events.iter().enumerate() {
        let expected = stored + offset as u64;
        if event.kind != kind || event.index != expected {
            return Err(trellis_errors::DatabaseError::WriteError(format!(
                "{} event {} (expected {} event {})",
                event.kind, event.index, kind, expected
            ))
            .into());
        }
    }
    Ok(())
}
