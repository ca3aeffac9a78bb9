use anyhow::Result;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use trellis_common::event::{EventKind, LeafEvent};
use trellis_errors::DatabaseError;

use crate::{
    database::{Database, check_continuation},
    submission::SubmissionRecord,
};

#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    events: Arc<Mutex<HashMap<EventKind, Vec<LeafEvent>>>>,
    submissions: Arc<Mutex<Vec<SubmissionRecord>>>,
    sync_height: Arc<Mutex<Option<u64>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DatabaseError> {
    mutex.lock().map_err(|_| DatabaseError::LockError)
}

impl Database for InMemoryDatabase {
    fn append_events(&self, kind: EventKind, events: &[LeafEvent]) -> Result<()> {
        let mut stored = lock(&self.events)?;
        let log = stored.entry(kind).or_default();
        check_continuation(kind, log.len() as u64, events)?;
        log.extend_from_slice(events);
        Ok(())
    }

    fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>> {
        let stored = lock(&self.events)?;
        Ok(stored
            .get(&kind)
            .map(|log| log.iter().skip(from as usize).cloned().collect())
            .unwrap_or_default())
    }

    fn event_count(&self, kind: EventKind) -> Result<u64> {
        Ok(lock(&self.events)?.get(&kind).map_or(0, |log| log.len() as u64))
    }

    fn get_last_synced_height(&self) -> Result<u64> {
        lock(&self.sync_height)?
            .ok_or_else(|| DatabaseError::NotFoundError("current sync height".to_string()).into())
    }

    fn set_last_synced_height(&self, height: &u64) -> Result<()> {
        *lock(&self.sync_height)? = Some(*height);
        Ok(())
    }

    fn add_submission(&self, record: &SubmissionRecord) -> Result<()> {
        let mut submissions = lock(&self.submissions)?;
        if submissions.len() as u64 != record.id {
            return Err(DatabaseError::WriteError(format!(
                "submission id mismatch: expected {}, got {}",
                submissions.len(),
                record.id
            ))
            .into());
        }
        submissions.push(record.clone());
        Ok(())
    }

    fn get_submission(&self, id: &u64) -> Result<SubmissionRecord> {
        let submissions = lock(&self.submissions)?;
        match submissions.get(*id as usize) {
            Some(record) => Ok(record.clone()),
            None => Err(DatabaseError::NotFoundError(format!("submission {}", id)).into()),
        }
    }

    fn get_latest_submission_id(&self) -> Result<u64> {
        let submissions = lock(&self.submissions)?;
        if submissions.is_empty() {
            return Err(DatabaseError::NotFoundError("latest submission id".to_string()).into());
        }
        Ok(submissions.len() as u64 - 1)
    }

    fn get_latest_submission(&self) -> Result<SubmissionRecord> {
        let id = self.get_latest_submission_id()?;
        self.get_submission(&id)
    }

    fn flush_database(&self) -> Result<()> {
        lock(&self.events)?.clear();
        lock(&self.submissions)?.clear();
        *lock(&self.sync_height)? = None;
        Ok(())
    }
}
