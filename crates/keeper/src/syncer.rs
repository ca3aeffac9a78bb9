use anyhow::{Context, Result};
use std::sync::Arc;
use trellis_common::event::EventKind;
use trellis_events::{EventPublisher, TrellisEvent};
use trellis_ledger::{EventSource, LedgerClient};
use trellis_storage::Database;

/// Mirrors the ledger's event logs into local storage.
#[derive(Clone)]
pub struct Syncer {
    ledger: Arc<dyn LedgerClient>,
    db: Arc<Box<dyn Database>>,
    publisher: EventPublisher,
}

impl Syncer {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        db: Arc<Box<dyn Database>>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            ledger,
            db,
            publisher,
        }
    }

    /// The stored sync height, or `start_height` if nothing was synced yet.
    pub fn start_height(&self, start_height: u64) -> Result<u64> {
        match self.db.get_last_synced_height() {
            Ok(height) => Ok(height),
            Err(_) => {
                debug!("no existing sync height found, setting sync height to start_height");
                self.db.set_last_synced_height(&start_height)?;
                Ok(start_height)
            }
        }
    }

    /// Copies events of `kind` the local log does not have yet. Returns how
    /// many were added.
    pub async fn sync_kind(&self, kind: EventKind) -> Result<u64> {
        let stored = self.db.event_count(kind)?;
        let events = EventSource::get_events(self.ledger.as_ref(), kind, stored)
            .await
            .with_context(|| format!("fetching {} events from {}", kind, stored))?;
        if events.is_empty() {
            return Ok(0);
        }

        self.db.append_events(kind, &events)?;
        let count = events.len() as u64;
        debug!("synced {} {} events from index {}", count, kind, stored);
        self.publisher.send(TrellisEvent::EventsSynced {
            kind,
            from: stored,
            count,
        });
        Ok(count)
    }

    /// Syncs both logs and records `height` as synced.
    pub async fn sync(&self, height: u64) -> Result<()> {
        for kind in EventKind::ALL {
            self.sync_kind(kind).await?;
        }
        self.db.set_last_synced_height(&height)?;
        Ok(())
    }
}
