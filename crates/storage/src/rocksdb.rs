use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::debug;
use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, WriteBatch};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use trellis_common::event::{EventKind, LEAF_RECORD_SIZE, LeafEvent, LeafRecord};
use trellis_errors::DatabaseError;

use crate::{
    database::{Database, check_continuation},
    submission::SubmissionRecord,
};

const KEY_PREFIX_EVENTS: &str = "events:";
const KEY_PREFIX_EVENT_COUNT: &str = "app_state:event_count:";
const KEY_PREFIX_SUBMISSIONS: &str = "submissions:id_";
const KEY_SYNC_HEIGHT: &[u8] = b"app_state:sync_height";
const KEY_LATEST_SUBMISSION: &[u8] = b"app_state:latest_submission_id";

type RocksDB = DBWithThreadMode<MultiThreaded>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RocksDBConfig {
    pub path: String,
}

impl RocksDBConfig {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct RocksDBConnection {
    connection: Arc<RocksDB>,
    path: String,
}

impl RocksDBConnection {
    pub fn new(cfg: &RocksDBConfig) -> Result<Self, DatabaseError> {
        let path = &cfg.path;
        let db = RocksDB::open_default(path)
            .map_err(|e| DatabaseError::InitializationError(e.to_string()))?;

        Ok(Self {
            connection: Arc::new(db),
            path: path.to_string(),
        })
    }

    fn get_u64(&self, key: &[u8], what: &str) -> Result<u64> {
        let res = self
            .connection
            .get(key)?
            .ok_or_else(|| DatabaseError::NotFoundError(what.to_string()))?;

        Ok(u64::from_be_bytes(res.try_into().map_err(|e| {
            anyhow!("failed byte conversion from BigEndian to u64: {:?}", e)
        })?))
    }
}

/// Event keys sort by index within a kind. Values are encoded leaf records.
fn event_key(kind: EventKind, index: u64) -> Vec<u8> {
    let mut key = event_prefix(kind);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn event_prefix(kind: EventKind) -> Vec<u8> {
    format!("{KEY_PREFIX_EVENTS}{kind}:").into_bytes()
}

fn event_count_key(kind: EventKind) -> Vec<u8> {
    format!("{KEY_PREFIX_EVENT_COUNT}{kind}").into_bytes()
}

fn encode<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| {
        anyhow!(DatabaseError::ParsingError(format!(
            "failed to encode {}: {}",
            what, e
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| {
        anyhow!(DatabaseError::ParsingError(format!(
            "failed to decode {}: {}",
            what, e
        )))
    })
}

impl Database for RocksDBConnection {
    fn append_events(&self, kind: EventKind, events: &[LeafEvent]) -> Result<()> {
        let stored = self.event_count(kind)?;
        check_continuation(kind, stored, events)?;
        if events.is_empty() {
            return Ok(());
        }

        // events and the new count land together or not at all
        let mut batch = WriteBatch::default();
        for event in events {
            batch.put(event_key(kind, event.index), event.record().encode());
        }
        let count = stored + events.len() as u64;
        batch.put(event_count_key(kind), count.to_be_bytes());

        self.connection.write(batch)?;
        debug!("stored {} {} events, {} total", events.len(), kind, count);
        Ok(())
    }

    fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>> {
        let prefix = event_prefix(kind);
        let start = event_key(kind, from);
        let iter = self.connection.iterator(IteratorMode::From(&start, Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let index: [u8; 8] = key[prefix.len()..].try_into().map_err(|_| {
                DatabaseError::ParsingError(format!("malformed event key {:?}", key))
            })?;
            let record: [u8; LEAF_RECORD_SIZE] = value.as_ref().try_into().map_err(|_| {
                DatabaseError::ParsingError(format!("{} byte event record", value.len()))
            })?;
            let record = LeafRecord::decode(&record);
            events.push(LeafEvent {
                kind,
                instance: record.instance,
                payload_hash: record.payload_hash,
                block: record.block,
                index: u64::from_be_bytes(index),
            });
        }
        Ok(events)
    }

    fn event_count(&self, kind: EventKind) -> Result<u64> {
        match self.connection.get(event_count_key(kind))? {
            None => Ok(0),
            Some(bytes) => Ok(u64::from_be_bytes(bytes.try_into().map_err(|e| {
                anyhow!("failed byte conversion from BigEndian to u64: {:?}", e)
            })?)),
        }
    }

    fn get_last_synced_height(&self) -> Result<u64> {
        self.get_u64(KEY_SYNC_HEIGHT, "current sync height")
    }

    fn set_last_synced_height(&self, height: &u64) -> Result<()> {
        Ok(self.connection.put(KEY_SYNC_HEIGHT, height.to_be_bytes())?)
    }

    fn add_submission(&self, record: &SubmissionRecord) -> Result<()> {
        let expected = self.get_latest_submission_id().map_or(0, |latest| latest + 1);
        if record.id != expected {
            return Err(anyhow!(DatabaseError::WriteError(format!(
                "submission id mismatch: expected {}, got {}",
                expected, record.id
            ))));
        }

        let data = encode(record, &format!("submission {}", record.id))?;

        let mut batch = WriteBatch::default();
        batch.put(format!("{}{}", KEY_PREFIX_SUBMISSIONS, record.id).as_bytes(), &data);
        batch.put(KEY_LATEST_SUBMISSION, record.id.to_be_bytes());

        self.connection.write(batch)?;
        Ok(())
    }

    fn get_submission(&self, id: &u64) -> Result<SubmissionRecord> {
        let key = format!("{}{}", KEY_PREFIX_SUBMISSIONS, id);
        let data = self
            .connection
            .get(key.as_bytes())?
            .ok_or_else(|| DatabaseError::NotFoundError(format!("submission {}", id)))?;

        decode(&data, &format!("submission {}", id))
    }

    fn get_latest_submission_id(&self) -> Result<u64> {
        self.get_u64(KEY_LATEST_SUBMISSION, "latest submission id")
    }

    fn get_latest_submission(&self) -> Result<SubmissionRecord> {
        let id = self.get_latest_submission_id()?;
        self.get_submission(&id)
    }

    fn flush_database(&self) -> Result<()> {
        let mut batch = WriteBatch::default();
        for item in self.connection.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete(key);
        }
        self.connection.write(batch)?;
        debug!("flushed database at {}", self.path);
        Ok(())
    }
}
