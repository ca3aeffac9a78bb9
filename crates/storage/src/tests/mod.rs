use alloy_primitives::U256;
use tempfile::TempDir;
use trellis_common::{digest::Digest, event::EventKind, test_utils::EventGenerator};

use crate::{
    BatchSummary, Database, SubmissionOutcome, SubmissionRecord,
    inmemory::InMemoryDatabase,
    rocksdb::{RocksDBConfig, RocksDBConnection},
};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StorageBackend {
    RocksDB(RocksDBConfig),
    InMemory,
}

fn setup_db(backend: StorageBackend) -> Box<dyn Database> {
    match backend {
        StorageBackend::RocksDB(cfg) => Box::new(RocksDBConnection::new(&cfg).unwrap()),
        StorageBackend::InMemory => Box::new(InMemoryDatabase::new()),
    }
}

fn summary(kind: EventKind, first_index: u64) -> BatchSummary {
    BatchSummary {
        kind,
        first_index,
        size: 16,
        old_root: Digest::hash("old"),
        new_root: Digest::hash("new"),
        args_hash: Digest::hash("args"),
    }
}

fn submission(id: u64, outcome: SubmissionOutcome) -> SubmissionRecord {
    SubmissionRecord {
        id,
        height: 10 + id,
        deposit: Some(summary(EventKind::Deposit, id * 16)),
        withdrawal: None,
        outcome,
    }
}

fn test_append_and_read_events(backend: StorageBackend) {
    let db = setup_db(backend);
    let mut generator = EventGenerator::new(1);
    let deposits = generator.events(EventKind::Deposit, 5);
    let withdrawals = generator.events(EventKind::Withdrawal, 2);

    db.append_events(EventKind::Deposit, &deposits[..3]).unwrap();
    db.append_events(EventKind::Deposit, &deposits[3..]).unwrap();
    db.append_events(EventKind::Withdrawal, &withdrawals).unwrap();

    assert_eq!(db.event_count(EventKind::Deposit).unwrap(), 5);
    assert_eq!(db.event_count(EventKind::Withdrawal).unwrap(), 2);
    assert_eq!(db.get_events(EventKind::Deposit, 0).unwrap(), deposits);
    assert_eq!(db.get_events(EventKind::Deposit, 3).unwrap(), deposits[3..]);
    assert_eq!(db.get_events(EventKind::Withdrawal, 0).unwrap(), withdrawals);
    assert!(db.get_events(EventKind::Withdrawal, 7).unwrap().is_empty());
}

fn test_rejects_gaps_and_wrong_kind(backend: StorageBackend) {
    let db = setup_db(backend);
    let mut generator = EventGenerator::new(2);
    let deposits = generator.events(EventKind::Deposit, 4);

    assert!(db.append_events(EventKind::Deposit, &deposits[1..]).is_err());
    assert!(db.append_events(EventKind::Withdrawal, &deposits[..1]).is_err());
    assert_eq!(db.event_count(EventKind::Deposit).unwrap(), 0);

    db.append_events(EventKind::Deposit, &deposits[..2]).unwrap();
    // re-delivering already stored events is rejected too
    assert!(db.append_events(EventKind::Deposit, &deposits[1..]).is_err());
    assert_eq!(db.event_count(EventKind::Deposit).unwrap(), 2);
}

fn test_sync_height(backend: StorageBackend) {
    let db = setup_db(backend);
    assert!(db.get_last_synced_height().is_err());

    let height = 12345u64;
    db.set_last_synced_height(&height).unwrap();
    let read_height = db.get_last_synced_height().unwrap();

    assert_eq!(read_height, height);
}

fn test_submission_history(backend: StorageBackend) {
    let db = setup_db(backend);

    // Test that getting latest submission fails when none exist
    assert!(db.get_latest_submission_id().is_err());

    let accepted = submission(
        0,
        SubmissionOutcome::Accepted {
            reward: U256::from(1_000_000u64),
        },
    );
    db.add_submission(&accepted).unwrap();
    let lost = submission(1, SubmissionOutcome::LostRace);
    db.add_submission(&lost).unwrap();

    assert_eq!(db.get_latest_submission_id().unwrap(), 1);
    assert_eq!(db.get_latest_submission().unwrap(), lost);
    assert_eq!(db.get_submission(&0).unwrap(), accepted);
    assert!(db.get_submission(&2).is_err());
}

fn test_submissions_are_sequential(backend: StorageBackend) {
    let db = setup_db(backend);
    let rejected = SubmissionOutcome::Rejected {
        reason: "invalid proof".to_string(),
    };

    assert!(db.add_submission(&submission(1, rejected.clone())).is_err());
    db.add_submission(&submission(0, rejected.clone())).unwrap();
    assert!(db.add_submission(&submission(0, rejected)).is_err());
    assert_eq!(db.get_latest_submission_id().unwrap(), 0);
}

fn test_flush(backend: StorageBackend) {
    let db = setup_db(backend);
    let deposits = EventGenerator::new(3).events(EventKind::Deposit, 2);
    db.append_events(EventKind::Deposit, &deposits).unwrap();
    db.set_last_synced_height(&4).unwrap();
    db.add_submission(&submission(0, SubmissionOutcome::LostRace)).unwrap();

    db.flush_database().unwrap();

    assert_eq!(db.event_count(EventKind::Deposit).unwrap(), 0);
    assert!(db.get_last_synced_height().is_err());
    assert!(db.get_latest_submission().is_err());
}

macro_rules! generate_storage_tests {
    ($test_fn:ident) => {
        paste::paste! {
            #[test]
            fn [<$test_fn _inmemory>]() {
                $test_fn(StorageBackend::InMemory);
            }

            #[test]
            fn [<$test_fn _rocksdb>]() {
                let temp_dir = TempDir::new().unwrap();
                let cfg = RocksDBConfig::new(temp_dir.path().to_str().unwrap());
                $test_fn(StorageBackend::RocksDB(cfg));
            }
        }
    };
}

generate_storage_tests!(test_append_and_read_events);
generate_storage_tests!(test_rejects_gaps_and_wrong_kind);
generate_storage_tests!(test_sync_height);
generate_storage_tests!(test_submission_history);
generate_storage_tests!(test_submissions_are_sequential);
generate_storage_tests!(test_flush);

#[test]
fn test_create_storage_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config: crate::DatabaseConfig = serde_json::from_str(&format!(
        r#"{{"type":"RocksDB","path":"{}"}}"#,
        temp_dir.path().to_str().unwrap()
    ))
    .unwrap();

    let db = crate::create_storage(&config).unwrap();
    db.set_last_synced_height(&9).unwrap();
    assert_eq!(db.get_last_synced_height().unwrap(), 9);

    let default = crate::create_storage(&crate::DatabaseConfig::default()).unwrap();
    assert!(default.get_last_synced_height().is_err());
}
