use alloy_primitives::Address;
use std::{fs, path::PathBuf, sync::Arc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use trellis_common::{event::EventKind, test_utils::EventGenerator};
use trellis_contracts::MockProofChecker;
use trellis_events::{EventChannel, TrellisEvent};
use trellis_ledger::{InMemoryLedger, LedgerClient, LedgerConfig};
use trellis_storage::{
    Database, DatabaseConfig, inmemory::InMemoryDatabase, rocksdb::RocksDBConfig,
};

use crate::{KeeperConfig, ProverKind, Syncer, create_keeper, load_settings};

fn ledger() -> Arc<InMemoryLedger> {
    let config = LedgerConfig {
        batch_size: 4,
        tree_depth: 8,
        ..LedgerConfig::default()
    };
    Arc::new(InMemoryLedger::new(config, Arc::new(MockProofChecker)).unwrap().0)
}

fn database() -> Arc<Box<dyn Database>> {
    Arc::new(Box::new(InMemoryDatabase::new()))
}

#[test]
fn test_default_config() {
    let config = KeeperConfig::default();
    assert_eq!(config.batch_size, 16);
    assert_eq!(config.tree_depth, 20);
    assert_eq!(config.prover.kind, ProverKind::Mock);
    assert_eq!(config.db, DatabaseConfig::InMemory);
    assert!(config.prover.prover_path.ends_with(".trellis/bin/prover"));

    let options = config.prover.external_options();
    assert_eq!(
        options.circuit_key,
        PathBuf::from(&config.prover.circuit_key_base_path).with_extension("zkey")
    );
    assert_eq!(options.timeout.as_secs(), config.prover.timeout_secs);
}

#[test]
fn test_load_settings_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keeper.toml");
    fs::write(
        &path,
        r#"
batch_size = 4
tree_depth = 8
caller = "0xbebebebebebebebebebebebebebebebebebebebe"
max_prover_attempts = 5

[prover]
kind = "external"
timeout_secs = 30

[db]
type = "RocksDB"
path = "/var/lib/trellis"
"#,
    )
    .unwrap();

    let config = load_settings(path.to_str()).unwrap();
    assert_eq!(config.batch_size, 4);
    assert_eq!(config.tree_depth, 8);
    assert_eq!(config.caller, Address::repeat_byte(0xbe));
    assert_eq!(config.max_prover_attempts, 5);
    assert_eq!(config.prover.kind, ProverKind::External);
    assert_eq!(config.prover.timeout_secs, 30);
    assert!(!config.prover.keep_witness);
    assert_eq!(config.db, DatabaseConfig::RocksDB(RocksDBConfig::new("/var/lib/trellis")));

    // everything the file leaves out keeps its default
    let defaults = KeeperConfig::default();
    assert_eq!(config.poll_interval_secs, defaults.poll_interval_secs);
    assert_eq!(config.prover.prover_path, defaults.prover.prover_path);
}

#[test]
fn test_load_settings_without_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    let config = load_settings(missing.to_str()).unwrap();
    assert_eq!(config.batch_size, KeeperConfig::default().batch_size);
}

#[test]
fn test_create_keeper_checks_config() {
    let mut config = KeeperConfig::default();
    let token = CancellationToken::new();
    assert!(create_keeper(&config, ledger(), database(), token.clone()).is_err());

    config.caller = Address::repeat_byte(0xbe);
    config.batch_size = 6;
    assert!(create_keeper(&config, ledger(), database(), token.clone()).is_err());

    config.batch_size = 4;
    config.tree_depth = 8;
    let keeper = create_keeper(&config, ledger(), database(), token).unwrap();
    assert_eq!(keeper.options().caller, config.caller);
}

#[tokio::test]
async fn test_syncer_copies_new_events() {
    let ledger = ledger();
    let db = database();
    let channel = EventChannel::new();
    let mut events = channel.subscribe();
    let syncer = Syncer::new(ledger.clone(), db.clone(), channel.publisher());

    let mut generator = EventGenerator::new(9);
    for event in generator.events(EventKind::Deposit, 3) {
        ledger.register_deposit(event.instance, event.payload_hash).await;
    }
    assert_eq!(syncer.sync_kind(EventKind::Deposit).await.unwrap(), 3);
    assert_eq!(syncer.sync_kind(EventKind::Deposit).await.unwrap(), 0);

    for event in generator.events(EventKind::Deposit, 2) {
        ledger.register_deposit(event.instance, event.payload_hash).await;
    }
    ledger.mine().await;
    syncer.sync(1).await.unwrap();

    let stored = db.get_events(EventKind::Deposit, 0).unwrap();
    let on_ledger = LedgerClient::get_events(ledger.as_ref(), EventKind::Deposit, 0).await.unwrap();
    assert_eq!(stored, on_ledger);
    assert_eq!(db.event_count(EventKind::Withdrawal).unwrap(), 0);
    assert_eq!(db.get_last_synced_height().unwrap(), 1);

    let first = events.recv().await.unwrap();
    assert!(matches!(
        first.event,
        TrellisEvent::EventsSynced {
            kind: EventKind::Deposit,
            from: 0,
            count: 3
        }
    ));
    let second = events.recv().await.unwrap();
    assert!(matches!(second.event, TrellisEvent::EventsSynced { from: 3, count: 2, .. }));
}

#[test]
fn test_syncer_start_height() {
    let db = database();
    let syncer = Syncer::new(ledger(), db.clone(), EventChannel::new().publisher());

    assert_eq!(syncer.start_height(7).unwrap(), 7);
    assert_eq!(db.get_last_synced_height().unwrap(), 7);

    db.set_last_synced_height(&12).unwrap();
    assert_eq!(syncer.start_height(7).unwrap(), 12);
}
