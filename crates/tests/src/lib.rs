#![cfg(test)]

#[macro_use]
extern crate log;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::{spawn, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use trellis_common::{event::EventKind, test_utils::EventGenerator};
use trellis_contracts::{AuctionState, MockProofChecker, NewStream};
use trellis_errors::{StreamStateError, TrellisError};
use trellis_events::{EventSubscriber, TrellisEvent};
use trellis_keeper::{Keeper, KeeperConfig, KeeperOptions, create_keeper, prover_engine::MockProver};
use trellis_ledger::{InMemoryLedger, LedgerClient, LedgerConfig};
use trellis_storage::{
    Database, DatabaseConfig, SubmissionOutcome, create_storage, inmemory::InMemoryDatabase,
    rocksdb::RocksDBConfig,
};
use trellis_tree::{BatchAssembler, Sha256FieldHasher};

const DEPTH: usize = 8;
const BATCH: usize = 4;
const FUNDER: Address = Address::repeat_byte(0xf0);
const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);

fn init_logger() {
    let _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Debug)
        .filter_module("tracing", log::LevelFilter::Off)
        .filter_module("rocksdb", log::LevelFilter::Off)
        .is_test(true)
        .try_init();
}

fn ledger_config() -> LedgerConfig {
    LedgerConfig {
        batch_size: BATCH,
        tree_depth: DEPTH,
        ..LedgerConfig::default()
    }
}

fn setup_ledger(config: LedgerConfig) -> Arc<InMemoryLedger> {
    let (ledger, _) = InMemoryLedger::new(config, Arc::new(MockProofChecker)).unwrap();
    Arc::new(ledger)
}

/// The directory has to outlive the database.
fn setup_db() -> (TempDir, Arc<Box<dyn Database>>) {
    let temp_dir = TempDir::new().unwrap();
    let cfg = DatabaseConfig::RocksDB(RocksDBConfig::new(temp_dir.path().to_str().unwrap()));
    let db = create_storage(&cfg).unwrap();
    (temp_dir, db)
}

fn keeper_config(caller: Address) -> KeeperConfig {
    KeeperConfig {
        batch_size: BATCH,
        tree_depth: DEPTH,
        caller,
        poll_interval_secs: 1,
        ..KeeperConfig::default()
    }
}

fn racing_keeper(ledger: Arc<InMemoryLedger>, caller: Address, latency: Duration) -> Keeper {
    let options = KeeperOptions {
        caller,
        ..KeeperOptions::default()
    };
    Keeper::new(
        ledger,
        Arc::new(Box::new(InMemoryDatabase::new())),
        Arc::new(MockProver::with_latency(latency)),
        BatchAssembler::new(DEPTH, BATCH, Sha256FieldHasher).unwrap(),
        options,
        CancellationToken::new(),
    )
}

async fn register(
    ledger: &InMemoryLedger,
    generator: &mut EventGenerator,
    kind: EventKind,
    n: usize,
) {
    for event in generator.events(kind, n) {
        match kind {
            EventKind::Deposit => ledger.register_deposit(event.instance, event.payload_hash).await,
            EventKind::Withdrawal => {
                ledger.register_withdrawal(event.instance, event.payload_hash).await
            }
        };
    }
}

/// Opens a stream of `rate` tokens per second from now on and points the
/// auction at it.
async fn fund_auction(ledger: &InMemoryLedger, rate: u64, duration: u64) -> u64 {
    let config = ledger.config().clone();
    let deposit = U256::from(rate * duration);
    ledger.mint(FUNDER, deposit * U256::from(2)).await;

    let now = ledger.timestamp().await;
    let params = NewStream {
        recipient: config.auction,
        deposit,
        token: config.token,
        start_time: now,
        stop_time: now + duration,
    };
    let id = ledger.create_stream(FUNDER, params).await.unwrap();
    ledger.initialise_stream(config.auction_owner, id).await.unwrap();
    id
}

fn start_keeper(keeper: Arc<Keeper>) -> JoinHandle<Result<()>> {
    spawn(async move { keeper.run().await })
}

async fn wait_for(events: &mut EventSubscriber, pred: fn(&TrellisEvent) -> bool) -> TrellisEvent {
    let recv = async {
        loop {
            let info = events.recv().await.unwrap();
            if pred(&info.event) {
                return info.event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), recv).await.unwrap()
}

#[tokio::test]
async fn test_stream_funded_keeper() {
    init_logger();
    let ledger = setup_ledger(ledger_config());
    let (_dir, db) = setup_db();
    let mut generator = EventGenerator::new(1);

    let stream_id = fund_auction(&ledger, 1, 3600).await;
    assert_eq!(ledger.auction_state().await, AuctionState::Funded { stream_id });
    ledger.advance_time(1800).await;
    register(&ledger, &mut generator, EventKind::Deposit, BATCH).await;

    let token = CancellationToken::new();
    let keeper = create_keeper(&keeper_config(ALICE), ledger.clone(), db.clone(), token.clone())
        .unwrap();
    let keeper = Arc::new(keeper);
    let mut events = keeper.event_channel().subscribe();
    let handle = start_keeper(keeper.clone());

    let update = wait_for(&mut events, |e| matches!(e, TrellisEvent::RootsUpdated { .. })).await;
    info!("keeper submitted: {:?}", update);
    token.cancel();
    handle.await.unwrap().unwrap();

    // the whole backlog was cleared, so everything streamed so far is paid out
    assert!(matches!(
        update,
        TrellisEvent::RootsUpdated {
            deposits: 4,
            withdrawals: 0,
            ..
        }
    ));
    let reward = U256::from(1800);
    assert_eq!(ledger.token_balance(ALICE).await, reward);
    let config = ledger.config().clone();
    assert_eq!(ledger.balance_of(stream_id, config.auction).await.unwrap(), U256::ZERO);
    assert_eq!(ledger.token_balance(config.auction).await, U256::ZERO);
    assert_eq!(ledger.pending_leaves().await, 0);

    let record = db.get_latest_submission().unwrap();
    assert_eq!(record.outcome, SubmissionOutcome::Accepted { reward });
    assert_eq!(record.deposit.as_ref().map(|b| b.size), Some(BATCH as u64));
    assert!(record.withdrawal.is_none());
    assert_eq!(db.event_count(EventKind::Deposit).unwrap(), BATCH as u64);
}

#[tokio::test]
async fn test_keeper_resumes_from_storage() {
    init_logger();
    let ledger = setup_ledger(ledger_config());
    let (_dir, db) = setup_db();
    let mut generator = EventGenerator::new(2);
    ledger.mint(ledger.config().auction, U256::from(1000)).await;

    register(&ledger, &mut generator, EventKind::Deposit, BATCH).await;
    let config = keeper_config(ALICE);
    let first =
        create_keeper(&config, ledger.clone(), db.clone(), CancellationToken::new()).unwrap();
    let height = ledger.mine().await;
    assert!(first.process_height(height).await.unwrap().is_some());
    drop(first);

    // a fresh keeper on the same storage continues the submission log
    register(&ledger, &mut generator, EventKind::Withdrawal, BATCH).await;
    let second =
        create_keeper(&config, ledger.clone(), db.clone(), CancellationToken::new()).unwrap();
    let height = ledger.mine().await;
    let record = second.process_height(height).await.unwrap().unwrap();

    assert_eq!(record.id, 1);
    assert!(record.deposit.is_none());
    assert_eq!(record.withdrawal.as_ref().map(|b| b.first_index), Some(0));
    assert_eq!(db.get_last_synced_height().unwrap(), height);
    assert_eq!(db.event_count(EventKind::Deposit).unwrap(), BATCH as u64);
    assert_eq!(db.event_count(EventKind::Withdrawal).unwrap(), BATCH as u64);
}

#[tokio::test]
async fn test_two_keepers_race() {
    init_logger();
    let ledger = setup_ledger(ledger_config());
    let mut generator = EventGenerator::new(3);
    ledger.mint(ledger.config().auction, U256::from(800)).await;
    register(&ledger, &mut generator, EventKind::Deposit, 2 * BATCH).await;

    // both plan against the empty tree, the faster prover lands first
    let fast = racing_keeper(ledger.clone(), ALICE, Duration::from_millis(50));
    let slow = racing_keeper(ledger.clone(), BOB, Duration::from_millis(500));
    let mut slow_events = slow.event_channel().subscribe();
    let height = ledger.mine().await;
    let (won, rebuilt) = tokio::join!(fast.process_height(height), slow.process_height(height));

    let won = won.unwrap().unwrap();
    assert_eq!(won.deposit.as_ref().map(|b| b.first_index), Some(0));
    let rebuilt = rebuilt.unwrap().unwrap();
    assert_eq!(rebuilt.id, 1);
    assert_eq!(rebuilt.deposit.as_ref().map(|b| b.first_index), Some(BATCH as u64));

    let lost = slow.db().get_submission(&0).unwrap();
    assert_eq!(lost.outcome, SubmissionOutcome::LostRace);
    assert_eq!(lost.deposit.as_ref().map(|b| b.first_index), Some(0));
    wait_for(&mut slow_events, |e| matches!(e, TrellisEvent::LostRace { .. })).await;

    // half the backlog each time, half the balance each time
    assert_eq!(won.outcome, SubmissionOutcome::Accepted { reward: U256::from(400) });
    assert_eq!(rebuilt.outcome, SubmissionOutcome::Accepted { reward: U256::from(400) });
    assert_eq!(ledger.token_balance(ALICE).await, U256::from(400));
    assert_eq!(ledger.token_balance(BOB).await, U256::from(400));
    assert_eq!(ledger.pending_leaves().await, 0);
}

#[tokio::test]
async fn test_stream_adjustment_moves_reward_source() {
    init_logger();
    let ledger = setup_ledger(ledger_config());
    let config = ledger.config().clone();
    let mut generator = EventGenerator::new(4);
    let mut ledger_events = ledger.event_channel().subscribe();

    let old_id = fund_auction(&ledger, 1, 3600).await;
    ledger.advance_time(1000).await;

    // 1000 accrued is paid out, the remaining schedule shrinks to 3000s
    let now = ledger.timestamp().await;
    let outcome = ledger
        .adjust_end_time_and_deposit(FUNDER, old_id, now + 3000, U256::from(3000))
        .await
        .unwrap();
    assert_eq!(outcome.paid, U256::from(1000));
    assert_eq!(outcome.pulled, U256::from(400));
    assert_eq!(ledger.merkle_stream_id().await, Some(outcome.successor));
    let adjusted = wait_for(&mut ledger_events, |e| {
        matches!(e, TrellisEvent::StreamAdjusted { .. })
    })
    .await;
    assert!(matches!(
        adjusted,
        TrellisEvent::StreamAdjusted { previous, current }
            if previous == old_id && current == outcome.successor
    ));

    let err = ledger.initialise_stream(config.auction_owner, old_id).await.unwrap_err();
    assert!(matches!(err, TrellisError::StreamState(StreamStateError::Finalized { .. })));

    ledger.advance_time(500).await;
    register(&ledger, &mut generator, EventKind::Deposit, BATCH).await;
    let keeper = create_keeper(
        &keeper_config(ALICE),
        ledger.clone(),
        Arc::new(Box::new(InMemoryDatabase::new())),
        CancellationToken::new(),
    )
    .unwrap();
    let height = ledger.mine().await;
    let record = keeper.process_height(height).await.unwrap().unwrap();

    // the auction's own 1000 plus 500 streamed by the successor
    let reward = U256::from(1500);
    assert_eq!(record.outcome, SubmissionOutcome::Accepted { reward });
    assert_eq!(ledger.token_balance(ALICE).await, reward);
    assert_eq!(ledger.token_balance(config.auction).await, U256::ZERO);
    assert_eq!(ledger.balance_of(old_id, config.auction).await.unwrap(), U256::ZERO);
}

#[tokio::test]
async fn test_keeper_follows_produced_blocks() {
    init_logger();
    let config = LedgerConfig {
        block_time_secs: 1,
        ..ledger_config()
    };
    let ledger = setup_ledger(config);
    let (_dir, db) = setup_db();
    let mut generator = EventGenerator::new(5);
    let stream_id = fund_auction(&ledger, 10, 3600).await;
    // something has streamed by the time the first update lands
    ledger.mine().await;

    let token = CancellationToken::new();
    let keeper = create_keeper(&keeper_config(ALICE), ledger.clone(), db.clone(), token.clone())
        .unwrap();
    let keeper = Arc::new(keeper);
    let mut events = keeper.event_channel().subscribe();
    let handle = start_keeper(keeper.clone());
    wait_for(&mut events, |e| matches!(e, TrellisEvent::Ready)).await;
    ledger.start().unwrap();

    register(&ledger, &mut generator, EventKind::Deposit, BATCH).await;
    register(&ledger, &mut generator, EventKind::Withdrawal, BATCH).await;

    let (mut deposits, mut withdrawals) = (0, 0);
    while deposits < BATCH as u64 || withdrawals < BATCH as u64 {
        let update =
            wait_for(&mut events, |e| matches!(e, TrellisEvent::RootsUpdated { .. })).await;
        if let TrellisEvent::RootsUpdated {
            deposits: d,
            withdrawals: w,
            ..
        } = update
        {
            deposits += d;
            withdrawals += w;
        }
    }

    token.cancel();
    handle.await.unwrap().unwrap();
    ledger.stop().await.unwrap();

    assert_eq!(ledger.pending_leaves().await, 0);
    for kind in EventKind::ALL {
        let view = ledger.accumulator(kind).await.unwrap();
        assert_eq!(view.last_processed, BATCH as u64);
    }
    assert!(ledger.token_balance(ALICE).await > U256::ZERO);
    assert_eq!(ledger.auction_state().await, AuctionState::Funded { stream_id });
    assert!(db.get_latest_submission().is_ok());
}
