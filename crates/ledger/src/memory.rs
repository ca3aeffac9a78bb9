use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::{
    sync::{RwLock, broadcast},
    task::JoinHandle,
    time::interval,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_common::{
    digest::Digest,
    event::{EventKind, LeafEvent},
};
use trellis_contracts::{
    AdjustOutcome, AuctionState, Contracts, NewStream, ProofVerifier, RootsUpdate, Stream,
};
use trellis_errors::{GeneralError, TrellisError};
use trellis_events::{EventChannel, TrellisEvent};

use crate::{AccumulatorView, LedgerClient, LedgerConfig};

/// Single-process ledger. Every entrypoint runs under the write lock against
/// the contract set, so transitions are atomic and strictly ordered. Blocks
/// are produced on a timer once started, or by hand with [`Self::mine`].
#[derive(Clone)]
pub struct InMemoryLedger {
    contracts: Arc<RwLock<Contracts>>,
    height_update_tx: broadcast::Sender<u64>,
    config: LedgerConfig,
    event_channel: Arc<EventChannel>,

    /// Handle to the block production task
    produce_blocks_handle: Arc<Mutex<Option<JoinHandle<()>>>>,

    /// Cancellation token for graceful shutdown
    cancellation_token: CancellationToken,
}

impl InMemoryLedger {
    pub fn new(
        config: LedgerConfig,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<(Self, broadcast::Receiver<u64>), TrellisError> {
        let mut contracts = Contracts::new(&config.contracts(), verifier)?;
        contracts.set_clock(config.genesis_timestamp, 0);

        let (height_tx, height_rx) = broadcast::channel(100);
        Ok((
            Self {
                contracts: Arc::new(RwLock::new(contracts)),
                height_update_tx: height_tx,
                config,
                event_channel: Arc::new(EventChannel::new()),
                produce_blocks_handle: Arc::new(Mutex::new(None)),
                cancellation_token: CancellationToken::new(),
            },
            height_rx,
        ))
    }

    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn event_channel(&self) -> Arc<EventChannel> {
        self.event_channel.clone()
    }

    /// Closes the current block and advances the clock by one block time.
    pub async fn mine(&self) -> u64 {
        let mut contracts = self.contracts.write().await;
        close_block(&mut contracts, self.config.block_time_secs, &self.height_update_tx)
    }

    /// Moves the clock forward without producing a block.
    pub async fn advance_time(&self, seconds: u64) {
        let mut contracts = self.contracts.write().await;
        let (now, block) = (contracts.timestamp(), contracts.block_number());
        contracts.set_clock(now + seconds, block);
    }

    pub async fn timestamp(&self) -> u64 {
        self.contracts.read().await.timestamp()
    }

    fn produce_blocks(&self) -> JoinHandle<()> {
        let contracts = self.contracts.clone();
        let height_update_tx = self.height_update_tx.clone();
        let block_time_secs = self.config.block_time_secs;
        let cancellation_token = self.cancellation_token.clone();
        let block_time = self.config.block_time();

        tokio::spawn(async move {
            let mut interval = interval(block_time);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        debug!("in-memory ledger block production cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let mut contracts = contracts.write().await;
                        close_block(&mut contracts, block_time_secs, &height_update_tx);
                    }
                }
            }
        })
    }

    pub fn start(&self) -> Result<(), TrellisError> {
        let mut handle_lock = self
            .produce_blocks_handle
            .lock()
            .map_err(|e| GeneralError::LockError(format!("block producer: {}", e)))?;

        // Check if already started
        if handle_lock.is_some() {
            return Ok(());
        }

        *handle_lock = Some(self.produce_blocks());
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), TrellisError> {
        self.cancellation_token.cancel();
        let Some(handle) = self
            .produce_blocks_handle
            .lock()
            .map_err(|e| GeneralError::LockError(format!("block producer: {}", e)))?
            .take()
        else {
            return Ok(());
        };

        handle.await.map_err(|e| GeneralError::InitializationError(e.to_string()))?;
        Ok(())
    }

    // event log

    pub async fn register_deposit(&self, instance: Address, commitment: Digest) -> LeafEvent {
        self.contracts.write().await.register_deposit(instance, commitment)
    }

    pub async fn register_withdrawal(
        &self,
        instance: Address,
        nullifier_hash: Digest,
    ) -> LeafEvent {
        self.contracts.write().await.register_withdrawal(instance, nullifier_hash)
    }

    // token and auction

    pub async fn mint(&self, holder: Address, amount: U256) {
        self.contracts.write().await.mint(holder, amount);
    }

    pub async fn token_balance(&self, holder: Address) -> U256 {
        self.contracts.read().await.token_balance(holder)
    }

    pub async fn pending_leaves(&self) -> u64 {
        self.contracts.read().await.pending_leaves()
    }

    pub async fn auction_state(&self) -> AuctionState {
        self.contracts.read().await.auction_state()
    }

    pub async fn merkle_stream_id(&self) -> Option<u64> {
        self.contracts.read().await.merkle_stream_id()
    }

    pub async fn initialise_stream(&self, caller: Address, id: u64) -> Result<(), TrellisError> {
        self.contracts.write().await.initialise_stream(caller, id)
    }

    // streams

    pub async fn create_stream(
        &self,
        sender: Address,
        params: NewStream,
    ) -> Result<u64, TrellisError> {
        self.contracts.write().await.create_stream(sender, params)
    }

    pub async fn get_stream(&self, id: u64) -> Result<Stream, TrellisError> {
        Ok(self.contracts.read().await.get_stream(id)?.clone())
    }

    pub async fn balance_of(&self, id: u64, who: Address) -> Result<U256, TrellisError> {
        Ok(self.contracts.read().await.balance_of(id, who)?)
    }

    pub async fn withdraw_from_stream(
        &self,
        caller: Address,
        id: u64,
        amount: U256,
    ) -> Result<(), TrellisError> {
        self.contracts.write().await.withdraw_from_stream(caller, id, amount)
    }

    pub async fn adjust_end_time(
        &self,
        caller: Address,
        id: u64,
        stop_time: u64,
    ) -> Result<AdjustOutcome, TrellisError> {
        self.adjust(|contracts| contracts.adjust_end_time(caller, id, stop_time)).await
    }

    pub async fn adjust_deposit(
        &self,
        caller: Address,
        id: u64,
        deposit: U256,
    ) -> Result<AdjustOutcome, TrellisError> {
        self.adjust(|contracts| contracts.adjust_deposit(caller, id, deposit)).await
    }

    pub async fn adjust_end_time_and_deposit(
        &self,
        caller: Address,
        id: u64,
        stop_time: u64,
        deposit: U256,
    ) -> Result<AdjustOutcome, TrellisError> {
        self.adjust(|contracts| {
            contracts.adjust_end_time_and_deposit(caller, id, stop_time, deposit)
        })
        .await
    }

    /// Runs an adjustment and announces it if the auction now follows the
    /// successor. Streams the auction does not track are replaced silently.
    async fn adjust(
        &self,
        f: impl FnOnce(&mut Contracts) -> Result<AdjustOutcome, TrellisError>,
    ) -> Result<AdjustOutcome, TrellisError> {
        let mut contracts = self.contracts.write().await;
        let outcome = f(&mut contracts)?;
        if contracts.merkle_stream_id() == Some(outcome.successor) {
            self.event_channel.publisher().send(TrellisEvent::StreamAdjusted {
                previous: outcome.previous,
                current: outcome.successor,
            });
        }
        Ok(outcome)
    }
}

fn close_block(
    contracts: &mut Contracts,
    block_time_secs: u64,
    height_update_tx: &broadcast::Sender<u64>,
) -> u64 {
    let height = contracts.block_number() + 1;
    let timestamp = contracts.timestamp() + block_time_secs;
    contracts.set_clock(timestamp, height);
    debug!(
        "block {} closed at {} with {} leaves pending",
        height,
        timestamp,
        contracts.pending_leaves()
    );

    // Notify subscribers of the new height
    let _ = height_update_tx.send(u64::from(height));
    u64::from(height)
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn subscribe_to_heights(&self) -> broadcast::Receiver<u64> {
        self.height_update_tx.subscribe()
    }

    async fn get_latest_height(&self) -> Result<u64, TrellisError> {
        Ok(u64::from(self.contracts.read().await.block_number()))
    }

    async fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>, TrellisError> {
        Ok(self.contracts.read().await.get_events(kind, from))
    }

    async fn accumulator(&self, kind: EventKind) -> Result<AccumulatorView, TrellisError> {
        let contracts = self.contracts.read().await;
        Ok(AccumulatorView {
            kind,
            root: contracts.accumulators.current_root(kind),
            last_processed: contracts.accumulators.last_processed(kind),
            batch_size: contracts.accumulators.batch_size(),
        })
    }

    async fn leaves_until_sync(&self, kind: EventKind) -> Result<u64, TrellisError> {
        let contracts = self.contracts.read().await;
        Ok(match kind {
            EventKind::Deposit => contracts.leaves_until_deposit_sync(),
            EventKind::Withdrawal => contracts.leaves_until_withdrawal_sync(),
        })
    }

    async fn reward(&self, deposits: u64, withdrawals: u64) -> Result<U256, TrellisError> {
        Ok(self.contracts.read().await.reward(deposits, withdrawals))
    }

    async fn update_roots(
        &self,
        caller: Address,
        deposit_call: Option<Vec<u8>>,
        withdrawal_call: Option<Vec<u8>>,
    ) -> Result<RootsUpdate, TrellisError> {
        let update = self.contracts.write().await.update_roots(
            caller,
            deposit_call.as_deref(),
            withdrawal_call.as_deref(),
        )?;
        info!(
            "accepted update from {}: {} deposits, {} withdrawals",
            caller, update.deposits, update.withdrawals
        );
        self.event_channel.publisher().send(TrellisEvent::RootsUpdated {
            deposits: update.deposits,
            withdrawals: update.withdrawals,
            reward: update.reward,
        });
        Ok(update)
    }
}
