use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use trellis_common::{
    calldata::{self, BatchCall},
    digest::Digest,
    event::{EventKind, LeafEvent, LeafRecord},
};
use trellis_errors::{StreamStateError, TrellisError, ValidationError};

use crate::{
    accumulator::AccumulatorState,
    auction::{AuctionController, AuctionState, reward_share},
    balances::TokenBalances,
    stream::{AdjustOutcome, Adjustment, NewStream, Stream, StreamRegistry},
    verifier::ProofVerifier,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub batch_size: usize,
    /// Root of a tree holding only zero leaves.
    pub empty_root: Digest,
    pub token: Address,
    pub auction: Address,
    pub auction_owner: Address,
    pub stream_registry: Address,
}

/// Result of a successful `update_roots` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootsUpdate {
    pub deposits: u64,
    pub withdrawals: u64,
    pub reward: U256,
}

/// Every contract the keeper talks to, sharing one clock and one token
/// ledger. Each mutating entrypoint is a single transition: it either
/// completes or leaves the whole set unchanged.
#[derive(Debug, Clone)]
pub struct Contracts {
    pub accumulators: AccumulatorState,
    pub streams: StreamRegistry,
    pub balances: TokenBalances,
    pub auction: AuctionController,
    timestamp: u64,
    block: u32,
}

impl Contracts {
    pub fn new(
        config: &ContractsConfig,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            accumulators: AccumulatorState::new(config.empty_root, config.batch_size, verifier)?,
            streams: StreamRegistry::new(config.stream_registry),
            balances: TokenBalances::new(),
            auction: AuctionController::new(config.auction, config.auction_owner, config.token),
            timestamp: 0,
            block: 0,
        })
    }

    pub const fn set_clock(&mut self, timestamp: u64, block: u32) {
        self.timestamp = timestamp;
        self.block = block;
    }

    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub const fn block_number(&self) -> u32 {
        self.block
    }

    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TrellisError>,
    ) -> Result<T, TrellisError> {
        let mut next = self.clone();
        let out = f(&mut next)?;
        *self = next;
        Ok(out)
    }

    pub fn mint(&mut self, holder: Address, amount: U256) {
        self.balances.mint(self.auction.token(), holder, amount);
    }

    pub fn token_balance(&self, holder: Address) -> U256 {
        self.balances.balance_of(self.auction.token(), holder)
    }

    // event log

    fn register(&mut self, kind: EventKind, instance: Address, payload_hash: Digest) -> LeafEvent {
        let record = LeafRecord::new(instance, payload_hash, self.block);
        let index = self.accumulators.register_event(kind, record);
        LeafEvent {
            kind,
            instance,
            payload_hash,
            block: self.block,
            index,
        }
    }

    pub fn register_deposit(&mut self, instance: Address, commitment: Digest) -> LeafEvent {
        self.register(EventKind::Deposit, instance, commitment)
    }

    pub fn register_withdrawal(&mut self, instance: Address, nullifier_hash: Digest) -> LeafEvent {
        self.register(EventKind::Withdrawal, instance, nullifier_hash)
    }

    /// Registered events of `kind` from index `from` on.
    pub fn get_events(&self, kind: EventKind, from: u64) -> Vec<LeafEvent> {
        self.accumulators
            .registered(kind, from)
            .iter()
            .zip(from..)
            .map(|(record, index)| LeafEvent {
                kind,
                instance: record.instance,
                payload_hash: record.payload_hash,
                block: record.block,
                index,
            })
            .collect()
    }

    // auction

    pub fn path_index(kind: EventKind, calldata: &[u8]) -> Result<u64, ValidationError> {
        let found = calldata::kind_of(calldata)?;
        if found != kind {
            return Err(ValidationError::UnknownSelector(format!(
                "{} calldata where {} was expected",
                found, kind
            )));
        }
        calldata::path_index(calldata)
    }

    pub fn get_deposit_path_index(calldata: &[u8]) -> Result<u64, ValidationError> {
        Self::path_index(EventKind::Deposit, calldata)
    }

    pub fn get_withdrawal_path_index(calldata: &[u8]) -> Result<u64, ValidationError> {
        Self::path_index(EventKind::Withdrawal, calldata)
    }

    pub fn leaves_until_deposit_sync(&self) -> u64 {
        self.accumulators.pending_count(EventKind::Deposit)
    }

    pub fn leaves_until_withdrawal_sync(&self) -> u64 {
        self.accumulators.pending_count(EventKind::Withdrawal)
    }

    pub fn pending_leaves(&self) -> u64 {
        self.leaves_until_deposit_sync() + self.leaves_until_withdrawal_sync()
    }

    pub fn available_reward(&self) -> U256 {
        self.auction.available_balance(&self.streams, &self.balances, self.timestamp)
    }

    /// Tokens paid for processing `deposits` and `withdrawals` leaves now.
    pub fn reward(&self, deposits: u64, withdrawals: u64) -> U256 {
        reward_share(
            deposits,
            withdrawals,
            self.leaves_until_deposit_sync(),
            self.leaves_until_withdrawal_sync(),
            self.available_reward(),
        )
    }

    pub fn auction_state(&self) -> AuctionState {
        self.auction.state(&self.streams)
    }

    pub const fn merkle_stream_id(&self) -> Option<u64> {
        self.auction.merkle_stream_id()
    }

    pub fn initialise_stream(&mut self, caller: Address, id: u64) -> Result<(), TrellisError> {
        self.auction.initialise_stream(caller, id, &self.streams)?;
        Ok(())
    }

    pub fn update_deposit_tree(
        &mut self,
        caller: Address,
        calldata: &[u8],
    ) -> Result<RootsUpdate, TrellisError> {
        self.update_roots(caller, Some(calldata), None)
    }

    pub fn update_withdrawal_tree(
        &mut self,
        caller: Address,
        calldata: &[u8],
    ) -> Result<RootsUpdate, TrellisError> {
        self.update_roots(caller, None, Some(calldata))
    }

    /// Applies up to one batch per tree and pays `caller` for them. The reward
    /// is priced against the backlog as it stood before the update.
    pub fn update_roots(
        &mut self,
        caller: Address,
        deposit_call: Option<&[u8]>,
        withdrawal_call: Option<&[u8]>,
    ) -> Result<RootsUpdate, TrellisError> {
        if deposit_call.is_none() && withdrawal_call.is_none() {
            return Err(ValidationError::EmptyBatch.into());
        }
        self.atomically(|contracts| {
            let deposits = deposit_call
                .map(|call| contracts.apply_call(EventKind::Deposit, call))
                .transpose()?
                .unwrap_or(0);
            let withdrawals = withdrawal_call
                .map(|call| contracts.apply_call(EventKind::Withdrawal, call))
                .transpose()?
                .unwrap_or(0);

            let reward = reward_share(
                deposits,
                withdrawals,
                contracts.leaves_until_deposit_sync() + deposits,
                contracts.leaves_until_withdrawal_sync() + withdrawals,
                contracts.available_reward(),
            );
            contracts.pay(caller, reward)?;

            info!(
                "roots updated by {}: {} deposits, {} withdrawals, reward {}",
                caller, deposits, withdrawals, reward
            );
            Ok(RootsUpdate {
                deposits,
                withdrawals,
                reward,
            })
        })
    }

    fn apply_call(&mut self, kind: EventKind, calldata: &[u8]) -> Result<u64, TrellisError> {
        let leaves = Self::path_index(kind, calldata)?;
        let call = BatchCall::decode(calldata)?;
        let applied = self.accumulators.apply_batch(kind, &call.proof, &call.args)?;
        debug_assert_eq!(applied, leaves);
        Ok(applied)
    }

    /// Pays from the auction's own balance, topping it up from the stream.
    fn pay(&mut self, to: Address, amount: U256) -> Result<(), TrellisError> {
        if amount.is_zero() {
            return Ok(());
        }
        let (token, auction) = (self.auction.token(), self.auction.address());
        if self.balances.balance_of(token, auction) < amount {
            if let Some(id) = self.auction.merkle_stream_id() {
                let streamed = self.streams.balance_of(id, auction, self.timestamp)?;
                if !streamed.is_zero() {
                    self.streams.withdraw_from_stream(
                        &mut self.balances,
                        auction,
                        id,
                        streamed,
                        self.timestamp,
                    )?;
                }
            }
        }
        self.balances.transfer(token, auction, to, amount)?;
        Ok(())
    }

    // streams

    pub fn create_stream(
        &mut self,
        sender: Address,
        params: NewStream,
    ) -> Result<u64, TrellisError> {
        let now = self.timestamp;
        self.atomically(|c| c.streams.create_stream(&mut c.balances, sender, params, now))
    }

    pub fn get_stream(&self, id: u64) -> Result<&Stream, StreamStateError> {
        self.streams.get_stream(id)
    }

    pub fn balance_of(&self, id: u64, who: Address) -> Result<U256, StreamStateError> {
        self.streams.balance_of(id, who, self.timestamp)
    }

    pub fn withdraw_from_stream(
        &mut self,
        caller: Address,
        id: u64,
        amount: U256,
    ) -> Result<(), TrellisError> {
        let now = self.timestamp;
        self.atomically(|c| {
            c.streams.withdraw_from_stream(&mut c.balances, caller, id, amount, now)
        })
    }

    pub fn adjust_end_time(
        &mut self,
        caller: Address,
        id: u64,
        stop_time: u64,
    ) -> Result<AdjustOutcome, TrellisError> {
        self.adjust(
            caller,
            id,
            Adjustment {
                stop_time: Some(stop_time),
                deposit: None,
            },
        )
    }

    pub fn adjust_deposit(
        &mut self,
        caller: Address,
        id: u64,
        deposit: U256,
    ) -> Result<AdjustOutcome, TrellisError> {
        self.adjust(
            caller,
            id,
            Adjustment {
                stop_time: None,
                deposit: Some(deposit),
            },
        )
    }

    pub fn adjust_end_time_and_deposit(
        &mut self,
        caller: Address,
        id: u64,
        stop_time: u64,
        deposit: U256,
    ) -> Result<AdjustOutcome, TrellisError> {
        self.adjust(
            caller,
            id,
            Adjustment {
                stop_time: Some(stop_time),
                deposit: Some(deposit),
            },
        )
    }

    /// Replaces stream `id` and, if the auction was funded by it, points the
    /// auction at the successor in the same transition.
    fn adjust(
        &mut self,
        caller: Address,
        id: u64,
        adjustment: Adjustment,
    ) -> Result<AdjustOutcome, TrellisError> {
        let now = self.timestamp;
        self.atomically(|c| {
            let outcome = c.streams.adjust(&mut c.balances, caller, id, adjustment, now)?;
            if c.auction.follow_adjustment(&outcome) {
                info!("auction stream moved from {} to {}", outcome.previous, outcome.successor);
            }
            Ok(outcome)
        })
    }
}
