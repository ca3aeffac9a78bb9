use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::info;
use trellis_errors::StreamStateError;

use crate::{balances::TokenBalances, stream::AdjustOutcome, stream::StreamRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuctionState {
    /// No stream, or the tracked stream has nothing left to pay out.
    Idle,
    Funded { stream_id: u64 },
}

/// Pays keepers for advancing the accumulators. Rewards come from the
/// auction's share of a token stream plus whatever it already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionController {
    address: Address,
    owner: Address,
    token: Address,
    stream_id: Option<u64>,
}

impl AuctionController {
    pub const fn new(address: Address, owner: Address, token: Address) -> Self {
        Self {
            address,
            owner,
            token,
            stream_id: None,
        }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn owner(&self) -> Address {
        self.owner
    }

    pub const fn token(&self) -> Address {
        self.token
    }

    pub const fn merkle_stream_id(&self) -> Option<u64> {
        self.stream_id
    }

    pub fn state(&self, streams: &StreamRegistry) -> AuctionState {
        match self.stream_id {
            Some(id) if streams.get_stream(id).is_ok_and(|s| s.is_active()) => {
                AuctionState::Funded { stream_id: id }
            }
            _ => AuctionState::Idle,
        }
    }

    /// Points the auction at stream `id`. Only the owner may do this, the
    /// stream must pay the auction, and it may not be older than the current
    /// one.
    pub fn initialise_stream(
        &mut self,
        caller: Address,
        id: u64,
        streams: &StreamRegistry,
    ) -> Result<(), StreamStateError> {
        if caller != self.owner {
            return Err(StreamStateError::Unauthorized {
                caller: caller.to_string(),
                action: "initialise the auction stream".into(),
            });
        }
        let stream = streams.get_stream(id)?;
        if stream.recipient != self.address || stream.token != self.token {
            return Err(StreamStateError::WrongRecipient(id));
        }
        if stream.is_finalized() {
            return Err(StreamStateError::Finalized {
                id,
                successor: stream.successor,
            });
        }
        match self.stream_id {
            Some(current) if id < current => {
                return Err(StreamStateError::NotNewer {
                    current,
                    submitted: id,
                });
            }
            Some(current) if id == current => return Ok(()),
            _ => {}
        }

        info!("auction now funded by stream {}", id);
        self.stream_id = Some(id);
        Ok(())
    }

    /// Moves the pointer along when the tracked stream is replaced. Returns
    /// whether it moved.
    pub fn follow_adjustment(&mut self, outcome: &AdjustOutcome) -> bool {
        if self.stream_id != Some(outcome.previous) {
            return false;
        }
        self.stream_id = Some(outcome.successor);
        true
    }

    /// Streamed-but-unclaimed tokens plus the auction's own balance.
    pub fn available_balance(
        &self,
        streams: &StreamRegistry,
        balances: &TokenBalances,
        now: u64,
    ) -> U256 {
        let streamed = self
            .stream_id
            .and_then(|id| streams.balance_of(id, self.address, now).ok())
            .unwrap_or_default();
        streamed + balances.balance_of(self.token, self.address)
    }
}

/// Share of `available` earned by processing `deposits` and `withdrawals`
/// leaves out of a backlog of `pending_deposits` and `pending_withdrawals`.
///
/// The share is linear in the number of backlog leaves covered, so clearing
/// the whole backlog earns everything and clearing half of each earns half.
/// Leaves beyond the backlog earn nothing extra. An empty backlog pays zero.
pub fn reward_share(
    deposits: u64,
    withdrawals: u64,
    pending_deposits: u64,
    pending_withdrawals: u64,
    available: U256,
) -> U256 {
    let backlog = u128::from(pending_deposits) + u128::from(pending_withdrawals);
    if backlog == 0 {
        return U256::ZERO;
    }
    let covered = u128::from(deposits.min(pending_deposits))
        + u128::from(withdrawals.min(pending_withdrawals));

    let (covered, backlog) = (U256::from(covered), U256::from(backlog));
    match available.checked_mul(covered) {
        Some(scaled) => scaled / backlog,
        None => available / backlog * covered,
    }
}
