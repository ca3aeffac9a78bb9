//! Continuous token streams. A stream escrows its deposit in the registry and
//! releases `rate_per_second` to the recipient for every second between its
//! start and stop time.
//!
//! Streams are never edited in place. Changing the schedule or the deposit
//! pays out what the recipient has accrued, finalizes the stream and opens a
//! successor with a fresh id.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use trellis_errors::{StreamStateError, TrellisError};

use crate::balances::TokenBalances;

pub const FIRST_STREAM_ID: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: u64,
    pub sender: Address,
    pub recipient: Address,
    pub token: Address,
    pub deposit: U256,
    pub rate_per_second: U256,
    /// Escrowed tokens not yet withdrawn by the recipient.
    pub remaining_balance: U256,
    pub start_time: u64,
    pub stop_time: u64,
    /// Set once the stream was replaced by an adjustment.
    pub successor: Option<u64>,
}

impl Stream {
    /// Seconds of the schedule that have elapsed at `now`.
    pub const fn delta_of(&self, now: u64) -> u64 {
        if now <= self.start_time {
            0
        } else if now < self.stop_time {
            now - self.start_time
        } else {
            self.stop_time - self.start_time
        }
    }

    pub fn withdrawn(&self) -> U256 {
        self.deposit.saturating_sub(self.remaining_balance)
    }

    pub fn recipient_balance(&self, now: u64) -> U256 {
        if self.is_finalized() {
            return U256::ZERO;
        }
        let streamed = self.rate_per_second * U256::from(self.delta_of(now));
        streamed.saturating_sub(self.withdrawn())
    }

    pub fn sender_balance(&self, now: u64) -> U256 {
        self.remaining_balance.saturating_sub(self.recipient_balance(now))
    }

    pub fn balance_of(&self, who: Address, now: u64) -> U256 {
        if who == self.recipient {
            self.recipient_balance(now)
        } else if who == self.sender {
            self.sender_balance(now)
        } else {
            U256::ZERO
        }
    }

    pub const fn is_finalized(&self) -> bool {
        self.successor.is_some()
    }

    /// Whether the stream still holds anything for its recipient.
    pub fn is_active(&self) -> bool {
        !self.is_finalized() && !self.remaining_balance.is_zero()
    }
}

/// Parameters of a new stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStream {
    pub recipient: Address,
    pub deposit: U256,
    pub token: Address,
    pub start_time: u64,
    pub stop_time: u64,
}

/// What an adjustment changes. Unset fields keep their current value, except
/// the deposit which defaults to whatever the sender still has in escrow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Adjustment {
    pub stop_time: Option<u64>,
    pub deposit: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustOutcome {
    pub previous: u64,
    pub successor: u64,
    /// Accrued balance paid to the recipient when the old stream closed.
    pub paid: U256,
    /// Returned to the sender.
    pub refund: U256,
    /// Additionally taken from the sender.
    pub pulled: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRegistry {
    address: Address,
    next_id: u64,
    streams: BTreeMap<u64, Stream>,
}

impl StreamRegistry {
    /// `address` is where escrowed deposits are held.
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            next_id: FIRST_STREAM_ID,
            streams: BTreeMap::new(),
        }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn next_stream_id(&self) -> u64 {
        self.next_id
    }

    pub fn get_stream(&self, id: u64) -> Result<&Stream, StreamStateError> {
        self.streams.get(&id).ok_or(StreamStateError::NotFound(id))
    }

    pub fn balance_of(&self, id: u64, who: Address, now: u64) -> Result<U256, StreamStateError> {
        Ok(self.get_stream(id)?.balance_of(who, now))
    }

    fn active(&self, id: u64) -> Result<&Stream, StreamStateError> {
        let stream = self.get_stream(id)?;
        if stream.is_finalized() {
            return Err(StreamStateError::Finalized {
                id,
                successor: stream.successor,
            });
        }
        Ok(stream)
    }

    /// Opens a stream funded by `sender`. Only the part of the deposit that
    /// divides evenly by the duration is taken.
    pub fn create_stream(
        &mut self,
        balances: &mut TokenBalances,
        sender: Address,
        params: NewStream,
        now: u64,
    ) -> Result<u64, TrellisError> {
        if params.recipient == Address::ZERO || params.recipient == self.address {
            return Err(StreamStateError::InvalidSchedule(format!(
                "cannot stream to {}",
                params.recipient
            ))
            .into());
        }
        if params.recipient == sender {
            return Err(
                StreamStateError::InvalidSchedule("cannot stream to the sender".into()).into(),
            );
        }
        if params.start_time < now {
            return Err(StreamStateError::InvalidSchedule(format!(
                "start time {} is before now ({})",
                params.start_time, now
            ))
            .into());
        }
        if params.stop_time <= params.start_time {
            return Err(StreamStateError::InvalidSchedule(format!(
                "stop time {} is not after start time {}",
                params.stop_time, params.start_time
            ))
            .into());
        }

        let duration = params.stop_time - params.start_time;
        let deposit = divisible_part(params.deposit, duration)?;
        balances.transfer(params.token, sender, self.address, deposit)?;

        let id = self.insert(Stream {
            id: 0,
            sender,
            recipient: params.recipient,
            token: params.token,
            deposit,
            rate_per_second: deposit / U256::from(duration),
            remaining_balance: deposit,
            start_time: params.start_time,
            stop_time: params.stop_time,
            successor: None,
        });
        debug!(
            "created stream {} from {} to {}: {} over {}s",
            id, sender, params.recipient, deposit, duration
        );
        Ok(id)
    }

    /// Moves `amount` of the accrued balance to the recipient. Either party may
    /// trigger it; the funds always go to the recipient.
    pub fn withdraw_from_stream(
        &mut self,
        balances: &mut TokenBalances,
        caller: Address,
        id: u64,
        amount: U256,
        now: u64,
    ) -> Result<(), TrellisError> {
        let stream = self.active(id)?;
        if caller != stream.recipient && caller != stream.sender {
            return Err(StreamStateError::Unauthorized {
                caller: caller.to_string(),
                action: format!("withdraw from stream {id}"),
            }
            .into());
        }
        let available = stream.recipient_balance(now);
        if amount.is_zero() || amount > available {
            return Err(StreamStateError::AmountExceedsBalance {
                amount: amount.to_string(),
                available: available.to_string(),
            }
            .into());
        }

        let (token, recipient) = (stream.token, stream.recipient);
        balances.transfer(token, self.address, recipient, amount)?;
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.remaining_balance -= amount;
        }
        Ok(())
    }

    /// Closes stream `id` and opens its successor. The successor runs from
    /// `max(now, start)` to the new stop time and carries the largest amount
    /// not above the target deposit that divides by its duration. The sender
    /// is refunded or charged the difference to what it still had in escrow.
    pub fn adjust(
        &mut self,
        balances: &mut TokenBalances,
        caller: Address,
        id: u64,
        adjustment: Adjustment,
        now: u64,
    ) -> Result<AdjustOutcome, TrellisError> {
        let stream = self.active(id)?.clone();
        if caller != stream.sender {
            return Err(StreamStateError::Unauthorized {
                caller: caller.to_string(),
                action: format!("adjust stream {id}"),
            }
            .into());
        }

        let paid = stream.recipient_balance(now);
        let residual = stream.remaining_balance - paid;

        let start_time = now.max(stream.start_time);
        let stop_time = adjustment.stop_time.unwrap_or(stream.stop_time);
        if stop_time <= start_time {
            return Err(StreamStateError::InvalidSchedule(format!(
                "stop time {stop_time} is not after {start_time}"
            ))
            .into());
        }
        let duration = stop_time - start_time;
        let deposit = divisible_part(adjustment.deposit.unwrap_or(residual), duration)?;

        let (refund, pulled) = if residual >= deposit {
            (residual - deposit, U256::ZERO)
        } else {
            (U256::ZERO, deposit - residual)
        };

        // the only transfer that can fail goes first
        balances.transfer(stream.token, stream.sender, self.address, pulled)?;
        balances.transfer(stream.token, self.address, stream.recipient, paid)?;
        balances.transfer(stream.token, self.address, stream.sender, refund)?;

        let successor = self.insert(Stream {
            id: 0,
            sender: stream.sender,
            recipient: stream.recipient,
            token: stream.token,
            deposit,
            rate_per_second: deposit / U256::from(duration),
            remaining_balance: deposit,
            start_time,
            stop_time,
            successor: None,
        });
        if let Some(previous) = self.streams.get_mut(&id) {
            previous.remaining_balance = U256::ZERO;
            previous.successor = Some(successor);
        }

        debug!(
            "adjusted stream {} -> {}: paid {}, refunded {}, pulled {}",
            id, successor, paid, refund, pulled
        );
        Ok(AdjustOutcome {
            previous: id,
            successor,
            paid,
            refund,
            pulled,
        })
    }

    fn insert(&mut self, mut stream: Stream) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        stream.id = id;
        self.streams.insert(id, stream);
        id
    }
}

fn divisible_part(amount: U256, duration: u64) -> Result<U256, StreamStateError> {
    let usable = amount - amount % U256::from(duration);
    if usable.is_zero() {
        return Err(StreamStateError::DepositTooSmall {
            deposit: amount.to_string(),
            duration,
        });
    }
    Ok(usable)
}
