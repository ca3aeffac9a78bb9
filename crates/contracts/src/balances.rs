use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use trellis_errors::BalanceError;

/// Token balances keyed by `(token, holder)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenBalances {
    balances: HashMap<(Address, Address), U256>,
}

impl TokenBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    pub fn mint(&mut self, token: Address, holder: Address, amount: U256) {
        let balance = self.balances.entry((token, holder)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), BalanceError> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(BalanceError {
                holder: from.to_string(),
                needed: amount.to_string(),
                available: available.to_string(),
            });
        }
        self.balances.insert((token, from), available - amount);
        self.mint(token, to, amount);
        Ok(())
    }
}
