use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use trellis_common::{
    digest::Digest,
    event::{EventKind, LeafEvent},
};
use trellis_contracts::RootsUpdate;
use trellis_errors::TrellisError;

pub mod config;
pub mod memory;

pub use config::LedgerConfig;
pub use memory::InMemoryLedger;


/// Confirmed state of one accumulator as the ledger reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorView {
    pub kind: EventKind,
    pub root: Digest,
    pub last_processed: u64,
    pub batch_size: usize,
}

/// Ordered, append-only deposit and withdrawal log.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events of `kind` with index `from` or higher, in index order.
    async fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>, TrellisError>;
}

/// Everything a keeper reads from and submits to the ledger.
#[automock]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn subscribe_to_heights(&self) -> broadcast::Receiver<u64>;
    async fn get_latest_height(&self) -> Result<u64, TrellisError>;
    async fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>, TrellisError>;
    async fn accumulator(&self, kind: EventKind) -> Result<AccumulatorView, TrellisError>;
    async fn leaves_until_sync(&self, kind: EventKind) -> Result<u64, TrellisError>;
    async fn reward(&self, deposits: u64, withdrawals: u64) -> Result<U256, TrellisError>;
    async fn update_roots(
        &self,
        caller: Address,
        deposit_call: Option<Vec<u8>>,
        withdrawal_call: Option<Vec<u8>>,
    ) -> Result<RootsUpdate, TrellisError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> EventSource for T {
    async fn get_events(&self, kind: EventKind, from: u64) -> Result<Vec<LeafEvent>, TrellisError> {
        LedgerClient::get_events(self, kind, from).await
    }
}
