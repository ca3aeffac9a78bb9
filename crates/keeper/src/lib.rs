//! # Trellis Keeper
//!
//! The off-chain side of the deposit and withdrawal accumulators. A keeper
//! mirrors the ledger's event logs into local storage, assembles batch
//! updates against the confirmed roots, proves them and submits both trees
//! in one `update_roots` call to collect the auction reward.
//!
//! ## Running a keeper
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis_keeper::{create_keeper, load_settings};
//! use trellis_ledger::{InMemoryLedger, LedgerConfig};
//! use trellis_storage::create_storage;
//! use tokio_util::sync::CancellationToken;
//! # use trellis_contracts::ProofVerifier;
//!
//! # async fn run(verifier: Arc<dyn ProofVerifier>) -> anyhow::Result<()> {
//! let config = load_settings(Some("~/.trellis/config.toml"))?;
//! let db = create_storage(&config.db)?;
//! let (ledger, _heights) = InMemoryLedger::new(LedgerConfig::default(), verifier)?;
//! ledger.start()?;
//!
//! let cancellation_token = CancellationToken::new();
//! let keeper = create_keeper(&config, Arc::new(ledger), db, cancellation_token.clone())?;
//! keeper.run().await
//! # }
//! ```

mod factory;
mod keeper;
pub mod prover_engine;
mod settings;
mod syncer;

pub use factory::*;
pub use keeper::{Keeper, KeeperOptions};
pub use settings::load_settings;
pub use syncer::Syncer;

#[macro_use]
extern crate tracing;

#[cfg(test)]
mod tests;
