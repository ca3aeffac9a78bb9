use alloy_primitives::{Address, U256};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use trellis_ledger::LedgerClient;
use trellis_storage::{Database, DatabaseConfig};
use trellis_tree::{
    BatchAssembler, Sha256FieldHasher, assembler::DEFAULT_BATCH_HEIGHT,
    merkle_tree::DEFAULT_TREE_DEPTH,
};

use crate::{
    keeper::{Keeper, KeeperOptions},
    prover_engine::{ExternalProver, ExternalProverOptions, MockProver, ProofPipeline},
};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_PROVER_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_STALE_RETRIES: u32 = 3;
pub const DEFAULT_PROVER_TIMEOUT_SECS: u64 = 600;

fn trellis_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".trellis")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProverKind {
    /// Proofs derived from the args hash, for development ledgers only.
    #[default]
    Mock,
    /// Native witness generator plus an external Groth16 prover binary.
    External,
}

/// Configuration of the proof backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverEngineConfig {
    pub kind: ProverKind,

    /// Default: ~/.trellis/circuits/BatchTreeUpdate_cpp/BatchTreeUpdate
    pub witness_generator_path: String,

    /// Default: ~/.trellis/bin/prover
    pub prover_path: String,

    /// Circuit artifacts without extension. The proving key is
    /// `<base>.zkey`.
    /// Default: ~/.trellis/circuits/BatchTreeUpdate
    pub circuit_key_base_path: String,

    /// Directory receiving one witness directory per proving attempt.
    /// Default: ~/.trellis/witness
    pub work_dir: String,

    pub timeout_secs: u64,

    /// Keep witness directories after successful proofs as well.
    pub keep_witness: bool,
}

impl Default for ProverEngineConfig {
    fn default() -> Self {
        let base = trellis_dir();
        let path = |rel: &str| base.join(rel).to_string_lossy().into_owned();
        Self {
            kind: ProverKind::default(),
            witness_generator_path: path("circuits/BatchTreeUpdate_cpp/BatchTreeUpdate"),
            prover_path: path("bin/prover"),
            circuit_key_base_path: path("circuits/BatchTreeUpdate"),
            work_dir: path("witness"),
            timeout_secs: DEFAULT_PROVER_TIMEOUT_SECS,
            keep_witness: false,
        }
    }
}

impl ProverEngineConfig {
    pub fn external_options(&self) -> ExternalProverOptions {
        ExternalProverOptions {
            witness_generator: PathBuf::from(&self.witness_generator_path),
            prover: PathBuf::from(&self.prover_path),
            circuit_key: Path::new(&self.circuit_key_base_path).with_extension("zkey"),
            work_dir: PathBuf::from(&self.work_dir),
            timeout: Duration::from_secs(self.timeout_secs),
            keep_witness: self.keep_witness,
        }
    }
}

/// Configuration for trellis keepers.
///
/// A keeper watches the ledger's deposit and withdrawal logs, proves batch
/// updates for both accumulators and submits them to collect the auction
/// reward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Leaves per batch. Must match the deployed accumulator.
    pub batch_size: usize,

    pub tree_depth: usize,

    /// Address rewards are paid to.
    pub caller: Address,

    /// Ledger height to record when no sync height is stored yet.
    pub start_height: u64,

    /// Fallback polling interval for when height notifications stall.
    pub poll_interval_secs: u64,

    /// Proving attempts per batch before the update is abandoned.
    pub max_prover_attempts: u32,

    /// Rebuilds after losing a race before waiting for the next height.
    pub max_stale_retries: u32,

    /// Updates quoted below this reward are not proven.
    pub min_reward: U256,

    pub prover: ProverEngineConfig,

    pub db: DatabaseConfig,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            batch_size: 1 << DEFAULT_BATCH_HEIGHT,
            tree_depth: DEFAULT_TREE_DEPTH,
            caller: Address::ZERO,
            start_height: 0,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_prover_attempts: DEFAULT_MAX_PROVER_ATTEMPTS,
            max_stale_retries: DEFAULT_MAX_STALE_RETRIES,
            min_reward: U256::ZERO,
            prover: ProverEngineConfig::default(),
            db: DatabaseConfig::default(),
        }
    }
}

impl KeeperConfig {
    pub fn options(&self) -> KeeperOptions {
        KeeperOptions {
            caller: self.caller,
            start_height: self.start_height,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_prover_attempts: self.max_prover_attempts,
            max_stale_retries: self.max_stale_retries,
            min_reward: self.min_reward,
        }
    }
}

pub fn create_prover_engine(config: &ProverEngineConfig) -> Arc<dyn ProofPipeline> {
    match config.kind {
        ProverKind::Mock => {
            warn!("using the mock prover, proofs are only accepted by development ledgers");
            Arc::new(MockProver::new())
        }
        ProverKind::External => Arc::new(ExternalProver::new(config.external_options())),
    }
}

/// Creates a keeper with the engine selected in `config`.
///
/// Storage is passed in rather than opened here, so several keepers in one
/// process can be given separate databases.
pub fn create_keeper(
    config: &KeeperConfig,
    ledger: Arc<dyn LedgerClient>,
    db: Arc<Box<dyn Database>>,
    cancellation_token: CancellationToken,
) -> Result<Keeper> {
    if config.caller.is_zero() {
        bail!("keeper caller address is not set");
    }
    let assembler = BatchAssembler::new(config.tree_depth, config.batch_size, Sha256FieldHasher)?;
    let engine = create_prover_engine(&config.prover);
    Ok(Keeper::new(ledger, db, engine, assembler, config.options(), cancellation_token))
}
