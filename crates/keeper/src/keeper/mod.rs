use alloy_primitives::{Address, U256};
use anyhow::{Context, Result, bail};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast::error::RecvError, time::interval};
use tokio_util::sync::CancellationToken;
use trellis_common::{
    batch::BatchUpdateInput,
    calldata::BatchCall,
    event::{EventKind, LeafEvent},
    proof::Proof,
};
use trellis_errors::TrellisError;
use trellis_events::{EventChannel, EventPublisher, TrellisEvent};
use trellis_ledger::LedgerClient;
use trellis_storage::{BatchSummary, Database, SubmissionOutcome, SubmissionRecord};
use trellis_tree::{AccumulatorSnapshot, BatchAssembler};

use crate::{
    factory::{DEFAULT_MAX_PROVER_ATTEMPTS, DEFAULT_MAX_STALE_RETRIES, DEFAULT_POLL_INTERVAL_SECS},
    prover_engine::ProofPipeline,
    syncer::Syncer,
};


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeeperOptions {
    pub caller: Address,
    pub start_height: u64,
    pub poll_interval: Duration,
    pub max_prover_attempts: u32,
    pub max_stale_retries: u32,
    pub min_reward: U256,
}

impl Default for KeeperOptions {
    fn default() -> Self {
        Self {
            caller: Address::ZERO,
            start_height: 0,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_prover_attempts: DEFAULT_MAX_PROVER_ATTEMPTS,
            max_stale_retries: DEFAULT_MAX_STALE_RETRIES,
            min_reward: U256::ZERO,
        }
    }
}

/// At most one batch per accumulator, submitted together.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedUpdate {
    deposit: Option<BatchUpdateInput>,
    withdrawal: Option<BatchUpdateInput>,
}

impl PlannedUpdate {
    fn sizes(&self) -> (u64, u64) {
        let size = |batch: &Option<BatchUpdateInput>| {
            batch.as_ref().map_or(0, |b| b.batch_size() as u64)
        };
        (size(&self.deposit), size(&self.withdrawal))
    }
}

enum Submission {
    Accepted(SubmissionRecord),
    LostRace(SubmissionRecord),
}

/// Off-chain half of the accumulator protocol: keeps a local copy of the
/// event logs, proves batches against the confirmed roots and submits them.
///
/// Batches are always assembled from the roots the ledger reports at that
/// moment. Nothing is carried over between attempts, so a cancelled proof or
/// a lost race costs only the work already done.
pub struct Keeper {
    ledger: Arc<dyn LedgerClient>,
    db: Arc<Box<dyn Database>>,
    engine: Arc<dyn ProofPipeline>,
    assembler: BatchAssembler,
    syncer: Syncer,
    options: KeeperOptions,
    event_channel: Arc<EventChannel>,
    event_pub: EventPublisher,
    cancellation_token: CancellationToken,
}

impl Keeper {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        db: Arc<Box<dyn Database>>,
        engine: Arc<dyn ProofPipeline>,
        assembler: BatchAssembler,
        options: KeeperOptions,
        cancellation_token: CancellationToken,
    ) -> Self {
        let event_channel = Arc::new(EventChannel::new());
        let event_pub = event_channel.publisher();
        let syncer = Syncer::new(ledger.clone(), db.clone(), event_pub.clone());
        Self {
            ledger,
            db,
            engine,
            assembler,
            syncer,
            options,
            event_channel,
            event_pub,
            cancellation_token,
        }
    }

    pub fn event_channel(&self) -> Arc<EventChannel> {
        self.event_channel.clone()
    }

    pub fn db(&self) -> Arc<Box<dyn Database>> {
        self.db.clone()
    }

    pub const fn options(&self) -> &KeeperOptions {
        &self.options
    }

    /// Runs until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let result = self.main_loop().await;
        if let Err(e) = &result {
            error!("keeper exited unexpectedly: {:?}", e);
        }
        result
    }

    async fn main_loop(&self) -> Result<()> {
        let mut height_rx = self.ledger.subscribe_to_heights();
        let latest = self.ledger.get_latest_height().await?;
        let start_height = self.syncer.start_height(self.options.start_height)?;

        self.syncer.sync(latest).await.context("initial sync")?;
        info!("finished initial sync from height {} to {}", start_height, latest);
        self.event_pub.send(TrellisEvent::Ready);
        self.step(latest).await;

        let mut poll = interval(self.options.poll_interval);
        poll.tick().await;
        loop {
            let height = tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    info!("keeper cancelled");
                    return Ok(());
                }
                height = height_rx.recv() => match height {
                    Ok(height) => height,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("skipped {} height notifications", skipped);
                        self.ledger.get_latest_height().await?
                    }
                    Err(RecvError::Closed) => bail!("ledger height channel closed"),
                },
                _ = poll.tick() => self.ledger.get_latest_height().await?,
            };
            self.step(height).await;
        }
    }

    /// One iteration of the main loop. Failures are reported and the loop
    /// carries on with the next height.
    async fn step(&self, height: u64) {
        if let Err(e) = self.process_height(height).await {
            error!("processing height {}: {:?}", height, e);
            self.event_pub.send(TrellisEvent::OperationError {
                error: format!("{:#}", e),
            });
        }
    }

    /// Syncs, then proves and submits one update if the backlog allows it.
    /// After a lost race the update is rebuilt from the new confirmed state,
    /// up to `max_stale_retries` times.
    pub async fn process_height(&self, height: u64) -> Result<Option<SubmissionRecord>> {
        self.syncer.sync(height).await?;

        let mut lost = 0;
        loop {
            let Some(plan) = self.plan().await? else {
                return Ok(None);
            };
            match self.submit(height, &plan).await? {
                Submission::LostRace(_) if lost < self.options.max_stale_retries => {
                    lost += 1;
                    debug!(
                        "rebuilding after lost race ({}/{})",
                        lost, self.options.max_stale_retries
                    );
                    self.syncer.sync(height).await?;
                }
                Submission::Accepted(record) | Submission::LostRace(record) => {
                    return Ok(Some(record));
                }
            }
        }
    }

    async fn plan(&self) -> Result<Option<PlannedUpdate>> {
        let plan = PlannedUpdate {
            deposit: self.prepare(EventKind::Deposit).await?,
            withdrawal: self.prepare(EventKind::Withdrawal).await?,
        };
        if plan.deposit.is_none() && plan.withdrawal.is_none() {
            return Ok(None);
        }

        let (deposits, withdrawals) = plan.sizes();
        let quote = self.ledger.reward(deposits, withdrawals).await?;
        if quote < self.options.min_reward {
            info!(
                "skipping {} deposits and {} withdrawals: reward {} below minimum {}",
                deposits, withdrawals, quote, self.options.min_reward
            );
            return Ok(None);
        }
        debug!("{} deposits and {} withdrawals quoted at {}", deposits, withdrawals, quote);
        Ok(Some(plan))
    }

    /// Assembles the next batch of `kind` against the confirmed root, or
    /// returns `None` while the backlog is too small.
    async fn prepare(&self, kind: EventKind) -> Result<Option<BatchUpdateInput>> {
        let view = self.ledger.accumulator(kind).await?;
        if view.batch_size != self.assembler.batch_size() {
            bail!(
                "{} accumulator takes batches of {}, keeper assembles {}",
                kind,
                view.batch_size,
                self.assembler.batch_size()
            );
        }

        let events = self.db.get_events(kind, 0)?;
        let Ok(processed) = usize::try_from(view.last_processed) else {
            bail!("{} processed count {} out of range", kind, view.last_processed);
        };
        if events.len() < processed {
            bail!(
                "local {} log has {} events but the ledger processed {}",
                kind,
                events.len(),
                processed
            );
        }
        let (committed, pending) = events.split_at(processed);
        let snapshot = AccumulatorSnapshot::new(
            kind,
            view.root,
            committed.iter().map(LeafEvent::record).collect(),
        );

        match self.assembler.next_batch(&snapshot, pending) {
            Ok(batch) => {
                self.event_pub.send(TrellisEvent::BatchAssembled {
                    kind,
                    first_index: batch.first_index,
                    size: batch.batch_size() as u64,
                    old_root: batch.old_root,
                    new_root: batch.new_root,
                });
                Ok(Some(batch))
            }
            Err(TrellisError::InsufficientBacklog(backlog)) => {
                debug!("{} backlog too small: {}", kind, backlog);
                self.event_pub.send(TrellisEvent::BacklogInsufficient {
                    kind,
                    available: backlog.available,
                    required: backlog.required,
                });
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("assembling {} batch", kind)),
        }
    }

    /// Proves `batch`, retrying retryable failures up to
    /// `max_prover_attempts` times in total.
    async fn prove(&self, batch: &BatchUpdateInput) -> Result<Proof> {
        let mut attempt = 1;
        loop {
            let cancel = self.cancellation_token.child_token();
            match self.engine.generate_proof(batch, cancel).await {
                Ok(proof) => {
                    info!("proved {} batch at {}", batch.kind, batch.first_index);
                    self.event_pub.send(TrellisEvent::ProofGenerated {
                        kind: batch.kind,
                        args_hash: batch.args_hash,
                    });
                    return Ok(proof);
                }
                Err(e) => {
                    self.event_pub.send(TrellisEvent::ProverFailed {
                        kind: batch.kind,
                        error: e.to_string(),
                    });
                    if !e.is_retryable() || attempt >= self.options.max_prover_attempts {
                        return Err(e).with_context(|| {
                            format!(
                                "proving {} batch at {} ({} attempts)",
                                batch.kind, batch.first_index, attempt
                            )
                        });
                    }
                    warn!("prover attempt {} for {} batch failed: {}", attempt, batch.kind, e);
                    attempt += 1;
                }
            }
        }
    }

    async fn calldata(&self, batch: Option<&BatchUpdateInput>) -> Result<Option<Vec<u8>>> {
        let Some(batch) = batch else {
            return Ok(None);
        };
        let proof = self.prove(batch).await?;
        Ok(Some(BatchCall::new(batch.kind, proof, batch.args()).encode()))
    }

    async fn submit(&self, height: u64, plan: &PlannedUpdate) -> Result<Submission> {
        let (deposit_call, withdrawal_call) = tokio::try_join!(
            self.calldata(plan.deposit.as_ref()),
            self.calldata(plan.withdrawal.as_ref())
        )?;

        match self.ledger.update_roots(self.options.caller, deposit_call, withdrawal_call).await {
            Ok(update) => {
                info!(
                    "submitted {} deposits and {} withdrawals, earned {}",
                    update.deposits, update.withdrawals, update.reward
                );
                self.event_pub.send(TrellisEvent::RootsUpdated {
                    deposits: update.deposits,
                    withdrawals: update.withdrawals,
                    reward: update.reward,
                });
                let outcome = SubmissionOutcome::Accepted {
                    reward: update.reward,
                };
                Ok(Submission::Accepted(self.record(height, plan, outcome)?))
            }
            Err(TrellisError::StaleRoot(e)) => {
                warn!("lost submission race: {}", e);
                self.event_pub.send(TrellisEvent::LostRace {
                    error: e.to_string(),
                });
                Ok(Submission::LostRace(self.record(height, plan, SubmissionOutcome::LostRace)?))
            }
            Err(e) => {
                let outcome = SubmissionOutcome::Rejected {
                    reason: e.to_string(),
                };
                self.record(height, plan, outcome)?;
                Err(e).context("ledger rejected update")
            }
        }
    }

    fn record(
        &self,
        height: u64,
        plan: &PlannedUpdate,
        outcome: SubmissionOutcome,
    ) -> Result<SubmissionRecord> {
        let id = match self.db.get_latest_submission_id() {
            Ok(id) => id + 1,
            Err(_) => 0,
        };
        let record = SubmissionRecord {
            id,
            height,
            deposit: plan.deposit.as_ref().map(BatchSummary::from),
            withdrawal: plan.withdrawal.as_ref().map(BatchSummary::from),
            outcome,
        };
        self.db.add_submission(&record)?;
        Ok(record)
    }
}
