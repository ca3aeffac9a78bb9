use async_trait::async_trait;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Output,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{fs, process::Command};
use tokio_util::sync::CancellationToken;
use trellis_common::{
    batch::BatchUpdateInput,
    proof::{Proof, parse_public_signals},
};
use trellis_errors::ProverError;

use crate::prover_engine::ProofPipeline;

static NEXT_RUN: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProverOptions {
    /// Native witness generator, called as `<bin> <input.json> <witness.wtns>`.
    pub witness_generator: PathBuf,
    /// Groth16 prover, called as
    /// `<bin> <circuit.zkey> <witness.wtns> <proof.json> <public.json>`.
    pub prover: PathBuf,
    pub circuit_key: PathBuf,
    /// Parent of the per-attempt witness directories.
    pub work_dir: PathBuf,
    pub timeout: Duration,
    /// Keep witness directories of successful attempts too.
    pub keep_witness: bool,
}

/// Runs the witness generator and the prover as child processes. Every
/// attempt gets its own directory under `work_dir`, which is kept whenever
/// the attempt fails.
#[derive(Debug, Clone)]
pub struct ExternalProver {
    options: ExternalProverOptions,
}

impl ExternalProver {
    pub const fn new(options: ExternalProverOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &ExternalProverOptions {
        &self.options
    }

    fn check_available(&self) -> Result<(), ProverError> {
        let options = &self.options;
        for path in [&options.witness_generator, &options.prover, &options.circuit_key] {
            if !path.is_file() {
                return Err(ProverError::Unavailable(format!("{} not found", path.display())));
            }
        }
        Ok(())
    }

    async fn prepare_dir(&self, label: &str) -> Result<PathBuf, ProverError> {
        let run = NEXT_RUN.fetch_add(1, Ordering::Relaxed);
        let dir = self.options.work_dir.join(format!("{}-{}-{}", label, std::process::id(), run));
        fs::create_dir_all(&dir).await.map_err(|e| {
            ProverError::Unavailable(format!("creating {}: {}", dir.display(), e))
        })?;
        Ok(dir)
    }

    async fn run_pipeline(
        &self,
        input: &BatchUpdateInput,
        dir: &Path,
        label: &str,
    ) -> Result<Proof, ProverError> {
        let input_file = dir.join(format!("{label}-input.json"));
        let witness_file = dir.join(format!("{label}.wtns"));
        let proof_file = dir.join(format!("{label}-proof.json"));
        let public_file = dir.join(format!("{label}-public.json"));

        let json = serde_json::to_vec_pretty(&input.circuit_input())
            .map_err(|e| ProverError::WitnessError(format!("encoding input: {e}")))?;
        fs::write(&input_file, json).await.map_err(|e| {
            ProverError::WitnessError(format!("writing {}: {}", input_file.display(), e))
        })?;

        let output = spawn(&self.options.witness_generator, &[&input_file, &witness_file]).await?;
        if !output.status.success() {
            return Err(ProverError::WitnessError(format!(
                "{} exited with {}: {}",
                self.options.witness_generator.display(),
                output.status,
                stderr(&output)
            )));
        }
        debug!("witness for {} written to {}", label, witness_file.display());

        let output = spawn(
            &self.options.prover,
            &[&self.options.circuit_key, &witness_file, &proof_file, &public_file],
        )
        .await?;
        if !output.status.success() {
            return Err(ProverError::Crash {
                status: output.status.to_string(),
                stderr: stderr(&output),
                witness_dir: dir.display().to_string(),
            });
        }

        let proof = Proof::from_snarkjs_json(&read_output(&proof_file).await?)?;
        let signals = parse_public_signals(&read_output(&public_file).await?)?;
        match signals.first() {
            Some(signal) if *signal == input.args_hash => Ok(proof),
            Some(signal) => Err(ProverError::InvalidOutput(format!(
                "public input {} does not match args hash {}",
                signal, input.args_hash
            ))),
            None => Err(ProverError::InvalidOutput("no public inputs".to_string())),
        }
    }
}

#[async_trait]
impl ProofPipeline for ExternalProver {
    async fn generate_proof(
        &self,
        input: &BatchUpdateInput,
        cancel: CancellationToken,
    ) -> Result<Proof, ProverError> {
        self.check_available()?;
        let label = format!("{}-{}", input.kind, input.first_index);
        let dir = self.prepare_dir(&label).await?;
        info!("proving {} batch at {} in {}", input.kind, input.first_index, dir.display());

        let timeout = self.options.timeout;
        // dropping the pipeline future kills any running child
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ProverError::Cancelled),
            result = tokio::time::timeout(timeout, self.run_pipeline(input, &dir, &label)) => {
                result.unwrap_or_else(|_| Err(ProverError::Timeout(timeout.as_secs())))
            }
        };

        match &result {
            Ok(_) if !self.options.keep_witness => {
                if let Err(e) = fs::remove_dir_all(&dir).await {
                    warn!("removing witness dir {}: {}", dir.display(), e);
                }
            }
            Ok(_) => debug!("witness kept in {}", dir.display()),
            Err(e) => warn!("proving {} failed, witness kept in {}: {}", label, dir.display(), e),
        }
        result
    }
}

async fn spawn<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<Output, ProverError> {
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProverError::Unavailable(format!("spawning {}: {}", program.display(), e)))
}

async fn read_output(path: &Path) -> Result<String, ProverError> {
    fs::read_to_string(path)
        .await
        .map_err(|e| ProverError::InvalidOutput(format!("reading {}: {}", path.display(), e)))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
