use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trellis_common::{batch::BatchUpdateInput, proof::Proof, test_utils::mock_proof};
use trellis_errors::ProverError;

use crate::prover_engine::ProofPipeline;

/// Development engine. Its proofs are derived from the args hash alone and
/// are only accepted by a verifier that knows the same derivation.
#[derive(Debug, Clone, Default)]
pub struct MockProver {
    latency: Duration,
}

impl MockProver {
    pub const fn new() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }

    /// Delays every proof by `latency`, so tests can race or cancel it.
    pub const fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ProofPipeline for MockProver {
    async fn generate_proof(
        &self,
        input: &BatchUpdateInput,
        cancel: CancellationToken,
    ) -> Result<Proof, ProverError> {
        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProverError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        debug!("mock proof for {} batch at {}", input.kind, input.first_index);
        Ok(mock_proof(&input.args_hash))
    }
}
