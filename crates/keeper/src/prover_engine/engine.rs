use async_trait::async_trait;
use mockall::automock;
use tokio_util::sync::CancellationToken;
use trellis_common::{batch::BatchUpdateInput, proof::Proof};
use trellis_errors::ProverError;

#[automock]
#[async_trait]
pub trait ProofPipeline: Send + Sync {
    /// Proves that `input.new_root` follows from `input.old_root` by appending
    /// `input.leaves`, with `input.args_hash` as the only public input.
    ///
    /// May run for minutes. Returns [`ProverError::Cancelled`] once `cancel`
    /// fires, and leaves no state behind that a later attempt depends on.
    async fn generate_proof(
        &self,
        input: &BatchUpdateInput,
        cancel: CancellationToken,
    ) -> Result<Proof, ProverError>;
}
