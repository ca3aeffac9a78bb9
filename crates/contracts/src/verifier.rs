use mockall::automock;
use trellis_common::{digest::Digest, proof::Proof};
use trellis_errors::ProofVerificationError;

/// Checks a batch proof against its single public input, the args hash.
#[automock]
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &Proof, args_hash: &Digest) -> Result<(), ProofVerificationError>;
}

/// Accepts exactly the proofs produced by
/// [`trellis_common::test_utils::mock_proof`].
#[cfg(any(test, feature = "test_utils"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProofChecker;

#[cfg(any(test, feature = "test_utils"))]
impl ProofVerifier for MockProofChecker {
    fn verify(&self, proof: &Proof, args_hash: &Digest) -> Result<(), ProofVerificationError> {
        if trellis_common::test_utils::is_valid_mock_proof(proof, args_hash) {
            Ok(())
        } else {
            Err(ProofVerificationError::InvalidProof(format!(
                "proof does not open to {args_hash}"
            )))
        }
    }
}
