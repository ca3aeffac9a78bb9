pub mod engine;
pub mod external;
pub mod mock;

pub use engine::ProofPipeline;
pub use external::{ExternalProver, ExternalProverOptions};
pub use mock::MockProver;
