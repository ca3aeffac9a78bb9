pub mod accumulator;
pub mod auction;
pub mod balances;
pub mod stream;
pub mod system;
pub mod verifier;

pub use accumulator::AccumulatorState;
pub use auction::{AuctionController, AuctionState, reward_share};
pub use balances::TokenBalances;
pub use stream::{AdjustOutcome, Adjustment, FIRST_STREAM_ID, NewStream, Stream, StreamRegistry};
pub use system::{Contracts, ContractsConfig, RootsUpdate};
pub use verifier::ProofVerifier;
#[cfg(any(test, feature = "test_utils"))]
pub use verifier::MockProofChecker;
