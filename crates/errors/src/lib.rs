use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrellisError {
    #[error(transparent)]
    General(#[from] GeneralError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InsufficientBacklog(#[from] InsufficientBacklogError),
    #[error(transparent)]
    StaleRoot(#[from] StaleRootError),
    #[error(transparent)]
    ProofVerification(#[from] ProofVerificationError),
    #[error(transparent)]
    Prover(#[from] ProverError),
    #[error(transparent)]
    StreamState(#[from] StreamStateError),
    #[error(transparent)]
    Balance(#[from] BalanceError),
}

impl TrellisError {
    /// Whether a keeper should rebuild from confirmed state and try again.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::StaleRoot(_) => true,
            Self::Prover(err) => err.is_retryable(),
            _ => false,
        }
    }
}

// general reusable errors
#[derive(Error, Debug)]
pub enum GeneralError {
    #[error("initializing service: {0}")]
    InitializationError(String),
    #[error("acquiring lock on {0}")]
    LockError(String),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("acquiring database lock")]
    LockError,
    #[error("{0} not found")]
    NotFoundError(String),
    #[error("writing {0} to database")]
    WriteError(String),
    #[error("initializing database: {0}")]
    InitializationError(String),
    #[error("parsing error: {0}")]
    ParsingError(String),
}

/// Malformed batch input. Raised before any state is touched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("batch size {0} is not a power of two")]
    NotPowerOfTwo(usize),
    #[error("batch is empty")]
    EmptyBatch,
    #[error("batch size mismatch: expected {expected}, got {got}")]
    BatchSizeMismatch { expected: usize, got: usize },
    #[error("tree of depth {depth} cannot hold {requested} leaves")]
    TreeFull { depth: usize, requested: u64 },
    #[error("rebuilt root {computed} does not match confirmed root {confirmed}")]
    RootMismatch { confirmed: String, computed: String },
    #[error("events are not contiguous: expected index {expected}, got {got}")]
    NonContiguous { expected: u64, got: u64 },
    #[error("calldata length mismatch: expected {expected} bytes, got {got}")]
    CalldataLength { expected: usize, got: usize },
    #[error("unknown calldata selector {0}")]
    UnknownSelector(String),
    #[error("value is not a field element: {0}")]
    NotAFieldElement(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("insufficient backlog: {available} pending, {required} required")]
pub struct InsufficientBacklogError {
    pub available: u64,
    pub required: u64,
}

/// The submitted old root is no longer the stored root. Another submitter won.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("stale root: stored {stored}, submitted {submitted}")]
pub struct StaleRootError {
    pub stored: String,
    pub submitted: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProofVerificationError {
    #[error("args hash mismatch: computed {computed}, submitted {submitted}")]
    ArgsHashMismatch { computed: String, submitted: String },
    #[error("proof rejected by verifier: {0}")]
    InvalidProof(String),
    #[error("path indices mismatch: expected {expected}, got {got}")]
    PathIndexMismatch { expected: u32, got: u32 },
    #[error("leaf {index} does not match the registered event")]
    UnregisteredLeaf { index: u64 },
}

#[derive(Error, Debug)]
pub enum ProverError {
    #[error("prover unavailable: {0}")]
    Unavailable(String),
    #[error("prover timed out after {0}s")]
    Timeout(u64),
    #[error("prover crashed with {status}: {stderr} (witness kept in {witness_dir})")]
    Crash {
        status: String,
        stderr: String,
        witness_dir: String,
    },
    #[error("generating witness: {0}")]
    WitnessError(String),
    #[error("reading prover output: {0}")]
    InvalidOutput(String),
    #[error("proving cancelled")]
    Cancelled,
}

impl ProverError {
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StreamStateError {
    #[error("stream {0} does not exist")]
    NotFound(u64),
    #[error("stream {id} was finalized, successor is {successor:?}")]
    Finalized { id: u64, successor: Option<u64> },
    #[error("{caller} is not allowed to {action}")]
    Unauthorized { caller: String, action: String },
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("deposit {deposit} is smaller than the duration {duration}s")]
    DepositTooSmall { deposit: String, duration: u64 },
    #[error("amount {amount} exceeds available balance {available}")]
    AmountExceedsBalance { amount: String, available: String },
    #[error("stream {submitted} does not replace current stream {current}")]
    NotNewer { current: u64, submitted: u64 },
    #[error("stream {0} does not pay the auction")]
    WrongRecipient(u64),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("insufficient balance for {holder}: needed {needed}, available {available}")]
pub struct BalanceError {
    pub holder: String,
    pub needed: String,
    pub available: String,
}
