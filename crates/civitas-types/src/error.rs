use thiserror::Error;

/// Stable error taxonomy for the Identity & Proof Service.
///
/// Each variant corresponds to one of the wire identifiers in the
/// service's error design (validation, policy, state, crypto, resource,
/// or fatal). `wire_code` renders the identifier clients key off of;
/// `Display` (via `thiserror`) renders the human string.
#[derive(Error, Debug)]
pub enum CoreError {
    // -- Validation --
    #[error("malformed encoding: {0}")]
    BadEncoding(String),
    #[error("field element out of range: {0}")]
    FieldOutOfRange(String),
    #[error("unknown commitment")]
    UnknownCommitment,
    #[error("unknown request")]
    UnknownRequest,

    // -- Policy --
    #[error("attestation invalid: {0}")]
    AttestationInvalid(String),
    #[error("attestation expired")]
    AttestationExpired,
    #[error("attestation already bound to another user")]
    AttestationReuse,
    #[error("attestation does not meet the minimum age policy")]
    UnderAge,
    #[error("user account is already registered at leaf {leaf_index}")]
    AlreadyRegistered { leaf_index: u64 },
    #[error("user account already has a pending or approved request")]
    DuplicateRequest,

    // -- State --
    #[error("Merkle tree is at capacity")]
    TreeFull,
    #[error("commitment already present in the tree")]
    DuplicateCommitment,
    #[error("nullifier already used for this scope")]
    NullifierReused,
    #[error("proof root is outside the recent-roots window")]
    StaleRoot,
    #[error("external nullifier does not match the expected scope")]
    ScopeMismatch,

    // -- Crypto --
    #[error("Groth16 proof rejected")]
    ProofRejected,

    // -- Resource --
    #[error("verifier pool overloaded")]
    Overloaded,
    #[error("operation timed out")]
    Timeout,
    #[error("storage error: {0}")]
    IoError(String),

    // -- Fatal (surfaced to clients as a generic internal error) --
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// The stable wire identifier a client can match on, independent of
    /// the human-readable `Display` string.
    pub fn wire_code(&self) -> &'static str {
        match self {
            CoreError::BadEncoding(_) => "BAD_ENCODING",
            CoreError::FieldOutOfRange(_) => "FIELD_OUT_OF_RANGE",
            CoreError::UnknownCommitment => "UNKNOWN_COMMITMENT",
            CoreError::UnknownRequest => "UNKNOWN_REQUEST",
            CoreError::AttestationInvalid(_) => "ATTESTATION_INVALID",
            CoreError::AttestationExpired => "ATTESTATION_EXPIRED",
            CoreError::AttestationReuse => "ATTESTATION_REUSE",
            CoreError::UnderAge => "UNDER_AGE",
            CoreError::AlreadyRegistered { .. } => "ALREADY_REGISTERED",
            CoreError::DuplicateRequest => "DUPLICATE_REQUEST",
            CoreError::TreeFull => "TREE_FULL",
            CoreError::DuplicateCommitment => "DUPLICATE_COMMITMENT",
            CoreError::NullifierReused => "NULLIFIER_REUSED",
            CoreError::StaleRoot => "STALE_ROOT",
            CoreError::ScopeMismatch => "SCOPE_MISMATCH",
            CoreError::ProofRejected => "PROOF_REJECTED",
            CoreError::Overloaded => "OVERLOADED",
            CoreError::Timeout => "TIMEOUT",
            CoreError::IoError(_) => "IO_ERROR",
            CoreError::Config(_) | CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is fatal at startup (config/key-material load
    /// failures) as opposed to a bounded per-request failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Config(_))
    }
}
