#![forbid(unsafe_code)]

mod citizen;
mod config;
mod error;
mod nullifier;
mod request;

pub use citizen::CitizenRecord;
pub use config::{
    ApiConfig, CoreConfig, KeyConfig, OnchainConfig, PolicyConfig, DEFAULT_API_PORT,
    DEFAULT_ATTESTATION_TTL_SECS, DEFAULT_RECENT_ROOTS_WINDOW, DEFAULT_REQUEST_TTL_SECS,
    DEFAULT_SCOPE_DURATION_SECS, DEFAULT_TREE_DEPTH,
};
pub use error::{CoreError, CoreResult};
pub use nullifier::{NullifierEntry, NullifierKey};
pub use request::{Attestation, RejectionReason, RequestRecord, SealedCredentials};
