use serde::{Deserialize, Serialize};

/// The external passport portal's attestation, treated as opaque except
/// for the policy bits the coordinator consults. `attestation_nullifier`
/// is the portal-side identifier that binds one real-world attestation
/// to one census identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub valid: bool,
    pub adult: bool,
    pub expires_at: i64,
    pub attestation_nullifier: [u8; 32],
}

impl Attestation {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Why a registration request was rejected.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    AttestationInvalid,
    AttestationExpired,
    AttestationReuse,
    UnderAge,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectionReason::AttestationInvalid => "AttestationInvalid",
            RejectionReason::AttestationExpired => "AttestationExpired",
            RejectionReason::AttestationReuse => "AttestationReuse",
            RejectionReason::UnderAge => "UnderAge",
        };
        write!(f, "{}", s)
    }
}

/// Credentials sealed for transport back to the user: ciphertext plus
/// the explicit IV, per spec §4.3. Decryptable only by the holder of
/// the key derived from their own `userAccount`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedCredentials {
    pub iv: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// A registration request, tracked through its lifecycle as a tagged
/// enum so terminal states hold their outputs and cannot be forged or
/// mutated at the type level (spec §9's design note).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RequestRecord {
    Pending {
        id: uuid::Uuid,
        user_account: String,
        attestation: Attestation,
        created_at: i64,
    },
    Approved {
        id: uuid::Uuid,
        user_account: String,
        attestation: Attestation,
        created_at: i64,
        processed_at: i64,
        processed_by: Option<String>,
        identity_commitment: [u8; 32],
        leaf_index: u64,
        sealed_credentials: SealedCredentials,
    },
    Rejected {
        id: uuid::Uuid,
        user_account: String,
        attestation: Attestation,
        created_at: i64,
        processed_at: i64,
        processed_by: Option<String>,
        reason: RejectionReason,
    },
    Expired {
        id: uuid::Uuid,
        user_account: String,
        attestation: Attestation,
        created_at: i64,
        processed_at: i64,
    },
}

impl RequestRecord {
    pub fn id(&self) -> uuid::Uuid {
        match self {
            RequestRecord::Pending { id, .. }
            | RequestRecord::Approved { id, .. }
            | RequestRecord::Rejected { id, .. }
            | RequestRecord::Expired { id, .. } => *id,
        }
    }

    pub fn user_account(&self) -> &str {
        match self {
            RequestRecord::Pending { user_account, .. }
            | RequestRecord::Approved { user_account, .. }
            | RequestRecord::Rejected { user_account, .. }
            | RequestRecord::Expired { user_account, .. } => user_account,
        }
    }

    pub fn attestation(&self) -> &Attestation {
        match self {
            RequestRecord::Pending { attestation, .. }
            | RequestRecord::Approved { attestation, .. }
            | RequestRecord::Rejected { attestation, .. }
            | RequestRecord::Expired { attestation, .. } => attestation,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            RequestRecord::Pending { created_at, .. }
            | RequestRecord::Approved { created_at, .. }
            | RequestRecord::Rejected { created_at, .. }
            | RequestRecord::Expired { created_at, .. } => *created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestRecord::Pending { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RequestRecord::Pending { .. })
    }

    pub fn status_name(&self) -> &'static str {
        match self {
            RequestRecord::Pending { .. } => "PENDING",
            RequestRecord::Approved { .. } => "APPROVED",
            RequestRecord::Rejected { .. } => "REJECTED",
            RequestRecord::Expired { .. } => "EXPIRED",
        }
    }
}
