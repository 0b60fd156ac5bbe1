use serde::{Deserialize, Serialize};

/// The authoritative record for one appended leaf. Invariant I1: every
/// `CitizenRecord` corresponds 1:1 to a leaf at `leaf_index`, and no
/// leaf exists without one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CitizenRecord {
    pub commitment: [u8; 32],
    pub leaf_index: u64,
    pub user_account: String,
    pub attestation_fingerprint: [u8; 32],
    pub timestamp: i64,
    pub onchain_tx_id: Option<String>,
}
