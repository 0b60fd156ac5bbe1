use serde::{Deserialize, Serialize};

/// A recorded `(scope, nullifierHash)` pair. Invariant I4: one entry
/// exists for every successfully verified proof, never more than one
/// per pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct NullifierKey {
    pub scope: u64,
    pub nullifier_hash: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NullifierEntry {
    pub key: NullifierKey,
    pub first_seen_at: i64,
}
