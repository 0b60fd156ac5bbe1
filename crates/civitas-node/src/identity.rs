//! C3 wrapper: binds [`civitas_crypto::identity`] and [`civitas_crypto::seal`]
//! into the single operation the coordinator needs — derive an
//! identity for a newly approved registration and seal its credentials
//! for delivery.

use civitas_crypto::identity::{self, Identity};
use civitas_crypto::seal::{self, CredentialPayload};
use civitas_types::{CoreError, SealedCredentials};

/// Derive `(nullifier, trapdoor, commitment)` for a newly approved
/// registration (spec §4.3).
pub fn derive(attestation_nullifier: &[u8; 32], user_account: &str, admin_salt: &[u8; 32]) -> Identity {
    identity::issue_identity(attestation_nullifier, user_account, admin_salt)
}

/// Seal `(nullifier, trapdoor, leafIndex)` for transport back to the
/// user, keyed by their own `userAccount`.
pub fn seal_for_delivery(
    user_account: &str,
    identity: &Identity,
    leaf_index: u64,
) -> Result<SealedCredentials, CoreError> {
    let key = identity::sealing_key(user_account);
    let payload = CredentialPayload {
        nullifier: identity.nullifier,
        trapdoor: identity.trapdoor,
        leaf_index,
    };
    seal::seal(&key, &payload)
}
