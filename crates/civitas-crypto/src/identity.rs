//! Deterministic census-nullifier derivation and fresh-trapdoor identity
//! issuance (spec C3).
//!
//! `commitment = Poseidon2(nullifier, trapdoor)`. `nullifier` is
//! deterministic of `(attestationNullifier, userAccount, adminSalt)` so
//! the coordinator can detect "same attestation, same user" without
//! storing the nullifier itself; `trapdoor` is fresh CSPRNG randomness
//! so registration is unlinkable across reissuance.

use crate::poseidon::{bytes_to_fr, fr_to_bytes, hash2_fields, hash3_fields};
use ark_ff::PrimeField;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A freshly derived identity, ready to be appended to the tree and
/// sealed for delivery. `nullifier` and `trapdoor` must never leave the
/// process except inside sealed credentials (invariant I3).
#[derive(Clone)]
pub struct Identity {
    pub nullifier: [u8; 32],
    pub trapdoor: [u8; 32],
    pub commitment: [u8; 32],
}

/// `H = SHA-256(attestationNullifier || userAccount || adminSalt)`,
/// reduced mod the field prime. Deterministic: same inputs under a
/// fixed admin salt always yield the same nullifier (P5).
pub fn derive_nullifier(
    attestation_nullifier: &[u8; 32],
    user_account: &str,
    admin_salt: &[u8; 32],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(attestation_nullifier);
    hasher.update(user_account.as_bytes());
    hasher.update(admin_salt);
    let digest: [u8; 32] = hasher.finalize().into();
    let reduced = ark_bn254::Fr::from_le_bytes_mod_order(&digest);
    fr_to_bytes(&reduced)
}

/// Draw a fresh field element from a CSPRNG, reduced mod the field
/// prime. Used for the trapdoor and is never deterministic.
pub fn random_field_element() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let reduced = ark_bn254::Fr::from_le_bytes_mod_order(&bytes);
    fr_to_bytes(&reduced)
}

/// `Poseidon2(nullifier, trapdoor)` (P6).
pub fn compute_commitment(nullifier: &[u8; 32], trapdoor: &[u8; 32]) -> [u8; 32] {
    fr_to_bytes(&hash2_fields(bytes_to_fr(nullifier), bytes_to_fr(trapdoor)))
}

/// Derive the full identity for a newly approved registration.
pub fn issue_identity(
    attestation_nullifier: &[u8; 32],
    user_account: &str,
    admin_salt: &[u8; 32],
) -> Identity {
    let nullifier = derive_nullifier(attestation_nullifier, user_account, admin_salt);
    let trapdoor = random_field_element();
    let commitment = compute_commitment(&nullifier, &trapdoor);
    Identity {
        nullifier,
        trapdoor,
        commitment,
    }
}

/// The per-scope nullifier hash a proof reveals: `Poseidon2(nullifier, scope)`.
/// This is the only externally observable derivative of the secret nullifier.
pub fn nullifier_hash(nullifier: &[u8; 32], scope: &[u8; 32]) -> [u8; 32] {
    fr_to_bytes(&hash2_fields(bytes_to_fr(nullifier), bytes_to_fr(scope)))
}

/// Domain-separated key material derived from a `userAccount` string, used
/// to seal credentials for transport (spec §4.3). Not a standalone
/// security boundary — delivery protection over an already-authenticated
/// channel.
pub fn sealing_key(user_account: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"civitas-credential-seal-v1");
    hasher.update(user_account.as_bytes());
    hasher.finalize().into()
}

/// Hash three field elements, exposed for callers that need a
/// three-input Poseidon absorption outside of the identity pipeline
/// (e.g. the identity circuit's nullifier gadget uses the same
/// construction natively).
pub fn hash3(a: &[u8; 32], b: &[u8; 32], c: &[u8; 32]) -> [u8; 32] {
    fr_to_bytes(&hash3_fields(bytes_to_fr(a), bytes_to_fr(b), bytes_to_fr(c)))
}
