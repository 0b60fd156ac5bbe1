//! Ed25519 signing for issued attestations and admin-call authentication.

use civitas_types::CoreError;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

pub const SIGNATURE_SIZE: usize = 64;
pub const PUBLIC_KEY_SIZE: usize = 32;

/// The verifier's long-term signing identity. Persisted and loaded
/// once at startup (spec §4.8); every signed attestation and every
/// signature the admin API checks goes through one of these.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a signature against an arbitrary Ed25519 public key, used for
/// admin-call authentication where the signer isn't this process's own
/// key (spec §4.7: "the verifier rejects admin calls signed by any key
/// other than those in the configured admin set").
pub fn verify(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<bool, CoreError> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CoreError::BadEncoding(format!("invalid ed25519 public key: {e}")))?;
    let sig = Signature::from_bytes(signature);
    Ok(verifying_key.verify(message, &sig).is_ok())
}
