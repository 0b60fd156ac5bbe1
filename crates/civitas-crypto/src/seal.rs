//! AEAD sealing of credentials for delivery (spec §4.3): ciphertext plus
//! an explicit IV, decryptable only by the holder of the key derived
//! from their own `userAccount`. Delivery protection over an already
//! authenticated channel, not a standalone security boundary.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use civitas_types::{CoreError, SealedCredentials};
use rand::RngCore;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// The three secrets a registrant needs to later prove membership:
/// their nullifier, trapdoor, and the leaf index they were appended at.
pub struct CredentialPayload {
    pub nullifier: [u8; 32],
    pub trapdoor: [u8; 32],
    pub leaf_index: u64,
}

impl CredentialPayload {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + 32 + 8);
        bytes.extend_from_slice(&self.nullifier);
        bytes.extend_from_slice(&self.trapdoor);
        bytes.extend_from_slice(&self.leaf_index.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != 72 {
            return Err(CoreError::BadEncoding("credential payload must be 72 bytes".into()));
        }
        let mut nullifier = [0u8; 32];
        let mut trapdoor = [0u8; 32];
        let mut leaf_index_bytes = [0u8; 8];
        nullifier.copy_from_slice(&bytes[0..32]);
        trapdoor.copy_from_slice(&bytes[32..64]);
        leaf_index_bytes.copy_from_slice(&bytes[64..72]);
        Ok(Self {
            nullifier,
            trapdoor,
            leaf_index: u64::from_le_bytes(leaf_index_bytes),
        })
    }
}

pub fn seal(key: &[u8; 32], payload: &CredentialPayload) -> Result<SealedCredentials, CoreError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CoreError::Internal(format!("AES key setup failed: {e}")))?;

    let mut iv = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, payload.to_bytes().as_slice())
        .map_err(|e| CoreError::Internal(format!("credential sealing failed: {e}")))?;

    Ok(SealedCredentials { iv, ciphertext })
}

pub fn unseal(key: &[u8; 32], sealed: &SealedCredentials) -> Result<CredentialPayload, CoreError> {
    if sealed.ciphertext.len() < TAG_SIZE {
        return Err(CoreError::BadEncoding("sealed credentials too short".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CoreError::Internal(format!("AES key setup failed: {e}")))?;
    let nonce = Nonce::from_slice(&sealed.iv);
    let plaintext = cipher
        .decrypt(nonce, sealed.ciphertext.as_slice())
        .map_err(|e| CoreError::BadEncoding(format!("credential unsealing failed: {e}")))?;
    CredentialPayload::from_bytes(&plaintext)
}
