//! C8: config & key material loaded once at startup and treated as
//! immutable for the process lifetime (spec §4.8). A verification-key
//! or admin-salt load failure is fatal — the process must not start
//! half-configured; the signer key is the one piece of material that
//! self-provisions (generated and persisted on first run).

use ark_bn254::Bn254;
use ark_groth16::PreparedVerifyingKey;
use civitas_crypto::groth16;
use civitas_crypto::signer::{self, Signer};
use civitas_types::{CoreError, CoreResult, KeyConfig};
use std::fs;
use std::path::Path;

pub struct KeyMaterial {
    pub verifying_key: PreparedVerifyingKey<Bn254>,
    pub signer: Signer,
    pub admin_salt: [u8; 32],
    pub admin_public_keys: Vec<[u8; 32]>,
    pub admin_private_key: Option<Signer>,
}

impl KeyMaterial {
    pub fn load(config: &KeyConfig) -> CoreResult<Self> {
        let vk_bytes = fs::read(&config.verification_key_path).map_err(|e| {
            CoreError::Config(format!(
                "failed to read verification key at {}: {e}",
                config.verification_key_path.display()
            ))
        })?;
        let verifying_key = groth16::load_verifying_key(&vk_bytes)
            .map_err(|e| CoreError::Config(format!("verification key rejected: {e}")))?;

        let signer = load_or_generate_signer(&config.signer_key_path)?;

        let admin_salt_bytes = fs::read(&config.admin_salt_path).map_err(|e| {
            CoreError::Config(format!(
                "failed to read admin salt at {}: {e}",
                config.admin_salt_path.display()
            ))
        })?;
        let admin_salt = fixed_32(&admin_salt_bytes)
            .ok_or_else(|| CoreError::Config("admin salt must be exactly 32 bytes".into()))?;

        let mut admin_public_keys = Vec::with_capacity(config.admin_public_key_paths.len());
        for path in &config.admin_public_key_paths {
            let bytes = fs::read(path).map_err(|e| {
                CoreError::Config(format!("failed to read admin public key at {}: {e}", path.display()))
            })?;
            let key = fixed_32(&bytes)
                .ok_or_else(|| CoreError::Config(format!("admin public key at {} must be 32 bytes", path.display())))?;
            admin_public_keys.push(key);
        }

        let admin_private_key = match &config.admin_private_key_path {
            Some(path) => {
                let bytes = fs::read(path).map_err(|e| {
                    CoreError::Config(format!("failed to read admin private key at {}: {e}", path.display()))
                })?;
                let seed = fixed_32(&bytes)
                    .ok_or_else(|| CoreError::Config("admin private key must be exactly 32 bytes".into()))?;
                Some(Signer::from_bytes(&seed))
            }
            None => None,
        };

        Ok(Self {
            verifying_key,
            signer,
            admin_salt,
            admin_public_keys,
            admin_private_key,
        })
    }

    /// Auto-approval requires both the policy flag and a loaded
    /// operator admin key (spec §4.4 step 5).
    pub fn auto_approve_enabled(&self, policy_auto_approve: bool) -> bool {
        policy_auto_approve && self.admin_private_key.is_some()
    }

    pub fn is_configured_admin(&self, public_key: &[u8; 32]) -> bool {
        self.admin_public_keys.iter().any(|k| k == public_key)
    }
}

fn fixed_32(bytes: &[u8]) -> Option<[u8; 32]> {
    if bytes.len() == 32 {
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        return Some(out);
    }
    // Tolerate a hex-encoded key file (64 ascii chars, optionally with
    // a trailing newline) since operators commonly paste hex.
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.len() == 64 {
        let decoded = hex::decode(text).ok()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&decoded);
        return Some(out);
    }
    None
}

fn load_or_generate_signer(path: &Path) -> CoreResult<Signer> {
    if path.exists() {
        let bytes = fs::read(path)
            .map_err(|e| CoreError::Config(format!("failed to read signer key at {}: {e}", path.display())))?;
        let seed = fixed_32(&bytes)
            .ok_or_else(|| CoreError::Config("signer key must be exactly 32 bytes".into()))?;
        return Ok(Signer::from_bytes(&seed));
    }

    let signer = Signer::generate();
    write_secret(path, &signer.to_bytes())
        .map_err(|e| CoreError::Config(format!("failed to persist generated signer key: {e}")))?;
    tracing::info!(path = %path.display(), "generated and persisted a new signer key");
    Ok(signer)
}

/// Write key material with owner-only permissions on unix.
fn write_secret(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Verify an admin-signed request body (spec §4.7): reject unless the
/// signature is valid under one of the configured admin public keys.
pub fn verify_admin_signature(
    key_material: &KeyMaterial,
    public_key: &[u8; 32],
    body: &[u8],
    signature: &[u8; 64],
) -> CoreResult<()> {
    if !key_material.is_configured_admin(public_key) {
        return Err(CoreError::BadEncoding("unrecognised admin public key".into()));
    }
    let ok = signer::verify(public_key, body, signature)?;
    if !ok {
        return Err(CoreError::BadEncoding("invalid admin signature".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reuses_signer_key() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("civitas-keys-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("signer.key");

        let first = load_or_generate_signer(&path).unwrap();
        let second = load_or_generate_signer(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn fixed_32_accepts_raw_and_hex() {
        let raw = [7u8; 32];
        assert_eq!(fixed_32(&raw), Some(raw));
        let hex_text = hex::encode(raw);
        assert_eq!(fixed_32(hex_text.as_bytes()), Some(raw));
    }
}
