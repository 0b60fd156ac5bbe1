//! Groth16 verification against an externally supplied verification
//! key (spec C5, steps 1, 2, 6). Production code never proves —
//! generation lives only in [`crate::circuit`] for tests.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use civitas_types::CoreError;

/// Four field elements in the order the spec requires: `root,
/// nullifierHash, signalHash, externalNullifier`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicSignals {
    pub root: [u8; 32],
    pub nullifier_hash: [u8; 32],
    pub signal_hash: [u8; 32],
    pub external_nullifier: [u8; 32],
}

impl PublicSignals {
    fn as_field_elements(&self) -> [Fr; 4] {
        [
            crate::poseidon::bytes_to_fr(&self.root),
            crate::poseidon::bytes_to_fr(&self.nullifier_hash),
            crate::poseidon::bytes_to_fr(&self.signal_hash),
            crate::poseidon::bytes_to_fr(&self.external_nullifier),
        ]
    }
}

fn parse_proof(encoded: &[u8]) -> Result<Proof<Bn254>, CoreError> {
    Proof::<Bn254>::deserialize_compressed(encoded)
        .map_err(|e| CoreError::BadEncoding(format!("malformed Groth16 proof: {e}")))
}

/// Load a verification key from its canonical compressed byte form and
/// prepare it once for repeated verification calls. Fails fast — the
/// caller treats a load failure as fatal at startup (spec §7).
pub fn load_verifying_key(bytes: &[u8]) -> Result<PreparedVerifyingKey<Bn254>, CoreError> {
    let vk = VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| CoreError::Config(format!("unparsable verification key: {e}")))?;
    Groth16::<Bn254>::process_vk(&vk)
        .map_err(|e| CoreError::Config(format!("verification key processing failed: {e}")))
}

/// Verify a proof against the four public signals in spec order.
/// Returns `Ok(false)` for a well-formed but invalid proof; `Err` only
/// for malformed encodings (steps 1-2) which are distinct error kinds
/// from proof rejection (step 6).
pub fn verify(
    pvk: &PreparedVerifyingKey<Bn254>,
    proof_bytes: &[u8],
    signals: &PublicSignals,
) -> Result<bool, CoreError> {
    let proof = parse_proof(proof_bytes)?;
    let public_inputs = signals.as_field_elements();
    Groth16::<Bn254>::verify_with_processed_vk(pvk, &public_inputs, &proof)
        .map_err(|e| CoreError::Internal(format!("groth16 verification error: {e}")))
}
