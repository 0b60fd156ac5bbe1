//! C5: validates a Groth16 proof and its public signals, then issues a
//! short-lived signed attestation the on-chain program accepts (spec
//! §4.5). The eight-step pipeline is deliberately linear — each of
//! steps 1-6 maps to a distinct, non-mutating error kind; step 7 (the
//! nullifier book) is the single mutation point.

use crate::merkle::{TreeHandle, Update};
use crate::nullifier::NullifierBook;
use ark_bn254::{Bn254, Fr};
use ark_groth16::PreparedVerifyingKey;
use civitas_crypto::groth16::{self, PublicSignals};
use civitas_crypto::poseidon::fr_to_bytes;
use civitas_crypto::signer::Signer;
use civitas_types::{CoreError, CoreResult, NullifierKey};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bounded history of recently valid roots, guarded independently of
/// the tree itself — the verifier only ever reads it.
struct RecentRoots {
    window: Vec<[u8; 32]>,
    capacity: usize,
}

impl RecentRoots {
    fn new(capacity: usize, initial_root: [u8; 32]) -> Self {
        Self {
            window: vec![initial_root],
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, root: [u8; 32]) {
        if self.window.last() == Some(&root) {
            return;
        }
        self.window.push(root);
        if self.window.len() > self.capacity {
            self.window.remove(0);
        }
    }

    fn contains(&self, root: &[u8; 32]) -> bool {
        self.window.contains(root)
    }
}

/// The four public signals a caller submits, in spec order.
#[derive(Clone, Copy, Debug)]
pub struct VerifyRequest {
    pub root: [u8; 32],
    pub nullifier_hash: [u8; 32],
    pub signal_hash: [u8; 32],
    pub external_nullifier: [u8; 32],
}

#[derive(Clone, Debug)]
pub struct SignedAttestation {
    pub signature: [u8; 64],
    pub nullifier_hash: [u8; 32],
    pub scope: u64,
    pub issued_at: i64,
    pub expires_at: i64,
    pub signer_public_key: [u8; 32],
}

/// Canonical binary form for signing: fields concatenated in listed
/// order, each integer little-endian fixed-width (spec §6).
fn canonical_attestation_payload(
    nullifier_hash: &[u8; 32],
    scope: u64,
    issued_at: i64,
    expires_at: i64,
    signer_public_key: &[u8; 32],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 8 + 8 + 8 + 32);
    buf.extend_from_slice(nullifier_hash);
    buf.extend_from_slice(&scope.to_le_bytes());
    buf.extend_from_slice(&issued_at.to_le_bytes());
    buf.extend_from_slice(&expires_at.to_le_bytes());
    buf.extend_from_slice(signer_public_key);
    buf
}

fn scope_as_field_bytes(scope: u64) -> [u8; 32] {
    fr_to_bytes(&Fr::from(scope))
}

pub struct Verifier {
    nullifiers: Arc<NullifierBook>,
    recent_roots: RwLock<RecentRoots>,
    verifying_key: PreparedVerifyingKey<Bn254>,
    signer: Signer,
    attestation_ttl_secs: i64,
}

impl Verifier {
    pub async fn new(
        tree: &TreeHandle,
        nullifiers: Arc<NullifierBook>,
        verifying_key: PreparedVerifyingKey<Bn254>,
        signer: Signer,
        attestation_ttl_secs: i64,
        recent_roots_window: usize,
    ) -> Self {
        let initial_root = tree.root().await;
        Self {
            nullifiers,
            recent_roots: RwLock::new(RecentRoots::new(recent_roots_window, initial_root)),
            verifying_key,
            signer,
            attestation_ttl_secs,
        }
    }

    /// Drive `recent_roots` from the tree's root broadcast. Intended to
    /// be spawned once at startup and run for the process lifetime.
    pub async fn track_roots(self: Arc<Self>, mut updates: tokio::sync::watch::Receiver<Update>) {
        loop {
            if updates.changed().await.is_err() {
                return;
            }
            let Update::NewRoot(root) = *updates.borrow();
            self.recent_roots.write().await.push(root);
        }
    }

    /// `verify(proof, publicSignals)` — spec §4.5's eight steps.
    /// `proof_bytes` is a compressed `ark_groth16::Proof<Bn254>`
    /// encoding (step 1); `request` carries the four already-parsed
    /// public signals (step 2 happens at the API boundary, where the
    /// decimal-or-hex wire encoding is range-checked into field bytes).
    pub async fn verify(
        &self,
        proof_bytes: &[u8],
        request: VerifyRequest,
        scope: u64,
        now: i64,
    ) -> CoreResult<SignedAttestation> {
        if !self.recent_roots.read().await.contains(&request.root) {
            return Err(CoreError::StaleRoot);
        }

        if request.external_nullifier != scope_as_field_bytes(scope) {
            return Err(CoreError::ScopeMismatch);
        }

        let key = NullifierKey {
            scope,
            nullifier_hash: request.nullifier_hash,
        };
        if self.nullifiers.is_used(&key).await {
            return Err(CoreError::NullifierReused);
        }

        let signals = PublicSignals {
            root: request.root,
            nullifier_hash: request.nullifier_hash,
            signal_hash: request.signal_hash,
            external_nullifier: request.external_nullifier,
        };
        let accepted = groth16::verify(&self.verifying_key, proof_bytes, &signals)?;
        if !accepted {
            return Err(CoreError::ProofRejected);
        }

        // Step 7: the only mutation point. A race lost here surfaces
        // as NullifierReused with no attestation emitted, exactly as
        // if the check in step 5 had caught it.
        self.nullifiers.record_once(key, now).await?;

        let issued_at = now;
        let expires_at = now + self.attestation_ttl_secs;
        let signer_public_key = self.signer.public_key();
        let payload = canonical_attestation_payload(
            &request.nullifier_hash,
            scope,
            issued_at,
            expires_at,
            &signer_public_key,
        );
        let signature = self.signer.sign(&payload);

        Ok(SignedAttestation {
            signature,
            nullifier_hash: request.nullifier_hash,
            scope,
            issued_at,
            expires_at,
            signer_public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use civitas_crypto::circuit::{dev_setup, IdentityCircuit};
    use civitas_crypto::groth16::load_verifying_key;
    use civitas_crypto::poseidon::{fr_to_bytes as fr_bytes, hash2_fields};
    use std::path::PathBuf;
    use uuid::Uuid;

    async fn test_storage() -> Arc<Storage> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("civitas-verifier-test-{}", Uuid::new_v4()));
        Arc::new(Storage::open(PathBuf::from(dir)).await.unwrap())
    }

    fn round_trip_proof_bytes(proof: &ark_groth16::Proof<Bn254>) -> Vec<u8> {
        use ark_serialize::CanonicalSerialize;
        let mut bytes = Vec::new();
        proof.serialize_compressed(&mut bytes).unwrap();
        bytes
    }

    async fn build_verifier_with_valid_proof(
        scope: u64,
    ) -> (Verifier, VerifyRequest, Vec<u8>) {
        let depth = 2;
        let (pk, vk) = dev_setup(depth).unwrap();

        let nullifier = Fr::from(5u64);
        let trapdoor = Fr::from(6u64);
        let commitment = hash2_fields(nullifier, trapdoor);
        let path = vec![Fr::from(10u64), Fr::from(20u64)];
        let mut current = commitment;
        for sibling in &path {
            current = hash2_fields(current, *sibling);
        }
        let root = current;
        let external_nullifier = Fr::from(scope);
        let nullifier_hash = hash2_fields(nullifier, external_nullifier);
        let signal_hash = Fr::from(1u64);

        let circuit = IdentityCircuit {
            nullifier: Some(nullifier),
            trapdoor: Some(trapdoor),
            leaf_index: Some(0),
            merkle_path: Some(path),
            root: Some(root),
            nullifier_hash: Some(nullifier_hash),
            signal_hash: Some(signal_hash),
            external_nullifier: Some(external_nullifier),
        };
        let proof = ark_groth16::Groth16::<Bn254>::prove(&pk, circuit, &mut ark_std::rand::thread_rng()).unwrap();

        let vk_bytes = {
            use ark_serialize::CanonicalSerialize;
            let mut bytes = Vec::new();
            vk.serialize_compressed(&mut bytes).unwrap();
            bytes
        };
        let pvk = load_verifying_key(&vk_bytes).unwrap();

        let request = VerifyRequest {
            root: fr_bytes(&root),
            nullifier_hash: fr_bytes(&nullifier_hash),
            signal_hash: fr_bytes(&signal_hash),
            external_nullifier: fr_bytes(&external_nullifier),
        };

        let tree = TreeHandle::restore(depth, &[]).unwrap();
        let storage = test_storage().await;
        let nullifiers = Arc::new(NullifierBook::restore(storage, Vec::new()));
        let verifier = Verifier::new(&tree, nullifiers, pvk, Signer::generate(), 300, 8).await;
        // seed the recent-roots window with the proof's root directly
        // since this test tree was never actually appended to.
        verifier.recent_roots.write().await.push(request.root);

        (verifier, request, round_trip_proof_bytes(&proof))
    }

    #[tokio::test]
    async fn s1_valid_proof_then_replay_is_nullifier_reused() {
        let (verifier, request, proof_bytes) = build_verifier_with_valid_proof(1).await;
        let first = verifier.verify(&proof_bytes, request, 1, 1_000).await;
        assert!(first.is_ok());

        let second = verifier.verify(&proof_bytes, request, 1, 1_001).await;
        assert!(matches!(second, Err(CoreError::NullifierReused)));
    }

    #[tokio::test]
    async fn stale_root_is_rejected() {
        let (verifier, mut request, proof_bytes) = build_verifier_with_valid_proof(1).await;
        request.root = [0xffu8; 32];
        let result = verifier.verify(&proof_bytes, request, 1, 1_000).await;
        assert!(matches!(result, Err(CoreError::StaleRoot)));
    }

    #[tokio::test]
    async fn scope_mismatch_is_rejected() {
        let (verifier, request, proof_bytes) = build_verifier_with_valid_proof(1).await;
        let result = verifier.verify(&proof_bytes, request, 2, 1_000).await;
        assert!(matches!(result, Err(CoreError::ScopeMismatch)));
    }

    #[tokio::test]
    async fn s6_concurrent_double_spend_has_exactly_one_winner() {
        let (verifier, request, proof_bytes) = build_verifier_with_valid_proof(1).await;
        let verifier = Arc::new(verifier);

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let verifier = verifier.clone();
            let proof_bytes = proof_bytes.clone();
            tasks.push(tokio::spawn(async move {
                verifier.verify(&proof_bytes, request, 1, 1_000).await
            }));
        }
        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
