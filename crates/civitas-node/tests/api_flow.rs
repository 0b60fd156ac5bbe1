//! End-to-end coverage of the C7 HTTP surface, wiring a real
//! `Storage`/`TreeHandle`/`Coordinator`/`Verifier`/`NullifierBook`
//! stack behind `civitas_node::api::router` the same way `cli::run_node`
//! does, then driving it over a loopback `TcpListener` with `reqwest`.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey};
use ark_serialize::CanonicalSerialize;
use civitas_crypto::circuit::IdentityCircuit;
use civitas_crypto::groth16::load_verifying_key;
use civitas_crypto::poseidon::{bytes_to_fr, fr_to_bytes, hash2_fields};
use civitas_crypto::signer::Signer;
use civitas_crypto::{circuit, identity, seal};
use civitas_node::api::{self, ApiRateLimiter, AppState};
use civitas_node::{Coordinator, KeyMaterial, NullifierBook, OnchainPublisher, Storage, TreeHandle, Verifier};
use civitas_types::{PolicyConfig, SealedCredentials};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

struct TestApp {
    base: String,
    admin: Signer,
    proving_key: ProvingKey<Bn254>,
    scope_duration_secs: i64,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn admin_headers(&self, body: &[u8]) -> (String, String) {
        let signature = self.admin.sign(body);
        (hex::encode(self.admin.public_key()), hex::encode(signature))
    }

    fn current_scope(&self) -> u64 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        now / self.scope_duration_secs.max(1) as u64
    }
}

async fn spawn(tree_depth: usize, auto_approve: bool) -> TestApp {
    let (pk, vk) = circuit::dev_setup(tree_depth).expect("dev circuit setup");
    let vk_bytes = {
        let mut bytes = Vec::new();
        vk.serialize_compressed(&mut bytes).unwrap();
        bytes
    };
    let verifying_key = load_verifying_key(&vk_bytes).unwrap();

    let admin = Signer::generate();
    let admin_for_material = Signer::from_bytes(&admin.to_bytes());
    let key_material = Arc::new(KeyMaterial {
        verifying_key: verifying_key.clone(),
        signer: Signer::generate(),
        admin_salt: [9u8; 32],
        admin_public_keys: vec![admin.public_key()],
        admin_private_key: Some(admin_for_material),
    });

    let mut dir = std::env::temp_dir();
    dir.push(format!("civitas-api-test-{}", Uuid::new_v4()));
    let storage = Arc::new(Storage::open(dir).await.unwrap());
    let tree = Arc::new(TreeHandle::restore(tree_depth, &[]).unwrap());
    let nullifiers = Arc::new(NullifierBook::restore(storage.clone(), Vec::new()));

    let coordinator = Arc::new(Coordinator::new(
        storage.clone(),
        tree.clone(),
        key_material.admin_salt,
        auto_approve,
        OnchainPublisher::disabled(),
    ));

    let verifier_signer = Signer::from_bytes(&key_material.signer.to_bytes());
    let verifier = Arc::new(
        Verifier::new(
            tree.as_ref(),
            nullifiers.clone(),
            key_material.verifying_key.clone(),
            verifier_signer,
            300,
            8,
        )
        .await,
    );
    tokio::spawn(verifier.clone().track_roots(tree.subscribe()));

    let scope_duration_secs = 86_400;
    let policy = PolicyConfig {
        tree_depth,
        recent_roots_window: 8,
        attestation_ttl_secs: 300,
        request_ttl_secs: 86_400,
        scope_duration_secs,
        auto_approve,
    };

    let state = AppState {
        coordinator,
        verifier,
        tree,
        keys: key_material,
        policy,
        rate_limiter: Arc::new(ApiRateLimiter::new(1_000, 1_000)),
    };

    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .ok();
    });

    TestApp {
        base: format!("http://{addr}"),
        admin,
        proving_key: pk,
        scope_duration_secs,
    }
}

fn hex32(field: &str) -> [u8; 32] {
    let stripped = field.strip_prefix("0x").unwrap_or(field);
    let bytes = hex::decode(stripped).unwrap();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    out
}

fn attestation_body(nullifier: [u8; 32], adult: bool, expires_at: i64) -> Value {
    json!({
        "valid": true,
        "adult": adult,
        "expiresAt": expires_at,
        "attestationNullifier": nullifier,
    })
}

#[tokio::test]
async fn submit_approve_credentials_and_merkle_proof_round_trip() {
    let app = spawn(4, true).await;
    let client = reqwest::Client::new();

    let body = json!({
        "userAccount": "voter-1",
        "attestation": attestation_body([1u8; 32], true, 4_000_000_000),
    });
    let resp = client
        .post(app.url("/registrations"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let parsed: Value = resp.json().await.unwrap();
    assert!(parsed["success"].as_bool().unwrap());
    assert_eq!(parsed["data"]["status"], "approved");
    let leaf_index = parsed["data"]["leafIndex"].as_u64().unwrap();
    assert_eq!(leaf_index, 0);
    let commitment_bytes: Vec<u8> = parsed["data"]["identityCommitment"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b.as_u64().unwrap() as u8)
        .collect();
    let commitment_hex = hex::encode(&commitment_bytes);

    let resp = client
        .get(app.url("/registrations/voter-1"))
        .send()
        .await
        .unwrap();
    let parsed: Value = resp.json().await.unwrap();
    assert_eq!(parsed["data"]["status"], "approved");

    let resp = client
        .get(app.url("/credentials/voter-1"))
        .send()
        .await
        .unwrap();
    let parsed: Value = resp.json().await.unwrap();
    let sealed = SealedCredentials {
        iv: {
            let v = hex::decode(parsed["data"]["iv"].as_str().unwrap()).unwrap();
            let mut out = [0u8; 12];
            out.copy_from_slice(&v);
            out
        },
        ciphertext: hex::decode(parsed["data"]["ciphertext"].as_str().unwrap()).unwrap(),
    };
    let key = identity::sealing_key("voter-1");
    let payload = seal::unseal(&key, &sealed).unwrap();
    assert_eq!(payload.leaf_index, 0);

    let resp = client.get(app.url("/tree-info")).send().await.unwrap();
    let parsed: Value = resp.json().await.unwrap();
    assert_eq!(parsed["data"]["leafCount"], 1);
    assert_eq!(parsed["data"]["depth"], 4);

    let resp = client
        .get(app.url(&format!("/merkle-proof/{commitment_hex}")))
        .send()
        .await
        .unwrap();
    let parsed: Value = resp.json().await.unwrap();
    assert_eq!(parsed["data"]["leafIndex"], 0);
    let path_elements = parsed["data"]["pathElements"].as_array().unwrap();
    assert_eq!(path_elements.len(), 4);
}

#[tokio::test]
async fn duplicate_submission_is_already_registered() {
    let app = spawn(4, true).await;
    let client = reqwest::Client::new();
    let body = json!({
        "userAccount": "voter-2",
        "attestation": attestation_body([2u8; 32], true, 4_000_000_000),
    });
    let first = client.post(app.url("/registrations")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 200);

    let second = client.post(app.url("/registrations")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 409);
    let parsed: Value = second.json().await.unwrap();
    assert_eq!(parsed["error"]["error"], "ALREADY_REGISTERED");
}

#[tokio::test]
async fn under_age_attestation_is_rejected_not_errored() {
    let app = spawn(4, true).await;
    let client = reqwest::Client::new();
    let body = json!({
        "userAccount": "voter-3",
        "attestation": attestation_body([3u8; 32], false, 4_000_000_000),
    });
    let resp = client.post(app.url("/registrations")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let parsed: Value = resp.json().await.unwrap();
    assert!(parsed["success"].as_bool().unwrap());
    assert_eq!(parsed["data"]["status"], "rejected");
    assert_eq!(parsed["data"]["reason"], "underAge");
}

#[tokio::test]
async fn admin_routes_require_a_valid_signature() {
    let app = spawn(4, false).await;
    let client = reqwest::Client::new();

    let no_headers = client.get(app.url("/admin/pending")).send().await.unwrap();
    assert_eq!(no_headers.status(), 401);

    let other_signer = Signer::generate();
    let body = b"";
    let signature = other_signer.sign(body);
    let wrong_key = client
        .get(app.url("/admin/pending"))
        .header("x-admin-public-key", hex::encode(other_signer.public_key()))
        .header("x-admin-signature", hex::encode(signature))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_key.status(), 401);

    let (pubkey, signature) = app.admin_headers(body);
    let ok = client
        .get(app.url("/admin/pending"))
        .header("x-admin-public-key", pubkey)
        .header("x-admin-signature", signature)
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn admin_approve_is_idempotent_and_admin_reject_carries_a_reason() {
    let app = spawn(4, false).await;
    let client = reqwest::Client::new();

    let body = json!({
        "userAccount": "voter-4",
        "attestation": attestation_body([4u8; 32], true, 4_000_000_000),
    });
    let resp = client.post(app.url("/registrations")).json(&body).send().await.unwrap();
    let parsed: Value = resp.json().await.unwrap();
    assert_eq!(parsed["data"]["status"], "pending");
    let request_id = parsed["data"]["id"].as_str().unwrap().to_string();

    let empty = b"";
    let (pubkey, signature) = app.admin_headers(empty);
    let resp = client
        .post(app.url(&format!("/admin/approve/{request_id}")))
        .header("x-admin-public-key", &pubkey)
        .header("x-admin-signature", &signature)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let parsed: Value = resp.json().await.unwrap();
    assert_eq!(parsed["data"]["status"], "approved");

    // re-approving an already-approved request is idempotent.
    let resp = client
        .post(app.url(&format!("/admin/approve/{request_id}")))
        .header("x-admin-public-key", &pubkey)
        .header("x-admin-signature", &signature)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let second = json!({
        "userAccount": "voter-4b",
        "attestation": attestation_body([41u8; 32], true, 4_000_000_000),
    });
    let resp = client.post(app.url("/registrations")).json(&second).send().await.unwrap();
    let parsed: Value = resp.json().await.unwrap();
    let second_id = parsed["data"]["id"].as_str().unwrap().to_string();

    let reject_body = json!({ "reason": "attestationInvalid" });
    let reject_bytes = serde_json::to_vec(&reject_body).unwrap();
    let (pubkey, signature) = app.admin_headers(&reject_bytes);
    let resp = client
        .post(app.url(&format!("/admin/reject/{second_id}")))
        .header("x-admin-public-key", pubkey)
        .header("x-admin-signature", signature)
        .json(&reject_body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let parsed: Value = resp.json().await.unwrap();
    assert_eq!(parsed["data"]["status"], "rejected");
    assert_eq!(parsed["data"]["reason"], "attestationInvalid");
}

#[tokio::test]
async fn full_proof_round_trip_then_nullifier_reuse_is_rejected() {
    let tree_depth = 2;
    let app = spawn(tree_depth, true).await;
    let client = reqwest::Client::new();

    let body = json!({
        "userAccount": "voter-5",
        "attestation": attestation_body([5u8; 32], true, 4_000_000_000),
    });
    let resp = client.post(app.url("/registrations")).json(&body).send().await.unwrap();
    let parsed: Value = resp.json().await.unwrap();
    let leaf_index = parsed["data"]["leafIndex"].as_u64().unwrap();
    let commitment_bytes: Vec<u8> = parsed["data"]["identityCommitment"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b.as_u64().unwrap() as u8)
        .collect();
    let commitment_hex = hex::encode(&commitment_bytes);

    let resp = client.get(app.url("/credentials/voter-5")).send().await.unwrap();
    let parsed: Value = resp.json().await.unwrap();
    let sealed = SealedCredentials {
        iv: {
            let v = hex::decode(parsed["data"]["iv"].as_str().unwrap()).unwrap();
            let mut out = [0u8; 12];
            out.copy_from_slice(&v);
            out
        },
        ciphertext: hex::decode(parsed["data"]["ciphertext"].as_str().unwrap()).unwrap(),
    };
    let key = identity::sealing_key("voter-5");
    let payload = seal::unseal(&key, &sealed).unwrap();
    assert_eq!(payload.leaf_index, leaf_index);

    let resp = client
        .get(app.url(&format!("/merkle-proof/{commitment_hex}")))
        .send()
        .await
        .unwrap();
    let parsed: Value = resp.json().await.unwrap();
    let path_elements = parsed["data"]["pathElements"].as_array().unwrap();

    // Fold the path the same way `IdentityCircuit` does: at each level,
    // an odd position index puts the running hash on the right.
    let nullifier = bytes_to_fr(&payload.nullifier);
    let trapdoor = bytes_to_fr(&payload.trapdoor);
    let mut current = hash2_fields(nullifier, trapdoor);
    let mut idx = leaf_index;
    let mut path_frs = Vec::new();
    for element in path_elements {
        let sibling = bytes_to_fr(&hex32(element.as_str().unwrap()));
        path_frs.push(sibling);
        current = if idx & 1 == 1 {
            hash2_fields(sibling, current)
        } else {
            hash2_fields(current, sibling)
        };
        idx >>= 1;
    }
    let root = current;

    let scope = app.current_scope();
    let external_nullifier = Fr::from(scope);
    let nullifier_hash = hash2_fields(nullifier, external_nullifier);
    let signal_hash = Fr::from(1u64);

    let circuit = IdentityCircuit {
        nullifier: Some(nullifier),
        trapdoor: Some(trapdoor),
        leaf_index: Some(leaf_index),
        merkle_path: Some(path_frs),
        root: Some(root),
        nullifier_hash: Some(nullifier_hash),
        signal_hash: Some(signal_hash),
        external_nullifier: Some(external_nullifier),
    };
    let proof = Groth16::<Bn254>::prove(&app.proving_key, circuit, &mut ark_std::rand::thread_rng()).unwrap();
    let mut proof_bytes = Vec::new();
    proof.serialize_compressed(&mut proof_bytes).unwrap();

    let verify_body = json!({
        "proof": hex::encode(&proof_bytes),
        "publicSignals": {
            "root": format!("0x{}", hex::encode(fr_to_bytes(&root))),
            "nullifierHash": format!("0x{}", hex::encode(fr_to_bytes(&nullifier_hash))),
            "signalHash": format!("0x{}", hex::encode(fr_to_bytes(&signal_hash))),
            "externalNullifier": format!("0x{}", hex::encode(fr_to_bytes(&external_nullifier))),
        },
    });

    let resp = client.post(app.url("/verify")).json(&verify_body).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let parsed: Value = resp.json().await.unwrap();
    assert!(parsed["success"].as_bool().unwrap());
    assert_eq!(
        parsed["data"]["attestationPayload"]["nullifierHash"],
        format!("0x{}", hex::encode(fr_to_bytes(&nullifier_hash)))
    );

    let replay = client.post(app.url("/verify")).json(&verify_body).send().await.unwrap();
    assert_eq!(replay.status(), 409);
    let parsed: Value = replay.json().await.unwrap();
    assert_eq!(parsed["error"]["error"], "NULLIFIER_REUSED");
}

#[tokio::test]
async fn rate_limiter_returns_too_many_requests_once_the_quota_is_spent() {
    let (pk, vk) = circuit::dev_setup(4).expect("dev circuit setup");
    let vk_bytes = {
        let mut bytes = Vec::new();
        vk.serialize_compressed(&mut bytes).unwrap();
        bytes
    };
    let verifying_key = load_verifying_key(&vk_bytes).unwrap();
    let _ = pk;

    let admin = Signer::generate();
    let key_material = Arc::new(KeyMaterial {
        verifying_key: verifying_key.clone(),
        signer: Signer::generate(),
        admin_salt: [1u8; 32],
        admin_public_keys: vec![admin.public_key()],
        admin_private_key: None,
    });

    let mut dir = std::env::temp_dir();
    dir.push(format!("civitas-api-test-{}", Uuid::new_v4()));
    let storage = Arc::new(Storage::open(dir).await.unwrap());
    let tree = Arc::new(TreeHandle::restore(4, &[]).unwrap());
    let nullifiers = Arc::new(NullifierBook::restore(storage.clone(), Vec::new()));
    let coordinator = Arc::new(Coordinator::new(
        storage.clone(),
        tree.clone(),
        key_material.admin_salt,
        false,
        OnchainPublisher::disabled(),
    ));
    let verifier_signer = Signer::from_bytes(&key_material.signer.to_bytes());
    let verifier = Arc::new(Verifier::new(tree.as_ref(), nullifiers.clone(), key_material.verifying_key.clone(), verifier_signer, 300, 8).await);

    let state = AppState {
        coordinator,
        verifier,
        tree,
        keys: key_material,
        policy: PolicyConfig {
            tree_depth: 4,
            recent_roots_window: 8,
            attestation_ttl_secs: 300,
            request_ttl_secs: 86_400,
            scope_duration_secs: 86_400,
            auto_approve: false,
        },
        rate_limiter: Arc::new(ApiRateLimiter::new(1, 1)),
    };

    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .ok();
    });
    let base = format!("http://{addr}");

    let client = reqwest::Client::new();
    let first = client.get(format!("{base}/tree-info")).send().await.unwrap();
    assert_eq!(first.status(), 200);
    let second = client.get(format!("{base}/tree-info")).send().await.unwrap();
    assert_eq!(second.status(), 429);
}
