//! Handlers for the C7 operations (spec §4.7). Each builds a
//! `Coordinator`/`Verifier` call from the parsed wire request and maps
//! the `CoreResult` into the shared envelope.

use crate::api::fields::{hex_field_element, parse_field_element};
use crate::api::responses::{status_for_error, ApiErrorResponse, ApiResponse};
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use civitas_types::{Attestation, CoreError, RejectionReason, RequestRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn ok<T: Serialize>(state: &AppState, data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data, state.now()))).into_response()
}

fn err(state: &AppState, error: &CoreError) -> Response {
    let status = status_for_error(error);
    (status, Json(ApiResponse::<()>::error(error.into(), state.now()))).into_response()
}

fn admin_identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-admin-public-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRegistrationRequest {
    pub user_account: String,
    pub attestation: Attestation,
}

pub async fn submit_registration(
    State(state): State<AppState>,
    Json(body): Json<SubmitRegistrationRequest>,
) -> Response {
    let now = state.now();
    match state
        .coordinator
        .submit(body.user_account, body.attestation, now)
        .await
    {
        Ok(record) => ok(&state, record),
        Err(e) => err(&state, &e),
    }
}

pub async fn registration_status(State(state): State<AppState>, Path(user_account): Path<String>) -> Response {
    match state.coordinator.status_for_user(&user_account).await {
        Some(record) => ok(&state, record),
        None => err(&state, &CoreError::UnknownRequest),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsResponse {
    iv: String,
    ciphertext: String,
}

pub async fn get_credentials(State(state): State<AppState>, Path(user_account): Path<String>) -> Response {
    match state.coordinator.credentials_for_user(&user_account).await {
        Some(sealed) => ok(
            &state,
            CredentialsResponse {
                iv: hex::encode(sealed.iv),
                ciphertext: hex::encode(sealed.ciphertext),
            },
        ),
        None => err(&state, &CoreError::UnknownRequest),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MerkleProofResponse {
    leaf_index: u64,
    root: String,
    path_elements: Vec<String>,
    path_indices: Vec<u8>,
}

pub async fn merkle_proof(State(state): State<AppState>, Path(commitment): Path<String>) -> Response {
    let commitment_bytes = match parse_field_element(&commitment) {
        Ok(bytes) => bytes,
        Err(e) => return err(&state, &e),
    };
    match state.coordinator.merkle_proof(commitment_bytes).await {
        Ok(proof) => {
            let root = state.tree.root().await;
            let response = MerkleProofResponse {
                leaf_index: proof.leaf_index,
                root: hex_field_element(&root),
                path_elements: proof.path.iter().map(|n| hex_field_element(&n.sibling)).collect(),
                path_indices: proof
                    .path
                    .iter()
                    .map(|n| if n.sibling_is_left { 1 } else { 0 })
                    .collect(),
            };
            ok(&state, response)
        }
        Err(e) => err(&state, &e),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TreeInfoResponse {
    root: String,
    leaf_count: u64,
    depth: usize,
}

pub async fn tree_info(State(state): State<AppState>) -> Response {
    let response = TreeInfoResponse {
        root: hex_field_element(&state.tree.root().await),
        leaf_count: state.tree.leaf_count().await,
        depth: state.tree.depth().await,
    };
    ok(&state, response)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequestBody {
    /// Hex or base64-free encoding of the compressed Groth16 proof
    /// (`ark_groth16::Proof<Bn254>::serialize_compressed`). The
    /// spec's affine-coordinate `{A, B, C}` wire shape is this
    /// service's canonical *proving-side* format; the verifier only
    /// ever consumes the compressed serialisation, so that is what
    /// this endpoint accepts.
    pub proof: String,
    pub public_signals: PublicSignalsWire,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSignalsWire {
    pub root: String,
    pub nullifier_hash: String,
    pub signal_hash: String,
    pub external_nullifier: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttestationPayloadWire {
    nullifier_hash: String,
    scope: u64,
    issued_at: i64,
    expires_at: i64,
    signer_public_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    signature: String,
    attestation_payload: AttestationPayloadWire,
}

pub async fn verify(State(state): State<AppState>, Json(body): Json<VerifyRequestBody>) -> Response {
    let proof_bytes = match hex::decode(&body.proof) {
        Ok(bytes) => bytes,
        Err(e) => return err(&state, &CoreError::BadEncoding(format!("invalid proof hex: {e}"))),
    };

    let parsed = (|| -> Result<crate::verifier::VerifyRequest, CoreError> {
        Ok(crate::verifier::VerifyRequest {
            root: parse_field_element(&body.public_signals.root)?,
            nullifier_hash: parse_field_element(&body.public_signals.nullifier_hash)?,
            signal_hash: parse_field_element(&body.public_signals.signal_hash)?,
            external_nullifier: parse_field_element(&body.public_signals.external_nullifier)?,
        })
    })();
    let request = match parsed {
        Ok(r) => r,
        Err(e) => return err(&state, &e),
    };

    let now = state.now();
    let scope = state.current_scope();
    match state.verifier.verify(&proof_bytes, request, scope, now).await {
        Ok(attestation) => ok(
            &state,
            VerifyResponse {
                signature: hex::encode(attestation.signature),
                attestation_payload: AttestationPayloadWire {
                    nullifier_hash: hex_field_element(&attestation.nullifier_hash),
                    scope: attestation.scope,
                    issued_at: attestation.issued_at,
                    expires_at: attestation.expires_at,
                    signer_public_key: hex::encode(attestation.signer_public_key),
                },
            },
        ),
        Err(e) => err(&state, &e),
    }
}

pub async fn list_pending(State(state): State<AppState>) -> Response {
    ok(&state, state.coordinator.list_pending().await)
}

pub async fn approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Response {
    let now = state.now();
    match state.coordinator.approve(request_id, now, admin_identity(&headers)).await {
        Ok(record) => ok(&state, record),
        Err(e) => err(&state, &e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequestBody {
    pub reason: RejectionReason,
}

pub async fn reject(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RejectRequestBody>,
) -> Response {
    let now = state.now();
    match state
        .coordinator
        .reject(request_id, body.reason, now, admin_identity(&headers))
        .await
    {
        Ok(record) => ok(&state, record),
        Err(e) => err(&state, &e),
    }
}

pub async fn auto_process_all(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let now = state.now();
    let results = state
        .coordinator
        .auto_process_all(now, admin_identity(&headers))
        .await;
    let processed: Vec<RequestRecord> = results.into_iter().filter_map(Result::ok).collect();
    ok(&state, processed)
}
