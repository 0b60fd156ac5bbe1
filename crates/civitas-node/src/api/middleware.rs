//! Per-IP request throttling and admin-signature authentication.
//!
//! Grounded on the node-status API's `ApiRateLimiter` (a token bucket
//! keyed by `IpAddr`, plus a global bucket): here the same shape is
//! built on `governor`'s keyed rate limiter per the policy config's
//! `requests_per_second`/`burst_size`, rather than hand-rolled tokens.

use crate::api::responses::{ApiErrorResponse, ApiResponse};
use crate::api::AppState;
use crate::keys;
use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;

pub struct ApiRateLimiter {
    per_ip: RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst_size.max(1)).unwrap());
        Self {
            per_ip: RateLimiter::keyed(quota),
        }
    }

    fn check(&self, ip: IpAddr) -> bool {
        self.per_ip.check_key(&ip).is_ok()
    }
}

const ADMIN_PUBLIC_KEY_HEADER: &str = "x-admin-public-key";
const ADMIN_SIGNATURE_HEADER: &str = "x-admin-signature";

pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.rate_limiter.check(addr.ip()) {
        next.run(request).await
    } else {
        let now = state.now();
        let body = ApiResponse::<()>::error(
            ApiErrorResponse::new("OVERLOADED", "request rate limit exceeded"),
            now,
        );
        (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response()
    }
}

/// Requires a valid Ed25519 signature over the raw request body from
/// one of the configured admin public keys (spec §4.7). The body is
/// buffered so the signature can be checked before the handler sees
/// it, then reassembled for the handler unchanged.
pub async fn require_admin_signature(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let now = state.now();
    let (parts, body) = request.into_parts();

    let public_key_hex = parts
        .headers
        .get(ADMIN_PUBLIC_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let signature_hex = parts
        .headers
        .get(ADMIN_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (Some(public_key_hex), Some(signature_hex)) = (public_key_hex, signature_hex) else {
        return admin_rejected(now, "missing admin authentication headers");
    };

    let body_bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return admin_rejected(now, "request body too large or unreadable"),
    };

    let result = (|| -> Result<(), String> {
        let public_key_bytes = hex::decode(&public_key_hex).map_err(|e| e.to_string())?;
        let signature_bytes = hex::decode(&signature_hex).map_err(|e| e.to_string())?;
        if public_key_bytes.len() != 32 || signature_bytes.len() != 64 {
            return Err("admin public key or signature has the wrong length".into());
        }
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&public_key_bytes);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&signature_bytes);
        keys::verify_admin_signature(&state.keys, &public_key, &body_bytes, &signature)
            .map_err(|e| e.to_string())
    })();

    if let Err(message) = result {
        return admin_rejected(now, &message);
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    next.run(request).await
}

fn admin_rejected(now: i64, message: &str) -> Response {
    let body = ApiResponse::<()>::error(ApiErrorResponse::new("BAD_ENCODING", message), now);
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
