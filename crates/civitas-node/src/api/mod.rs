//! C7: the HTTP surface over the coordinator, verifier, and tree.
//!
//! One `axum::Router` exposing the named operations from spec §4.7.
//! Admin routes are nested behind [`middleware::require_admin_signature`]
//! and every route behind [`middleware::rate_limit`], mirroring the
//! node-status API's layered `ApiRateLimiter`/`ApiAuthenticator` split.

mod fields;
mod handlers;
mod middleware;
mod responses;

use crate::coordinator::Coordinator;
use crate::keys::KeyMaterial;
use crate::merkle::TreeHandle;
use crate::verifier::Verifier;
use axum::routing::{get, post};
use axum::Router;
use civitas_types::PolicyConfig;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::ApiRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub verifier: Arc<Verifier>,
    pub tree: Arc<TreeHandle>,
    pub keys: Arc<KeyMaterial>,
    pub policy: PolicyConfig,
    pub rate_limiter: Arc<ApiRateLimiter>,
}

impl AppState {
    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// The current census period: wall-clock time bucketed into
    /// `policy.scope_duration_secs`-wide windows (spec §4.8's `scope`).
    pub fn current_scope(&self) -> u64 {
        (self.now().max(0) as u64) / self.policy.scope_duration_secs.max(1) as u64
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/registrations", post(handlers::submit_registration))
        .route("/registrations/:user_account", get(handlers::registration_status))
        .route("/credentials/:user_account", get(handlers::get_credentials))
        .route("/merkle-proof/:commitment", get(handlers::merkle_proof))
        .route("/tree-info", get(handlers::tree_info))
        .route("/verify", post(handlers::verify));

    let admin = Router::new()
        .route("/admin/pending", get(handlers::list_pending))
        .route("/admin/approve/:request_id", post(handlers::approve))
        .route("/admin/reject/:request_id", post(handlers::reject))
        .route("/admin/auto-process-all", post(handlers::auto_process_all))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin_signature,
        ));

    public
        .merge(admin)
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
