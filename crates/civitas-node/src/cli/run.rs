use super::utils::print_banner;
use crate::api::{self, ApiRateLimiter, AppState};
use crate::coordinator::Coordinator;
use crate::keys::KeyMaterial;
use crate::merkle::TreeHandle;
use crate::nullifier::NullifierBook;
use crate::onchain::OnchainPublisher;
use crate::storage::Storage;
use crate::verifier::Verifier;
use civitas_crypto::signer::Signer;
use civitas_types::{CoreConfig, CoreError, CoreResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub async fn run_node(config_path: &PathBuf, data_dir: &PathBuf, pid_file: Option<PathBuf>) -> CoreResult<()> {
    print_banner();
    info!(version = env!("CARGO_PKG_VERSION"), "starting civitasd");

    if let Some(ref pid_path) = pid_file {
        std::fs::write(pid_path, std::process::id().to_string())
            .map_err(|e| CoreError::Config(format!("failed to write pid file: {e}")))?;
    }

    let mut config = CoreConfig::load(config_path)?;
    if config.data_dir.as_os_str().is_empty() {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;

    let key_material = Arc::new(KeyMaterial::load(&config.keys)?);
    let storage = Arc::new(Storage::open(&config.data_dir).await?);

    let leaves = storage.leaves().await;
    let tree = Arc::new(TreeHandle::restore(config.policy.tree_depth, &leaves)?);
    let nullifiers = Arc::new(NullifierBook::restore(storage.clone(), storage.nullifier_entries().await));

    let auto_approve = key_material.auto_approve_enabled(config.policy.auto_approve);
    let onchain = OnchainPublisher::new(&config.onchain);
    let coordinator = Arc::new(Coordinator::new(
        storage.clone(),
        tree.clone(),
        key_material.admin_salt,
        auto_approve,
        onchain,
    ));

    let verifier_signer = Signer::from_bytes(&key_material.signer.to_bytes());
    let verifier = Arc::new(
        Verifier::new(
            tree.as_ref(),
            nullifiers.clone(),
            key_material.verifying_key.clone(),
            verifier_signer,
            config.policy.attestation_ttl_secs,
            config.policy.recent_roots_window,
        )
        .await,
    );

    tokio::spawn(verifier.clone().track_roots(tree.subscribe()));

    spawn_expiry_sweep(coordinator.clone(), config.policy.request_ttl_secs);
    spawn_periodic_snapshot(storage.clone(), config.policy.tree_depth);

    let state = AppState {
        coordinator,
        verifier,
        tree,
        keys: key_material,
        policy: config.policy.clone(),
        rate_limiter: Arc::new(ApiRateLimiter::new(
            config.api.requests_per_second,
            config.api.burst_size,
        )),
    };

    let addr = std::net::SocketAddr::new(config.api.bind_address, config.api.port);
    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CoreError::IoError(format!("binding {addr}: {e}")))?;

    info!(%addr, "listening");
    print_ready_message(addr);

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown());

    if let Err(e) = serve.await {
        error!(error = %e, "server exited with an error");
    }

    if let Some(ref pid_path) = pid_file {
        let _ = std::fs::remove_file(pid_path);
    }
    info!("shutdown complete");
    Ok(())
}

fn spawn_expiry_sweep(coordinator: Arc<Coordinator>, request_ttl_secs: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = chrono::Utc::now().timestamp();
            match coordinator.expire_stale(now, request_ttl_secs).await {
                Ok(count) if count > 0 => info!(count, "expired stale pending requests"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "expiry sweep failed"),
            }
        }
    });
}

/// Periodically compacts `tree.log` into `tree.snapshot` so restart
/// replay time stays bounded.
fn spawn_periodic_snapshot(storage: Arc<Storage>, tree_depth: usize) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = storage.snapshot(tree_depth).await {
                error!(error = %e, "periodic snapshot failed");
            }
        }
    });
}

fn print_ready_message(addr: std::net::SocketAddr) {
    println!("civitasd is listening on http://{addr}");
    println!("press Ctrl+C to stop");
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C");
    }
}
