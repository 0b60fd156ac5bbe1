use crate::keys::KeyMaterial;
use crate::storage::Storage;
use civitas_types::{CoreConfig, CoreResult, RequestRecord};
use std::path::PathBuf;

pub async fn show_status(config_path: &PathBuf, data_dir: &PathBuf) -> CoreResult<()> {
    let mut config = CoreConfig::load(config_path)?;
    if config.data_dir.as_os_str().is_empty() {
        config.data_dir = data_dir.clone();
    }

    let storage = Storage::open(&config.data_dir).await?;
    let requests = storage.requests().await;
    let (mut pending, mut approved, mut rejected, mut expired) = (0, 0, 0, 0);
    for request in &requests {
        match request {
            RequestRecord::Pending { .. } => pending += 1,
            RequestRecord::Approved { .. } => approved += 1,
            RequestRecord::Rejected { .. } => rejected += 1,
            RequestRecord::Expired { .. } => expired += 1,
        }
    }

    println!("data dir:        {}", config.data_dir.display());
    println!("tree leaves:     {}", storage.leaves().await.len());
    println!("citizens:        {}", storage.citizens().await.len());
    println!("nullifiers used: {}", storage.nullifier_entries().await.len());
    println!("requests:        {} pending, {} approved, {} rejected, {} expired", pending, approved, rejected, expired);
    println!("auto approve:    {}", config.policy.auto_approve);
    println!("tree depth:      {}", config.policy.tree_depth);
    Ok(())
}

pub async fn run_checks(config_path: &PathBuf, data_dir: &PathBuf, full: bool) -> CoreResult<()> {
    let mut config = CoreConfig::load(config_path)?;
    if config.data_dir.as_os_str().is_empty() {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    println!("[ok] configuration parses and validates");

    KeyMaterial::load(&config.keys)?;
    println!("[ok] verification key, admin salt, and signer key load");

    if full {
        let storage = Storage::open(&config.data_dir).await?;
        println!(
            "[ok] storage opens and replays ({} leaves, {} requests)",
            storage.leaves().await.len(),
            storage.requests().await.len()
        );
    }

    println!("all checks passed");
    Ok(())
}
