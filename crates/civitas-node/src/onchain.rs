//! Fire-and-forget publisher for the Registration Coordinator's optional
//! "publish `newRoot` to the external smart contract" step (spec §4.4
//! Approve step 5). The on-disk state is authoritative regardless of
//! whether this ever succeeds; a failed or skipped publish never blocks
//! or fails an approval.

use civitas_types::OnchainConfig;
use std::time::Duration;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct OnchainPublisher {
    client: reqwest::Client,
    rpc_url: Option<String>,
    program_id: Option<String>,
}

impl OnchainPublisher {
    pub fn new(config: &OnchainConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: config.rpc_url.clone(),
            program_id: config.program_id.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: None,
            program_id: None,
        }
    }

    /// Spawns a detached retry loop that posts the new root to
    /// `rpc_url`. No-op when `rpc_url` is unset. Never observed by the
    /// caller: network failures are logged and swallowed, matching
    /// spec §4.4's "timeouts in step 5's optional on-chain publish do
    /// not block approval completion".
    pub fn spawn_publish(&self, leaf_index: u64, new_root: [u8; 32]) {
        let Some(rpc_url) = self.rpc_url.clone() else {
            return;
        };
        let client = self.client.clone();
        let program_id = self.program_id.clone().unwrap_or_default();
        let root_hex = hex::encode(new_root);

        tokio::spawn(async move {
            let body = serde_json::json!({
                "programId": program_id,
                "leafIndex": leaf_index,
                "newRoot": root_hex,
            });

            for attempt in 1..=MAX_ATTEMPTS {
                match client.post(&rpc_url).json(&body).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        info!(leaf_index, root = %root_hex, "published new root on-chain");
                        return;
                    }
                    Ok(resp) => {
                        warn!(attempt, status = %resp.status(), "on-chain publish rejected");
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "on-chain publish failed");
                    }
                }
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
                }
            }
            warn!(leaf_index, root = %root_hex, "giving up on-chain publish after retries; on-disk state remains authoritative");
        });
    }
}
