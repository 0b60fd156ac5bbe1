use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

pub const DEFAULT_API_PORT: u16 = 8420;
pub const DEFAULT_TREE_DEPTH: usize = 20;
pub const DEFAULT_RECENT_ROOTS_WINDOW: usize = 8;
pub const DEFAULT_ATTESTATION_TTL_SECS: i64 = 300;
pub const DEFAULT_REQUEST_TTL_SECS: i64 = 7 * 24 * 3600;
pub const DEFAULT_SCOPE_DURATION_SECS: i64 = 24 * 3600;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_API_PORT,
            request_timeout_secs: 30,
            requests_per_second: 100,
            burst_size: 200,
        }
    }
}

/// Process-wide policy parameters. Immutable for the process lifetime —
/// any change requires a restart (spec §3 "Configuration & keys").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub tree_depth: usize,
    pub recent_roots_window: usize,
    pub attestation_ttl_secs: i64,
    pub request_ttl_secs: i64,
    pub scope_duration_secs: i64,
    pub auto_approve: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tree_depth: DEFAULT_TREE_DEPTH,
            recent_roots_window: DEFAULT_RECENT_ROOTS_WINDOW,
            attestation_ttl_secs: DEFAULT_ATTESTATION_TTL_SECS,
            request_ttl_secs: DEFAULT_REQUEST_TTL_SECS,
            scope_duration_secs: DEFAULT_SCOPE_DURATION_SECS,
            auto_approve: false,
        }
    }
}

/// Paths to key material loaded once at startup (spec §4.8). The admin
/// private key is optional; when absent, auto-approval is disabled
/// regardless of `PolicyConfig::auto_approve`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub verification_key_path: PathBuf,
    pub signer_key_path: PathBuf,
    pub admin_salt_path: PathBuf,
    pub admin_public_key_paths: Vec<PathBuf>,
    pub admin_private_key_path: Option<PathBuf>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            verification_key_path: PathBuf::from("verification_key.bin"),
            signer_key_path: PathBuf::from("signer.key"),
            admin_salt_path: PathBuf::from("admin_salt.bin"),
            admin_public_key_paths: Vec::new(),
            admin_private_key_path: None,
        }
    }
}

/// Where to publish each newly appended tree root (spec §6
/// "Configuration": "RPC URL of the smart-contract host, program id").
/// Both fields are optional: absent `rpc_url` disables publishing
/// entirely and the Registration Coordinator's step 5 becomes a no-op,
/// per spec §4.4's "optionally publish".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OnchainConfig {
    pub rpc_url: Option<String>,
    pub program_id: Option<String>,
}

impl Default for OnchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            program_id: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub policy: PolicyConfig,
    pub keys: KeyConfig,
    pub onchain: OnchainConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs_data_dir();
        Self {
            data_dir,
            api: ApiConfig::default(),
            policy: PolicyConfig::default(),
            keys: KeyConfig::default(),
            onchain: OnchainConfig::default(),
        }
    }
}

fn dirs_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|h| h.join(".civitas"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/civitas"))
}

impl CoreConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> CoreResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Config(format!("failed to read config: {}", e)))?;
            toml::from_str(&contents)
                .map_err(|e| CoreError::Config(format!("failed to parse config: {}", e)))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> CoreResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Config(format!("failed to create config dir: {}", e)))?;
        }
        std::fs::write(path.as_ref(), contents)
            .map_err(|e| CoreError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CIVITAS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("CIVITAS_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Ok(bind) = std::env::var("CIVITAS_API_BIND") {
            if let Ok(addr) = bind.parse() {
                self.api.bind_address = addr;
            }
        }
        if let Ok(flag) = std::env::var("CIVITAS_AUTO_APPROVE") {
            self.policy.auto_approve = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Ok(rpc_url) = std::env::var("CIVITAS_RPC_URL") {
            self.onchain.rpc_url = Some(rpc_url);
        }
        if let Ok(program_id) = std::env::var("CIVITAS_PROGRAM_ID") {
            self.onchain.program_id = Some(program_id);
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.api.port == 0 {
            return Err(CoreError::Config("api.port must be nonzero".into()));
        }
        if self.policy.tree_depth == 0 || self.policy.tree_depth > 32 {
            return Err(CoreError::Config(
                "policy.tree_depth must be in 1..=32".into(),
            ));
        }
        if self.policy.recent_roots_window == 0 {
            return Err(CoreError::Config(
                "policy.recent_roots_window must be nonzero".into(),
            ));
        }
        Ok(())
    }

    pub fn api_is_localhost_only(&self) -> bool {
        self.api.bind_address.is_loopback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_port_rejected() {
        let mut config = CoreConfig::default();
        config.api.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_binds_localhost() {
        assert!(CoreConfig::default().api_is_localhost_only());
    }

    #[test]
    fn toml_roundtrip() {
        let config = CoreConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: CoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.api.port, config.api.port);
        assert_eq!(parsed.policy.tree_depth, config.policy.tree_depth);
    }
}
