//! Node-level config helpers layered on [`civitas_types::CoreConfig`]:
//! where the config file and data directory live when not given
//! explicitly on the command line.

use std::path::PathBuf;

pub use civitas_types::CoreConfig;

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".civitas"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/civitas"))
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}
