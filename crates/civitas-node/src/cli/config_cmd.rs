use super::commands::ConfigAction;
use civitas_types::{CoreConfig, CoreResult};
use std::path::PathBuf;

pub fn handle_config(config_path: &PathBuf, action: ConfigAction) -> CoreResult<()> {
    match action {
        ConfigAction::Show => {
            let config = CoreConfig::load(config_path)?;
            let text = toml::to_string_pretty(&config)
                .map_err(|e| civitas_types::CoreError::Config(format!("serializing config: {e}")))?;
            println!("{text}");
        }
    }
    Ok(())
}
