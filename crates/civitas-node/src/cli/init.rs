use civitas_crypto::signer::Signer;
use civitas_types::{CoreConfig, CoreError, CoreResult};
use rand::RngCore;
use std::path::PathBuf;

pub fn init_node(config_path: &PathBuf, data_dir: &PathBuf, force: bool) -> CoreResult<()> {
    println!("initializing civitas data directory at {}", data_dir.display());

    if config_path.exists() && !force {
        println!("configuration already exists at {}", config_path.display());
        println!("use --force to overwrite");
        return Ok(());
    }

    std::fs::create_dir_all(data_dir).map_err(|e| CoreError::Config(format!("creating data dir: {e}")))?;

    let mut config = CoreConfig::default();
    config.data_dir = data_dir.clone();
    config.keys.verification_key_path = data_dir.join("verification_key.bin");
    config.keys.signer_key_path = data_dir.join("signer.key");
    config.keys.admin_salt_path = data_dir.join("admin_salt.bin");

    if !config.keys.admin_salt_path.exists() || force {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        write_secret(&config.keys.admin_salt_path, &salt)?;
        println!("generated admin salt at {}", config.keys.admin_salt_path.display());
    }

    if !config.keys.signer_key_path.exists() || force {
        let signer = Signer::generate();
        write_secret(&config.keys.signer_key_path, &signer.to_bytes())?;
        println!(
            "generated signer key at {} (public key {})",
            config.keys.signer_key_path.display(),
            hex::encode(signer.public_key())
        );
    }

    if !config.keys.verification_key_path.exists() {
        println!(
            "note: no verification key written — copy the circuit's verification key to {}",
            config.keys.verification_key_path.display()
        );
    }

    config.save(config_path)?;
    println!("wrote config to {}", config_path.display());
    println!();
    println!("next steps:");
    println!("  1. place the Groth16 verification key at {}", config.keys.verification_key_path.display());
    println!("  2. run: civitasd run");
    println!("  3. check: civitasd status");

    Ok(())
}

fn write_secret(path: &std::path::Path, bytes: &[u8]) -> CoreResult<()> {
    std::fs::write(path, bytes).map_err(|e| CoreError::Config(format!("writing {}: {e}", path.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| CoreError::Config(format!("setting permissions on {}: {e}", path.display())))?;
    }
    Ok(())
}
