//! Dev/test key generation for the identity circuit.
//!
//! Production deployments receive their verification key from whoever
//! ran the real trusted setup; this tool exists so a local checkout can
//! produce a self-consistent `(pk, vk)` pair for integration tests and
//! local development.
//!
//! Usage:
//!   cargo run --bin civitas-keygen -- generate --output ./dev-keys --depth 20
//!   cargo run --bin civitas-keygen -- info --keys-dir ./dev-keys

use ark_serialize::CanonicalSerialize;
use civitas_crypto::circuit::dev_setup;
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

const CIRCUIT_VERSION: &str = "1.0.0";

#[derive(Parser)]
#[command(name = "civitas-keygen")]
#[command(about = "Generate dev-only Groth16 keys for the Civitas identity circuit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a circuit-specific trusted setup and write pk/vk to disk.
    Generate {
        #[arg(short, long, default_value = "./dev-keys")]
        output: PathBuf,
        #[arg(short, long, default_value_t = 20)]
        depth: usize,
    },
    /// Print metadata about a previously generated key set.
    Info {
        #[arg(short, long, default_value = "./dev-keys")]
        keys_dir: PathBuf,
    },
}

fn vk_hash(vk_bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(vk_bytes))
}

fn generate(output: &PathBuf, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("civitas-keygen {CIRCUIT_VERSION} — dev trusted setup");
    println!("tree depth: {depth}");
    fs::create_dir_all(output)?;

    println!("running circuit-specific setup (this is NOT a real trusted setup)...");
    let (pk, vk) = dev_setup(depth)?;

    let mut pk_bytes = Vec::new();
    pk.serialize_compressed(&mut pk_bytes)?;
    let pk_path = output.join("identity.pk.bin");
    File::create(&pk_path)?.write_all(&pk_bytes)?;
    println!("proving key: {} ({} bytes)", pk_path.display(), pk_bytes.len());

    let mut vk_bytes = Vec::new();
    vk.serialize_compressed(&mut vk_bytes)?;
    let vk_path = output.join("identity.vk.bin");
    File::create(&vk_path)?.write_all(&vk_bytes)?;
    println!("verifying key: {} ({} bytes)", vk_path.display(), vk_bytes.len());

    let hash = vk_hash(&vk_bytes);
    let meta = serde_json::json!({
        "circuit": "identity",
        "version": CIRCUIT_VERSION,
        "tree_depth": depth,
        "vk_hash": hash,
        "pk_size": pk_bytes.len(),
        "vk_size": vk_bytes.len(),
    });
    let meta_path = output.join("identity.meta.json");
    serde_json::to_writer_pretty(File::create(&meta_path)?, &meta)?;
    println!("vk hash: {hash}");
    println!("metadata: {}", meta_path.display());

    Ok(())
}

fn info(keys_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let meta_path = keys_dir.join("identity.meta.json");
    if !meta_path.exists() {
        println!("no keys found at {}", keys_dir.display());
        return Ok(());
    }
    let contents = fs::read_to_string(&meta_path)?;
    let meta: serde_json::Value = serde_json::from_str(&contents)?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Generate { output, depth } => generate(&output, depth)?,
        Commands::Info { keys_dir } => info(&keys_dir)?,
    }
    Ok(())
}
