use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;

/// Assemble a safety-critical pipeline cache from a JSON manifest.
#[derive(Parser, Debug)]
#[command(name = "pcpack", version)]
struct Cli {
    /// Input manifest JSON. Relative paths inside it resolve against its directory.
    #[arg(long)]
    manifest: PathBuf,

    /// Output cache path.
    #[arg(long)]
    out: PathBuf,

    /// Enable debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::ERROR
        })
        .with_target(false)
        .init();

    let manifest = pcutil::CacheManifest::from_path(&cli.manifest)
        .with_context(|| format!("read manifest '{}'", cli.manifest.display()))?;
    let root = cli.manifest.parent().unwrap_or_else(|| Path::new("."));
    let loaded = manifest
        .load(root)
        .with_context(|| "load manifest inputs")?;
    let blob = loaded.build().with_context(|| "assemble pipeline cache")?;

    if let Some(parent) = cli.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&cli.out, &blob)
        .with_context(|| format!("write cache '{}'", cli.out.display()))?;

    eprintln!("wrote {} ({} bytes)", cli.out.display(), blob.len());
    Ok(())
}
