use std::{
    ffi::OsString,
    io::Write as _,
    path::PathBuf,
};

use anyhow::Context as _;
use clap::Parser;
use pcutil::{CacheReader, DetailMode, HexId, PcError, Pool, PoolReport};

/// Inspect a safety-critical pipeline cache and classify its pipelines into pools.
#[derive(Parser, Debug)]
#[command(name = "pcinfo", version)]
struct Cli {
    /// List basic pipeline info (index, identifier, memory size).
    #[arg(short = 'l', overrides_with_all = ["first_header", "all_headers", "all"])]
    list: bool,

    /// Print the cache header, then the basic listing.
    #[arg(short = 'f', overrides_with_all = ["list", "all_headers", "all"])]
    first_header: bool,

    /// Print the cache header and every pipeline and stage header.
    #[arg(short = 'd', overrides_with_all = ["list", "first_header", "all"])]
    all_headers: bool,

    /// Print everything, including JSON and SPIR-V words.
    #[arg(short = 'a', overrides_with_all = ["list", "first_header", "all_headers"])]
    all: bool,

    /// Add a pool of <POOLSIZE> bytes. May be repeated; `-pool` is accepted too.
    #[arg(long = "pool", value_name = "POOLSIZE")]
    pools: Vec<u64>,

    /// Print the pool report as JSON.
    #[arg(long, conflicts_with_all = ["list", "first_header", "all_headers", "all"])]
    json: bool,

    /// Enable debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Pipeline cache file to parse.
    file: PathBuf,
}

impl Cli {
    fn detail(&self) -> DetailMode {
        if self.all {
            DetailMode::All
        } else if self.all_headers {
            DetailMode::AllHeaders
        } else if self.first_header {
            DetailMode::FirstHeader
        } else if self.list {
            DetailMode::Basic
        } else {
            DetailMode::None
        }
    }
}

fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|a| if a == "-pool" { OsString::from("--pool") } else { a })
        .collect()
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::ERROR
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing(cli.verbose);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let chatty = !cli.json;

    let mut pools = Vec::with_capacity(cli.pools.len());
    for &size in &cli.pools {
        if chatty {
            writeln!(out, "adding pool of size {size}")?;
        }
        pools.push(Pool::new(size));
    }

    if chatty {
        writeln!(out, "parsing file: {}", cli.file.display())?;
    }
    let data = std::fs::read(&cli.file)
        .with_context(|| format!("failed to open '{}'", cli.file.display()))?;
    if chatty {
        writeln!(out, "read {} bytes from file", data.len())?;
    }

    let reader = CacheReader::new(&data);
    if !reader.is_valid() {
        anyhow::bail!(
            "Requested file is not a valid VK_PIPELINE_CACHE_HEADER_VERSION_SAFETY_CRITICAL_ONE cache. Aborting!"
        );
    }

    match pcutil::write_cache_info(&mut out, &reader, cli.detail()) {
        Err(PcError::InvalidCache(msg)) => {
            writeln!(out, "{msg}")?;
            out.flush()?;
            anyhow::bail!("{msg}");
        }
        other => other?,
    }

    if pools.is_empty() && !cli.json {
        return Ok(());
    }

    pcutil::sort_pools(&mut pools);
    if chatty {
        writeln!(out, "requested pools")?;
        for pool in &pools {
            writeln!(out, "    pool size: {}", pool.size)?;
        }
    }

    let result = pcutil::classify(&reader, &mut pools)?;
    for unfit in &result.unfit {
        eprintln!(
            "WARNING: index {} id: {} pipelineMemorySize: {} did not fit in any pool!",
            unfit.ordinal,
            HexId(&unfit.identifier),
            unfit.memory_size
        );
    }

    let report = PoolReport::new(&reader, &pools, &result);
    if cli.json {
        report.write_json(&mut out)?;
    } else {
        report.write_text(&mut out)?;
    }
    Ok(())
}
