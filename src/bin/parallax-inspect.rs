#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use parallax::rules::{RuleSetBlock, RuleSetFlavor};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Flavor {
    /// Constant-buffer pipelines (trailing block of fetched shader hashes).
    Buffers,
    /// Constant-register pipelines (trailing block of shader-specific rules).
    Registers,
}

impl From<Flavor> for RuleSetFlavor {
    fn from(flavor: Flavor) -> Self {
        match flavor {
            Flavor::Buffers => RuleSetFlavor::ConstantBuffers,
            Flavor::Registers => RuleSetFlavor::ConstantRegisters,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Decode a persisted stereo rule-set block and log its contents")]
struct Args {
    /// Rule-set file to decode.
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = Flavor::Buffers)]
    flavor: Flavor,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("read rule set {}", args.file.display()))?;
    info!(file = %args.file.display(), len = bytes.len(), flavor = ?args.flavor, "decoding");

    let block = RuleSetBlock::parse(&bytes, args.flavor.into());
    for line in parallax::inspect::summarize(&block) {
        info!("{line}");
    }
    if block.error.is_some() {
        warn!("rule set is incomplete; later sections were dropped");
    }
    Ok(())
}
