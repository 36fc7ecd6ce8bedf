//! `extcompat write`: one variant's fixture message, as wire bytes.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use extcompat_harness::writer::write_message;
use extcompat_harness::Harness;

use crate::load_config;

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Writer variant (e.g. generic, ext1, ext2).
    #[arg(long)]
    pub variant: String,

    /// Write to a file instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn run_write(args: &WriteArgs, config_path: Option<&Path>) -> Result<u8> {
    let harness = Harness::new(load_config(config_path)?)?;
    let variant = harness.variant(&args.variant)?;

    match &args.output {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_message(&variant, harness.fixture(), &mut file)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            write_message(&variant, harness.fixture(), &mut out)?;
            out.flush().context("failed to flush stdout")?;
        }
    }
    Ok(0)
}
