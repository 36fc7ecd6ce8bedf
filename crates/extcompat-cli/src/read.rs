//! `extcompat read`: decode one message with a variant and verify it.
//!
//! Prints a JSON [`ReadReport`] on stdout unless `--quiet`. The exit code
//! tells decode failures (2) apart from verification failures (3).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use extcompat_harness::reader::{read_input, verify};
use extcompat_harness::{Harness, ReadError, ReadReport, EXIT_VERIFY};

use crate::load_config;

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Reader variant (e.g. generic, ext1, ext2, both).
    #[arg(long)]
    pub variant: String,

    /// Variant that wrote the input. Enables strict presence checks.
    #[arg(long)]
    pub writer: Option<String>,

    /// Read from a file instead of stdin.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Do not print the report.
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn run_read(args: &ReadArgs, config_path: Option<&Path>) -> Result<u8> {
    let harness = Harness::new(load_config(config_path)?)?;
    let reader = harness.variant(&args.variant)?;
    let writer = args
        .writer
        .as_deref()
        .map(|name| harness.variant(name))
        .transpose()?;

    let bytes = match &args.input {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        None => read_input(&reader, &mut std::io::stdin().lock())?,
    };

    match verify(&reader, harness.fixture(), &bytes, writer.as_ref()) {
        Ok(report) => {
            print_report(&report, args.quiet)?;
            Ok(0)
        }
        Err(ReadError::Verification { report }) => {
            for mismatch in &report.mismatches {
                tracing::error!(reader = %args.variant, "{mismatch}");
            }
            print_report(&report, args.quiet)?;
            Ok(EXIT_VERIFY)
        }
        Err(e) => {
            tracing::error!("{e}");
            Ok(e.exit_code())
        }
    }
}

fn print_report(report: &ReadReport, quiet: bool) -> Result<()> {
    if !quiet {
        let text = serde_json::to_string_pretty(report).context("failed to render report")?;
        println!("{text}");
    }
    Ok(())
}
