//! `extcompat matrix`: every writer against every reader, as pipelines of
//! this same executable.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use extcompat_harness::{pairs, MatrixRunner};

use crate::load_config;

#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Writer variants, in order. Defaults to the configured writers.
    #[arg(long = "writer", value_name = "NAME")]
    pub writers: Vec<String>,

    /// Reader variants, in order. Defaults to the configured readers.
    #[arg(long = "reader", value_name = "NAME")]
    pub readers: Vec<String>,
}

pub fn run_matrix(args: &MatrixArgs, config_path: Option<&Path>, verbose: u8) -> Result<u8> {
    let config = load_config(config_path)?;
    let writers = if args.writers.is_empty() {
        config.writers.clone()
    } else {
        args.writers.clone()
    };
    let readers = if args.readers.is_empty() {
        config.readers.clone()
    } else {
        args.readers.clone()
    };
    for name in writers.iter().chain(&readers) {
        config.binding_path(name)?;
    }

    let exe = std::env::current_exe().context("cannot locate the extcompat executable")?;
    let mut runner = MatrixRunner::new(exe);
    if let Some(path) = config_path {
        runner = runner.global_arg("--config").global_arg(path.as_os_str());
    }
    if verbose > 0 {
        runner = runner.global_arg(format!("-{}", "v".repeat(usize::from(verbose))));
    }

    let all = pairs(&writers, &readers);
    let summary = runner.run(&all)?;
    for pair in &summary.passed {
        println!("ok    {pair}");
    }
    match &summary.failure {
        Some(failure) => {
            println!("FAIL  {} ({} exited {})", failure.pair, failure.side, failure.code);
            println!(
                "{} passed, 1 failed, {} not run",
                summary.passed.len(),
                summary.skipped
            );
        }
        None => println!("{} passed", summary.passed.len()),
    }
    Ok(summary.exit_code())
}
