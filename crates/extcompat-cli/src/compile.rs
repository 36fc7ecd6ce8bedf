//! `extcompat compile`: schema sources to bindings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use extcompat_schema::{CompiledSchema, SchemaCompiler};

use crate::load_config;

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Import search directory. Repeatable; searched in order.
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    pub include: Vec<PathBuf>,

    /// Directory the bindings are written to.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Schema sources. Defaults to the configured sources.
    pub sources: Vec<PathBuf>,
}

pub fn run_compile(args: &CompileArgs, config_path: Option<&Path>) -> Result<u8> {
    let config = load_config(config_path)?;
    let include = if args.include.is_empty() {
        config.include_paths()
    } else {
        args.include.clone()
    };
    let out_dir = args.out_dir.clone().unwrap_or_else(|| config.out_dir.clone());
    let sources = if args.sources.is_empty() {
        config.sources.clone()
    } else {
        args.sources.clone()
    };
    anyhow::ensure!(!sources.is_empty(), "no schema sources given");

    let compiler = SchemaCompiler::new(include).context("failed to initialize schema compiler")?;
    for source in &sources {
        let compiled = compiler
            .compile(source)
            .with_context(|| format!("failed to compile {}", source.display()))?;
        let path = compiled
            .write_to(&out_dir)
            .with_context(|| format!("failed to write binding for {}", source.display()))?;
        report(&compiled, &path);
    }
    Ok(0)
}

fn report(compiled: &CompiledSchema, path: &Path) {
    println!(
        "compiled {} ({} files) -> {}  {}",
        compiled.source,
        compiled.files.len(),
        path.display(),
        compiled.digest
    );
}
