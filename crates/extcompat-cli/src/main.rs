//! # extcompat CLI entry point
//!
//! Parses command-line arguments, installs logging on stderr, and
//! dispatches to subcommand handlers. Handlers return the process exit
//! code; an error escaping a handler exits 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use extcompat_cli::compile::{run_compile, CompileArgs};
use extcompat_cli::matrix::{run_matrix, MatrixArgs};
use extcompat_cli::read::{run_read, ReadArgs};
use extcompat_cli::write::{run_write, WriteArgs};

/// Schema extension compatibility harness.
///
/// Compiles independently developed schema extensions and checks that a
/// message written with any one of them decodes intact with any other.
#[derive(Parser, Debug)]
#[command(name = "extcompat", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the harness configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile schema sources into bindings.
    Compile(CompileArgs),

    /// Write one variant's fixture message to stdout.
    Write(WriteArgs),

    /// Read a message from stdin with one variant and verify it.
    Read(ReadArgs),

    /// Run every writer against every reader.
    Matrix(MatrixArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG, when set, overrides -v.
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match &cli.command {
        Commands::Compile(args) => run_compile(args, config),
        Commands::Write(args) => run_write(args, config),
        Commands::Read(args) => run_read(args, config),
        Commands::Matrix(args) => run_matrix(args, config, cli.verbose),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
