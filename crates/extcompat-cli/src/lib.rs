//! # extcompat-cli: The `extcompat` Command
//!
//! ## Subcommands
//!
//! - `extcompat compile`: compile schema sources into `<stem>.desc.json`
//!   bindings.
//! - `extcompat write`: emit one variant's fixture message on stdout.
//! - `extcompat read`: decode stdin with one variant and verify it.
//! - `extcompat matrix`: run every writer against every reader as process
//!   pipelines.
//!
//! ```bash
//! extcompat compile -I schemas --out-dir schemas base.yaml ext1.yaml ext2.yaml both.yaml
//! extcompat write --variant ext1 | extcompat read --variant ext2
//! extcompat matrix
//! ```
//!
//! stdout carries only wire bytes (`write`) or reports (`read`, `matrix`);
//! all logging goes to stderr.

pub mod compile;
pub mod matrix;
pub mod read;
pub mod write;

use std::path::Path;

use anyhow::{Context, Result};
use extcompat_harness::HarnessConfig;

/// Load `--config`, or `./extcompat.yaml`, or defaults.
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    HarnessConfig::load(path).with_context(|| match path {
        Some(p) => format!("failed to load config {}", p.display()),
        None => "failed to load configuration".to_string(),
    })
}
