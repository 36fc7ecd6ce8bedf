//! # extcompat-harness: Extension Compatibility Harness
//!
//! Exercises the claim that independently compiled schema extensions stay
//! wire-compatible: a message written with one extension set must decode,
//! intact, with any other.
//!
//! - [`config`]: `extcompat.yaml`, variant to binding mapping, matrix roles.
//! - [`fixture`]: the deterministic values every writer populates.
//! - [`variant`]: a named layout loaded from a digest-verified binding.
//! - [`writer`] / [`reader`]: the two ends of one pipeline. The reader
//!   verifies values, unknown-field preservation and byte-identical
//!   re-encoding.
//! - [`matrix`]: every writer against every reader, as process pipelines
//!   or in-process.
//!
//! ## Crate Policy
//!
//! - Wire bytes are the only thing that crosses from writer to reader.
//! - Library code logs through `tracing` and never prints; the binary owns
//!   stdout.

pub mod config;
pub mod error;
pub mod fixture;
pub mod matrix;
pub mod reader;
pub mod variant;
pub mod writer;

pub use config::{HarnessConfig, DEFAULT_CONFIG_FILE};
pub use error::{HarnessError, EXIT_DECODE, EXIT_OK, EXIT_USAGE, EXIT_VERIFY};
pub use fixture::Fixture;
pub use matrix::{pairs, MatrixError, MatrixRunner, MatrixSummary, Pair, PairFailure, Side};
pub use reader::{ExtensionStatus, ReadError, ReadReport};
pub use variant::Variant;

/// Configuration plus loaded fixture.
#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
    fixture: Fixture,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        let fixture = Fixture::load(&config.fixture)?;
        Ok(Self { config, fixture })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    pub fn variant(&self, name: &str) -> Result<Variant, HarnessError> {
        Variant::load(&self.config, name)
    }

    /// The configured writer-by-reader pairs, writers outer.
    pub fn pairs(&self) -> Vec<Pair> {
        pairs(&self.config.writers, &self.config.readers)
    }
}
