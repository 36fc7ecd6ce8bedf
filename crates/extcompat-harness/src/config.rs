//! # Harness Configuration
//!
//! `extcompat.yaml` tells the harness where schema sources live, where
//! bindings are written, which binding each variant loads, and which
//! variants take part in the matrix as writers and readers. Every key is
//! optional; an absent file yields [`HarnessConfig::default`], which matches
//! the layout shipped in this repository.
//!
//! Relative paths are resolved against the directory holding the config
//! file, so `extcompat --config ../other/extcompat.yaml` behaves the same as
//! running from `../other`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use extcompat_schema::SchemaCompiler;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// File picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "extcompat.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Directory holding the schema sources.
    pub schema_dir: PathBuf,
    /// Import search path. Empty means `[schema_dir]`.
    pub include_paths: Vec<PathBuf>,
    /// Where compiled bindings are written and read from.
    pub out_dir: PathBuf,
    /// Root sources compiled by `extcompat compile` with no arguments.
    pub sources: Vec<PathBuf>,
    /// Fully qualified name of the message under test.
    pub message: String,
    /// Fixture values file.
    pub fixture: PathBuf,
    /// Variant name -> binding file, relative to `out_dir`.
    pub variants: BTreeMap<String, PathBuf>,
    /// Matrix writers, in run order.
    pub writers: Vec<String>,
    /// Matrix readers, in run order.
    pub readers: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let variants = [
            ("generic", "base.desc.json"),
            ("ext1", "ext1.desc.json"),
            ("ext2", "ext2.desc.json"),
            ("both", "both.desc.json"),
        ]
        .into_iter()
        .map(|(name, file)| (name.to_string(), PathBuf::from(file)))
        .collect();
        Self {
            schema_dir: PathBuf::from("schemas"),
            include_paths: Vec::new(),
            out_dir: PathBuf::from("schemas"),
            sources: ["base.yaml", "ext1.yaml", "ext2.yaml", "both.yaml"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            message: "xcompat.Envelope".to_string(),
            fixture: PathBuf::from("schemas/fixture.yaml"),
            variants,
            writers: vec!["generic".into(), "ext1".into(), "ext2".into()],
            readers: vec!["generic".into(), "ext1".into(), "ext2".into(), "both".into()],
        }
    }
}

impl HarnessConfig {
    /// Load the configuration.
    ///
    /// With an explicit path the file must exist. Without one,
    /// `./extcompat.yaml` is used when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, HarnessError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    let config = Self::default();
                    config.validate(DEFAULT_CONFIG_FILE)?;
                    Ok(config)
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::io(format!("cannot read config {}", path.display()), e))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let config = Self::from_yaml_str(&text, &path.display().to_string())?.resolved(base_dir);
        tracing::debug!(path = %path.display(), "loaded harness config");
        Ok(config)
    }

    /// Parse and validate YAML text. Paths are left as written.
    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, HarnessError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| HarnessError::Config {
                path: origin.to_string(),
                reason: e.to_string(),
            })?
        };
        config.validate(origin)?;
        Ok(config)
    }

    /// Join every relative path onto `base_dir`.
    pub fn resolved(mut self, base_dir: &Path) -> Self {
        let join = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };
        self.schema_dir = join(&self.schema_dir);
        self.include_paths = self.include_paths.iter().map(|p| join(p)).collect();
        self.out_dir = join(&self.out_dir);
        self.fixture = join(&self.fixture);
        self
    }

    fn validate(&self, origin: &str) -> Result<(), HarnessError> {
        let mut problems = Vec::new();
        if self.message.is_empty() {
            problems.push("message must not be empty".to_string());
        }
        for (role, names) in [("writer", &self.writers), ("reader", &self.readers)] {
            for name in names {
                if !self.variants.contains_key(name) {
                    problems.push(format!("{role} '{name}' is not a declared variant"));
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Config {
                path: origin.to_string(),
                reason: problems.join("; "),
            })
        }
    }

    /// Effective import search path.
    pub fn include_paths(&self) -> Vec<PathBuf> {
        if self.include_paths.is_empty() {
            vec![self.schema_dir.clone()]
        } else {
            self.include_paths.clone()
        }
    }

    /// Binding file for a variant.
    pub fn binding_path(&self, variant: &str) -> Result<PathBuf, HarnessError> {
        self.variants
            .get(variant)
            .map(|file| self.out_dir.join(file))
            .ok_or_else(|| HarnessError::UnknownVariant {
                name: variant.to_string(),
                known: self.variant_names().join(", "),
            })
    }

    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.keys().map(String::as_str).collect()
    }

    /// Compile the configured sources into `out_dir`.
    pub fn compile(&self) -> Result<Vec<PathBuf>, HarnessError> {
        let compiler = SchemaCompiler::new(self.include_paths())?;
        Ok(compiler.compile_all(&self.sources, &self.out_dir)?)
    }
}
