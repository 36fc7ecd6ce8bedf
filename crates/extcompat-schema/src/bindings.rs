//! # Compiled Bindings
//!
//! A binding is the persisted output of compiling one root source: the
//! transitive closure of [`FileDescriptor`]s in dependency order, stamped
//! with a SHA-256 digest over its canonical JSON form. Readers and writers
//! load bindings instead of recompiling sources, so a variant's view of the
//! schema is fixed at build time.
//!
//! Bindings are written as `<stem>.desc.json` next to each other in the
//! output directory (`ext1.yaml` compiles to `ext1.desc.json`). Loading a
//! binding recomputes the digest and refuses a file whose content no longer
//! matches it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use extcompat_core::{
    sha256_digest, CanonicalBytes, CanonicalizationError, ContentDigest, DescriptorError,
    DescriptorPool, FileDescriptor,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Binding document format understood by this crate.
pub const BINDING_FORMAT: u32 = 1;

/// File name suffix of a compiled binding.
pub const BINDING_SUFFIX: &str = ".desc.json";

/// Error while writing, loading or linking a binding.
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("binding '{path}' is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("binding '{path}' has format {found}, expected {BINDING_FORMAT}")]
    UnsupportedFormat { path: String, found: u32 },

    /// The recorded digest does not match the content.
    #[error("binding '{path}' is corrupt: recorded digest {recorded}, computed {computed}")]
    DigestMismatch {
        path: String,
        recorded: ContentDigest,
        computed: ContentDigest,
    },

    #[error("binding canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("binding does not link: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("binding for '{source_name}' contains no files")]
    Empty { source_name: String },
}

/// The digested portion of a binding.
#[derive(Serialize)]
struct DigestInput<'a> {
    format: u32,
    source: &'a str,
    files: &'a [FileDescriptor],
}

/// Compiled output for one root source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompiledSchema {
    pub format: u32,
    /// Name of the root source, e.g. `both.yaml`.
    pub source: String,
    /// File closure in dependency order; the root file is last.
    pub files: Vec<FileDescriptor>,
    pub digest: ContentDigest,
}

impl CompiledSchema {
    /// Stamp a file closure with its digest.
    pub fn new(source: &str, files: Vec<FileDescriptor>) -> Result<Self, BindingError> {
        let digest = compute_digest(source, &files)?;
        Ok(Self {
            format: BINDING_FORMAT,
            source: source.to_string(),
            files,
            digest,
        })
    }

    /// Output file name: the source stem plus [`BINDING_SUFFIX`].
    pub fn file_name(&self) -> String {
        binding_file_name(&self.source)
    }

    /// The root file descriptor.
    pub fn root(&self) -> Option<&FileDescriptor> {
        self.files.last()
    }

    /// Recompute the digest and compare it with the recorded one.
    pub fn verify(&self, path: &str) -> Result<(), BindingError> {
        if self.format != BINDING_FORMAT {
            return Err(BindingError::UnsupportedFormat {
                path: path.to_string(),
                found: self.format,
            });
        }
        let computed = compute_digest(&self.source, &self.files)?;
        if computed != self.digest {
            return Err(BindingError::DigestMismatch {
                path: path.to_string(),
                recorded: self.digest.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Link the file closure into a descriptor pool.
    pub fn pool(&self) -> Result<DescriptorPool, BindingError> {
        if self.files.is_empty() {
            return Err(BindingError::Empty {
                source_name: self.source.clone(),
            });
        }
        Ok(DescriptorPool::from_files(self.files.iter().cloned())?)
    }

    /// Write the binding into `out_dir`, returning the written path.
    ///
    /// The document goes to a temporary sibling first and is renamed into
    /// place, so a concurrent reader never observes a partial binding.
    pub fn write_to(&self, out_dir: &Path) -> Result<PathBuf, BindingError> {
        let io_err = |path: &Path, source| BindingError::Io {
            path: path.display().to_string(),
            source,
        };
        fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;

        let path = out_dir.join(self.file_name());
        let tmp = out_dir.join(format!(".{}.tmp", self.file_name()));
        let mut text = serde_json::to_string_pretty(self).map_err(|e| BindingError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        text.push('\n');

        let mut f = fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        f.write_all(text.as_bytes()).map_err(|e| io_err(&tmp, e))?;
        f.sync_all().map_err(|e| io_err(&tmp, e))?;
        drop(f);
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;

        tracing::debug!(path = %path.display(), digest = %self.digest, "wrote binding");
        Ok(path)
    }

    /// Read a binding and verify its digest.
    pub fn load(path: &Path) -> Result<Self, BindingError> {
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| BindingError::Io {
            path: display.clone(),
            source: e,
        })?;
        let binding: Self = serde_json::from_str(&text).map_err(|e| BindingError::Parse {
            path: display.clone(),
            source: e,
        })?;
        binding.verify(&display)?;
        Ok(binding)
    }
}

/// `ext1.yaml` -> `ext1.desc.json`; directories in the source name are dropped.
pub fn binding_file_name(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    format!("{stem}{BINDING_SUFFIX}")
}

fn compute_digest(source: &str, files: &[FileDescriptor]) -> Result<ContentDigest, BindingError> {
    let canonical = CanonicalBytes::new(&DigestInput {
        format: BINDING_FORMAT,
        source,
        files,
    })?;
    Ok(sha256_digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use extcompat_core::{ExtensionRange, FieldDescriptor, FieldType, Label, MessageDescriptor};

    fn base() -> FileDescriptor {
        FileDescriptor {
            name: "base.yaml".into(),
            package: "xcompat".into(),
            dependencies: vec![],
            messages: vec![MessageDescriptor {
                full_name: "xcompat.Envelope".into(),
                fields: vec![FieldDescriptor {
                    name: "id".into(),
                    full_name: "xcompat.Envelope.id".into(),
                    number: 1,
                    field_type: FieldType::Uint32,
                    label: Label::Required,
                    packed: false,
                    extendee: None,
                }],
                extension_ranges: vec![ExtensionRange { start: 100, end: 199 }],
            }],
            extensions: vec![],
        }
    }

    #[test]
    fn test_file_name_from_source() {
        assert_eq!(binding_file_name("ext1.yaml"), "ext1.desc.json");
        assert_eq!(binding_file_name("nested/both.yaml"), "both.desc.json");
        assert_eq!(binding_file_name("plain"), "plain.desc.json");
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = CompiledSchema::new("base.yaml", vec![base()]).unwrap();
        let b = CompiledSchema::new("base.yaml", vec![base()]).unwrap();
        assert_eq!(a.digest, b.digest);
        let c = CompiledSchema::new("other.yaml", vec![base()]).unwrap();
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let compiled = CompiledSchema::new("base.yaml", vec![base()]).unwrap();
        let path = compiled.write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("base.desc.json"));
        assert!(!dir.path().join(".base.desc.json.tmp").exists());

        let loaded = CompiledSchema::load(&path).unwrap();
        assert_eq!(loaded, compiled);
        let pool = loaded.pool().unwrap();
        assert!(pool.message("xcompat.Envelope").is_some());
    }

    #[test]
    fn test_tampered_binding_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let compiled = CompiledSchema::new("base.yaml", vec![base()]).unwrap();
        let path = compiled.write_to(dir.path()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("\"number\": 1,", "\"number\": 2,")).unwrap();

        assert!(matches!(
            CompiledSchema::load(&path),
            Err(BindingError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let mut compiled = CompiledSchema::new("base.yaml", vec![base()]).unwrap();
        compiled.format = 2;
        assert!(matches!(
            compiled.verify("base.desc.json"),
            Err(BindingError::UnsupportedFormat { found: 2, .. })
        ));
    }

    #[test]
    fn test_empty_binding_has_no_pool() {
        let compiled = CompiledSchema::new("none.yaml", vec![]).unwrap();
        assert!(compiled.root().is_none());
        assert!(matches!(compiled.pool(), Err(BindingError::Empty { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CompiledSchema::load(&dir.path().join("absent.desc.json")),
            Err(BindingError::Io { .. })
        ));
    }
}
