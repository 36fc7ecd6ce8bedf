//! # Schema Compiler
//!
//! Turns YAML schema sources into linked [`FileDescriptor`] closures.
//!
//! ## Pipeline
//!
//! 1. **Locate.** A source name (`ext1.yaml`) is searched for in each
//!    include path in order; the first hit wins.
//! 2. **Load.** The source is validated against the embedded JSON Schema
//!    and deserialized. Imports are loaded depth-first before the importing
//!    file, so the resulting closure is in dependency order. An import that
//!    leads back to a file still being loaded is an [`CompileError::ImportCycle`].
//! 3. **Check.** Per-file semantic rules that the JSON Schema cannot
//!    express: duplicate names and numbers, reserved numbers, packed
//!    encoding on non-repeated or non-scalar fields, overlapping extension
//!    ranges, extension numbers outside the extendee's ranges. Every
//!    problem in a file is collected before failing.
//! 4. **Link.** Each lowered file is added to a [`DescriptorPool`], which
//!    rejects cross-file conflicts such as two imported extensions claiming
//!    the same number.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

use extcompat_core::descriptor::{MAX_FIELD_NUMBER, RESERVED_NUMBERS};
use extcompat_core::{
    DescriptorError, DescriptorPool, ExtensionRange, FieldDescriptor, FileDescriptor, Label,
    MessageDescriptor,
};
use thiserror::Error;

use crate::bindings::{BindingError, CompiledSchema};
use crate::source::{FieldSource, SchemaSource};
use crate::validate::{SchemaValidationError, SourceValidator};

/// Error while compiling a schema source.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("source '{name}' not found (searched: {searched})")]
    NotFound { name: String, searched: String },

    #[error("import cycle: {chain}")]
    ImportCycle { chain: String },

    #[error(transparent)]
    Validation(#[from] SchemaValidationError),

    /// One or more semantic rules failed in a single file.
    #[error("{file}: {}", .problems.join("; "))]
    Semantic { file: String, problems: Vec<String> },

    #[error("{file}: {source}")]
    Descriptor {
        file: String,
        #[source]
        source: DescriptorError,
    },

    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Compiles schema sources found on a list of include paths.
#[derive(Debug)]
pub struct SchemaCompiler {
    include_paths: Vec<PathBuf>,
    validator: SourceValidator,
}

impl SchemaCompiler {
    /// Create a compiler. With no include paths the current directory is
    /// searched.
    pub fn new<P: Into<PathBuf>>(
        include_paths: impl IntoIterator<Item = P>,
    ) -> Result<Self, CompileError> {
        let mut include_paths: Vec<PathBuf> = include_paths.into_iter().map(Into::into).collect();
        if include_paths.is_empty() {
            include_paths.push(PathBuf::from("."));
        }
        Ok(Self {
            include_paths,
            validator: SourceValidator::new()?,
        })
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Find a source by its include-relative name.
    pub fn locate(&self, name: &str) -> Result<PathBuf, CompileError> {
        self.include_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| CompileError::NotFound {
                name: name.to_string(),
                searched: self
                    .include_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Map a command-line source argument to its include-relative name.
    ///
    /// `ext1.yaml` and `schemas/ext1.yaml` both resolve to `ext1.yaml` when
    /// `schemas` is an include path.
    pub fn source_name(&self, source: &Path) -> Result<String, CompileError> {
        let as_name = slash_name(source);
        if source.is_relative() && self.locate(&as_name).is_ok() {
            return Ok(as_name);
        }
        for dir in &self.include_paths {
            if let Ok(rel) = source.strip_prefix(dir) {
                let name = slash_name(rel);
                if self.locate(&name).is_ok() {
                    return Ok(name);
                }
            }
        }
        Err(CompileError::NotFound {
            name: as_name,
            searched: self
                .include_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Compile one root source into its digest-stamped closure.
    pub fn compile(&self, source: &Path) -> Result<CompiledSchema, CompileError> {
        let name = self.source_name(source)?;
        let mut loader = Loader {
            compiler: self,
            pool: DescriptorPool::new(),
            done: HashSet::new(),
            stack: Vec::new(),
        };
        loader.load(&name)?;
        let files = loader.pool.files().to_vec();
        tracing::info!(source = %name, files = files.len(), "compiled schema");
        Ok(CompiledSchema::new(&name, files)?)
    }

    /// Compile each source and write its binding into `out_dir`.
    ///
    /// Stops at the first source that fails.
    pub fn compile_all(
        &self,
        sources: &[PathBuf],
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, CompileError> {
        let mut written = Vec::with_capacity(sources.len());
        for source in sources {
            let compiled = self.compile(source)?;
            written.push(compiled.write_to(out_dir)?);
        }
        Ok(written)
    }
}

fn slash_name(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

struct Loader<'a> {
    compiler: &'a SchemaCompiler,
    pool: DescriptorPool,
    done: HashSet<String>,
    stack: Vec<String>,
}

impl Loader<'_> {
    fn load(&mut self, name: &str) -> Result<(), CompileError> {
        if self.done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = self.stack.iter().position(|n| n == name) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(CompileError::ImportCycle {
                chain: chain.join(" -> "),
            });
        }

        let path = self.compiler.locate(name)?;
        tracing::debug!(source = %name, path = %path.display(), "loading schema source");
        let source = self.compiler.validator.load_source(&path, name)?;

        self.stack.push(name.to_string());
        for import in &source.imports {
            self.load(import)?;
        }
        self.stack.pop();

        let file = lower(name, &source, &self.visible_messages(&source))?;
        self.pool
            .add_file(file)
            .map_err(|source| CompileError::Descriptor {
                file: name.to_string(),
                source,
            })?;
        self.done.insert(name.to_string());
        Ok(())
    }

    /// Messages declared by the direct imports of `source`.
    fn visible_messages(&self, source: &SchemaSource) -> BTreeMap<String, MessageDescriptor> {
        self.pool
            .files()
            .iter()
            .filter(|f| source.imports.contains(&f.name))
            .flat_map(|f| f.messages.iter())
            .map(|m| (m.full_name.clone(), m.clone()))
            .collect()
    }
}

/// Lower a validated source to a descriptor, collecting semantic problems.
fn lower(
    name: &str,
    source: &SchemaSource,
    imported: &BTreeMap<String, MessageDescriptor>,
) -> Result<FileDescriptor, CompileError> {
    let mut problems = Vec::new();
    let package = &source.package;

    let mut messages: Vec<MessageDescriptor> = Vec::new();
    let mut seen_messages = BTreeSet::new();
    for message in &source.messages {
        let full_name = format!("{package}.{}", message.name);
        if !seen_messages.insert(full_name.clone()) {
            problems.push(format!("message '{full_name}' declared twice"));
            continue;
        }
        check_ranges(&full_name, &message.extension_ranges, &mut problems);

        let mut names = BTreeSet::new();
        let mut numbers = BTreeSet::new();
        let mut fields = Vec::with_capacity(message.fields.len());
        for field in &message.fields {
            let what = format!("field '{full_name}.{}'", field.name);
            check_field(&what, field, &mut problems);
            if !names.insert(field.name.as_str()) {
                problems.push(format!("{what} declared twice"));
            }
            if !numbers.insert(field.number) {
                problems.push(format!("{what} reuses number {}", field.number));
            }
            if message.extension_ranges.iter().any(|r| r.contains(field.number)) {
                problems.push(format!(
                    "{what} number {} lies inside an extension range",
                    field.number
                ));
            }
            fields.push(descriptor(field, format!("{full_name}.{}", field.name), None));
        }

        messages.push(MessageDescriptor {
            full_name,
            fields,
            extension_ranges: message.extension_ranges.clone(),
        });
    }

    let mut extensions: Vec<FieldDescriptor> = Vec::new();
    for extend in &source.extensions {
        let target = resolve_extendee(package, &extend.extendee, &messages, imported);
        let Some(target) = target else {
            problems.push(format!(
                "extendee '{}' does not name a message in this file or its imports",
                extend.extendee
            ));
            continue;
        };
        for field in &extend.fields {
            let full_name = format!("{package}.{}", field.name);
            let what = format!("extension '{full_name}'");
            check_field(&what, field, &mut problems);
            if field.label == Label::Required {
                problems.push(format!("{what} cannot be required"));
            }
            if !target.accepts_extension(field.number) {
                problems.push(format!(
                    "{what} number {} is outside the extension ranges of {}",
                    field.number, target.full_name
                ));
            }
            if seen_messages.contains(&full_name)
                || extensions.iter().any(|e| e.full_name == full_name)
            {
                problems.push(format!("{what} declared twice"));
            }
            if let Some(clash) = extensions.iter().find(|e| {
                e.extendee.as_deref() == Some(target.full_name.as_str()) && e.number == field.number
            }) {
                problems.push(format!(
                    "{what} reuses number {} already taken by '{}'",
                    field.number, clash.full_name
                ));
            }
            extensions.push(descriptor(field, full_name, Some(target.full_name.clone())));
        }
    }

    for import in &source.imports {
        if source.imports.iter().filter(|i| *i == import).count() > 1 {
            problems.push(format!("import '{import}' listed twice"));
        }
    }

    if !problems.is_empty() {
        problems.dedup();
        return Err(CompileError::Semantic {
            file: name.to_string(),
            problems,
        });
    }

    Ok(FileDescriptor {
        name: name.to_string(),
        package: package.clone(),
        dependencies: source.imports.clone(),
        messages,
        extensions,
    })
}

fn descriptor(field: &FieldSource, full_name: String, extendee: Option<String>) -> FieldDescriptor {
    FieldDescriptor {
        name: field.name.clone(),
        full_name,
        number: field.number,
        field_type: field.field_type,
        label: field.label,
        packed: field.packed,
        extendee,
    }
}

fn check_field(what: &str, field: &FieldSource, problems: &mut Vec<String>) {
    if field.number == 0 || field.number > MAX_FIELD_NUMBER {
        problems.push(format!("{what} number {} is out of bounds", field.number));
    }
    if RESERVED_NUMBERS.contains(&field.number) {
        problems.push(format!(
            "{what} number {} is reserved ({}..={})",
            field.number,
            RESERVED_NUMBERS.start(),
            RESERVED_NUMBERS.end()
        ));
    }
    if field.packed {
        if field.label != Label::Repeated {
            problems.push(format!("{what} is packed but not repeated"));
        } else if !field.field_type.is_packable() {
            problems.push(format!("{what} of type {} cannot be packed", field.field_type));
        }
    }
}

fn check_ranges(message: &str, ranges: &[ExtensionRange], problems: &mut Vec<String>) {
    for (i, range) in ranges.iter().enumerate() {
        if range.start > range.end {
            problems.push(format!(
                "{message} extension range {}..={} is empty",
                range.start, range.end
            ));
        }
        if ranges[..i].iter().any(|earlier| earlier.overlaps(range)) {
            problems.push(format!(
                "{message} extension range {}..={} overlaps another range",
                range.start, range.end
            ));
        }
    }
}

/// Resolve an extendee reference the way nested scopes shadow outer ones:
/// in package `a.b` the name `X` is tried as `a.b.X`, then `a.X`, then `X`.
/// A leading dot makes the name fully qualified.
fn resolve_extendee<'m>(
    package: &str,
    extendee: &str,
    local: &'m [MessageDescriptor],
    imported: &'m BTreeMap<String, MessageDescriptor>,
) -> Option<&'m MessageDescriptor> {
    let find = |full: &str| {
        local
            .iter()
            .find(|m| m.full_name == full)
            .or_else(|| imported.get(full))
    };
    if let Some(qualified) = extendee.strip_prefix('.') {
        return find(qualified);
    }
    let mut scope: Vec<&str> = package.split('.').collect();
    loop {
        let candidate = if scope.is_empty() {
            extendee.to_string()
        } else {
            format!("{}.{extendee}", scope.join("."))
        };
        if let Some(found) = find(&candidate) {
            return Some(found);
        }
        if scope.pop().is_none() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASE: &str = r#"
package: xcompat
messages:
  - name: Envelope
    fields:
      - { name: id, number: 1, type: uint32, label: required }
      - { name: name, number: 2, type: string }
      - { name: flags, number: 3, type: sint64, label: repeated, packed: true }
    extension_ranges:
      - { start: 100, end: 199 }
"#;

    const EXT1: &str = r#"
package: xcompat.ext1
imports: [base.yaml]
extensions:
  - extendee: Envelope
    fields:
      - { name: tag, number: 100, type: string }
      - { name: weight, number: 101, type: double }
"#;

    const EXT2: &str = r#"
package: xcompat.ext2
imports: [base.yaml]
extensions:
  - extendee: .xcompat.Envelope
    fields:
      - { name: priority, number: 110, type: int32 }
      - { name: blob, number: 111, type: bytes }
"#;

    const BOTH: &str = r#"
package: xcompat.both
imports: [ext1.yaml, ext2.yaml]
"#;

    fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        dir
    }

    fn standard() -> tempfile::TempDir {
        workspace(&[
            ("base.yaml", BASE),
            ("ext1.yaml", EXT1),
            ("ext2.yaml", EXT2),
            ("both.yaml", BOTH),
        ])
    }

    fn semantic_problems(err: CompileError) -> Vec<String> {
        match err {
            CompileError::Semantic { problems, .. } => problems,
            other => panic!("expected semantic error, got {other}"),
        }
    }

    #[test]
    fn test_compile_ext1_closure() {
        let dir = standard();
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let compiled = compiler.compile(Path::new("ext1.yaml")).unwrap();
        let names: Vec<&str> = compiled.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["base.yaml", "ext1.yaml"]);

        let ext1 = compiled.root().unwrap();
        assert_eq!(ext1.extensions[0].full_name, "xcompat.ext1.tag");
        assert_eq!(ext1.extensions[0].extendee.as_deref(), Some("xcompat.Envelope"));
    }

    #[test]
    fn test_compile_both_orders_dependencies() {
        let dir = standard();
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let compiled = compiler.compile(Path::new("both.yaml")).unwrap();
        let names: Vec<&str> = compiled.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["base.yaml", "ext1.yaml", "ext2.yaml", "both.yaml"]);
        let pool = compiled.pool().unwrap();
        assert_eq!(pool.extensions_of("xcompat.Envelope").count(), 4);
    }

    #[test]
    fn test_source_name_strips_include_prefix() {
        let dir = standard();
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let full = dir.path().join("ext2.yaml");
        assert_eq!(compiler.source_name(&full).unwrap(), "ext2.yaml");
    }

    #[test]
    fn test_missing_import_reports_search_path() {
        let dir = workspace(&[("ext1.yaml", EXT1)]);
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        match compiler.compile(Path::new("ext1.yaml")).unwrap_err() {
            CompileError::NotFound { name, .. } => assert_eq!(name, "base.yaml"),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[test]
    fn test_import_cycle_detected() {
        let dir = workspace(&[
            ("a.yaml", "package: a\nimports: [b.yaml]\n"),
            ("b.yaml", "package: b\nimports: [a.yaml]\n"),
        ]);
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        match compiler.compile(Path::new("a.yaml")).unwrap_err() {
            CompileError::ImportCycle { chain } => assert_eq!(chain, "a.yaml -> b.yaml -> a.yaml"),
            other => panic!("expected ImportCycle, got {other}"),
        }
    }

    #[test]
    fn test_extension_out_of_range() {
        let bad = r#"
package: xcompat.bad
imports: [base.yaml]
extensions:
  - extendee: Envelope
    fields:
      - { name: late, number: 250, type: bool }
"#;
        let dir = workspace(&[("base.yaml", BASE), ("bad.yaml", bad)]);
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let problems = semantic_problems(compiler.compile(Path::new("bad.yaml")).unwrap_err());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("outside the extension ranges"));
    }

    #[test]
    fn test_unknown_extendee() {
        let bad = r#"
package: xcompat.bad
imports: [base.yaml]
extensions:
  - extendee: Missing
    fields:
      - { name: x, number: 100, type: bool }
"#;
        let dir = workspace(&[("base.yaml", BASE), ("bad.yaml", bad)]);
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let problems = semantic_problems(compiler.compile(Path::new("bad.yaml")).unwrap_err());
        assert!(problems[0].contains("'Missing'"));
    }

    #[test]
    fn test_extendee_must_be_imported_directly() {
        let indirect = r#"
package: xcompat.indirect
imports: [both.yaml]
extensions:
  - extendee: .xcompat.Envelope
    fields:
      - { name: x, number: 150, type: bool }
"#;
        let dir = standard();
        fs::write(dir.path().join("indirect.yaml"), indirect).unwrap();
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        assert!(matches!(
            compiler.compile(Path::new("indirect.yaml")),
            Err(CompileError::Semantic { .. })
        ));
    }

    #[test]
    fn test_collects_all_message_problems() {
        let bad = r#"
package: xcompat
messages:
  - name: Broken
    fields:
      - { name: a, number: 1, type: int32 }
      - { name: a, number: 1, type: int32 }
      - { name: r, number: 19500, type: int32 }
      - { name: p, number: 4, type: string, label: repeated, packed: true }
      - { name: q, number: 5, type: int32, packed: true }
      - { name: inside, number: 120, type: int32 }
    extension_ranges:
      - { start: 100, end: 199 }
      - { start: 150, end: 250 }
"#;
        let dir = workspace(&[("bad.yaml", bad)]);
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let problems = semantic_problems(compiler.compile(Path::new("bad.yaml")).unwrap_err());
        let joined = problems.join("\n");
        assert!(joined.contains("declared twice"), "{joined}");
        assert!(joined.contains("reuses number 1"), "{joined}");
        assert!(joined.contains("is reserved"), "{joined}");
        assert!(joined.contains("cannot be packed"), "{joined}");
        assert!(joined.contains("packed but not repeated"), "{joined}");
        assert!(joined.contains("inside an extension range"), "{joined}");
        assert!(joined.contains("overlaps"), "{joined}");
    }

    #[test]
    fn test_required_extension_rejected() {
        let bad = r#"
package: xcompat.bad
imports: [base.yaml]
extensions:
  - extendee: Envelope
    fields:
      - { name: must, number: 120, type: int32, label: required }
"#;
        let dir = workspace(&[("base.yaml", BASE), ("bad.yaml", bad)]);
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let problems = semantic_problems(compiler.compile(Path::new("bad.yaml")).unwrap_err());
        assert!(problems[0].contains("cannot be required"));
    }

    #[test]
    fn test_cross_file_conflict_is_descriptor_error() {
        let clash = r#"
package: xcompat.clash
imports: [base.yaml]
extensions:
  - extendee: Envelope
    fields:
      - { name: other, number: 100, type: int64 }
"#;
        let root = "package: xcompat.root\nimports: [ext1.yaml, clash.yaml]\n";
        let dir = standard();
        fs::write(dir.path().join("clash.yaml"), clash).unwrap();
        fs::write(dir.path().join("root.yaml"), root).unwrap();
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        match compiler.compile(Path::new("root.yaml")).unwrap_err() {
            CompileError::Descriptor { file, source } => {
                assert_eq!(file, "clash.yaml");
                assert!(matches!(source, DescriptorError::ExtensionConflict { number: 100, .. }));
            }
            other => panic!("expected Descriptor error, got {other}"),
        }
    }

    #[test]
    fn test_include_path_order_first_wins() {
        let first = standard();
        let second = workspace(&[("base.yaml", "package: shadow\n")]);
        let compiler = SchemaCompiler::new([first.path(), second.path()]).unwrap();
        let compiled = compiler.compile(Path::new("base.yaml")).unwrap();
        assert_eq!(compiled.root().unwrap().package, "xcompat");
    }

    #[test]
    fn test_compile_all_writes_bindings() {
        let dir = standard();
        let out = tempfile::tempdir().unwrap();
        let compiler = SchemaCompiler::new([dir.path()]).unwrap();
        let sources: Vec<PathBuf> = ["base.yaml", "ext1.yaml", "ext2.yaml", "both.yaml"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let written = compiler.compile_all(&sources, out.path()).unwrap();
        assert_eq!(written.len(), 4);
        for path in &written {
            let loaded = CompiledSchema::load(path).unwrap();
            assert!(loaded.pool().is_ok());
        }
        assert!(out.path().join("both.desc.json").is_file());
    }

    #[test]
    fn test_resolve_extendee_scopes() {
        let envelope = MessageDescriptor {
            full_name: "xcompat.Envelope".into(),
            fields: vec![],
            extension_ranges: vec![],
        };
        let imported: BTreeMap<_, _> = [(envelope.full_name.clone(), envelope)].into();
        for reference in ["Envelope", "xcompat.Envelope", ".xcompat.Envelope"] {
            let found = resolve_extendee("xcompat.ext1", reference, &[], &imported);
            assert_eq!(found.map(|m| m.full_name.as_str()), Some("xcompat.Envelope"), "{reference}");
        }
        assert!(resolve_extendee("xcompat.ext1", ".Envelope", &[], &imported).is_none());
    }
}
