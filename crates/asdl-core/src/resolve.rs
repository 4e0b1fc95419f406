//! Import resolution: multi-file graph assembly and per-file name
//! environments.
//!
//! Files are read eagerly, parsed once, and cached in the program database
//! keyed by canonical path. A loading stack detects import cycles; a cycle
//! aborts only the descent into the offending target, never the whole
//! resolve.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use itertools::Itertools;

use crate::ast::{parse_document, Document};
use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink};
use crate::provider::FileProvider;
use crate::span::{FileId, SourceText};

/// The configured source extension, appended to import paths that omit one.
pub const SOURCE_EXTENSION: &str = "asdl";

/// Library roots in precedence order: CLI-provided first, then roots taken
/// from the environment.
#[derive(Debug, Clone, Default)]
pub struct SearchRoots {
    pub cli: Vec<PathBuf>,
    pub env: Vec<PathBuf>,
}

impl SearchRoots {
    fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.cli.iter().chain(self.env.iter())
    }
}

/// One parsed source file.
#[derive(Debug)]
pub struct SourceFile {
    pub doc: Document,
    pub text: SourceText,
}

/// Every parsed document of the invocation, keyed by canonical path in load
/// order. Loading the same inputs twice yields an equal database.
#[derive(Debug, Default)]
pub struct ProgramDatabase {
    pub files: IndexMap<FileId, SourceFile>,
    pub entry: Option<FileId>,
}

impl ProgramDatabase {
    pub fn get(&self, file: &FileId) -> Option<&SourceFile> {
        self.files.get(file)
    }

    pub fn entry_doc(&self) -> Option<&Document> {
        self.entry.as_ref().and_then(|f| self.files.get(f)).map(|s| &s.doc)
    }
}

/// Alias -> resolved file, per importing file.
pub type NameEnv = IndexMap<String, FileId>;

#[derive(Debug, Default)]
pub struct NameEnvMap {
    envs: HashMap<FileId, NameEnv>,
}

impl NameEnvMap {
    pub fn env(&self, file: &FileId) -> Option<&NameEnv> {
        self.envs.get(file)
    }
}

/// Resolve the whole program reachable from `entry_path`.
pub fn resolve_program(
    entry_path: &Path,
    roots: &SearchRoots,
    provider: &dyn FileProvider,
    sink: &mut DiagnosticSink,
) -> (ProgramDatabase, NameEnvMap) {
    let mut db = ProgramDatabase::default();
    let mut envs = NameEnvMap::default();

    let entry = match canonicalize_entry(entry_path, provider) {
        Ok(entry) => entry,
        Err(probes) => {
            sink.push(
                Diagnostic::new(
                    DiagCode::ImportNotFound,
                    format!("entry file '{}' not found", entry_path.display()),
                )
                .with_note(probe_note(&probes)),
            );
            return (db, envs);
        }
    };

    let mut stack = Vec::new();
    load_file(entry.clone(), roots, provider, &mut db, &mut envs, &mut stack, sink);
    db.entry = Some(entry);
    (db, envs)
}

/// The entry path is taken as authored; the configured extension is tried
/// when the bare path does not exist.
fn canonicalize_entry(
    entry: &Path,
    provider: &dyn FileProvider,
) -> Result<FileId, Vec<PathBuf>> {
    let mut probes = vec![entry.to_path_buf()];
    if entry.extension().is_none() {
        probes.push(entry.with_extension(SOURCE_EXTENSION));
    }
    for probe in &probes {
        if provider.exists(probe) {
            if let Ok(canonical) = provider.canonicalize(probe) {
                return Ok(FileId::new(canonical));
            }
        }
    }
    Err(probes)
}

fn load_file(
    file: FileId,
    roots: &SearchRoots,
    provider: &dyn FileProvider,
    db: &mut ProgramDatabase,
    envs: &mut NameEnvMap,
    stack: &mut Vec<FileId>,
    sink: &mut DiagnosticSink,
) {
    let text = match provider.read_file(file.path()) {
        Ok(text) => text,
        Err(err) => {
            sink.push(
                Diagnostic::new(DiagCode::ImportParseFailed, err.to_string())
                    .with_file(file.clone()),
            );
            return;
        }
    };
    let doc = match parse_document(&text) {
        Ok(doc) => doc,
        Err(message) => {
            sink.push(
                Diagnostic::new(
                    DiagCode::ImportParseFailed,
                    format!("failed to parse document: {message}"),
                )
                .with_file(file.clone()),
            );
            return;
        }
    };

    let source = SourceText::new(text);
    let imports: Vec<(String, String)> = doc.imports.0.clone();
    db.files.insert(
        file.clone(),
        SourceFile {
            doc,
            text: source.clone(),
        },
    );

    stack.push(file.clone());
    let importing_dir = file
        .path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut env = NameEnv::new();
    let mut seen_aliases: HashSet<String> = HashSet::new();
    for (alias, logical) in imports {
        let alias_span = source.locate(&alias);
        if !seen_aliases.insert(alias.clone()) {
            sink.push(
                Diagnostic::new(
                    DiagCode::DuplicateImportAlias,
                    format!("import alias '{alias}' is declared more than once"),
                )
                .with_file(file.clone())
                .with_span(alias_span),
            );
            continue;
        }

        let probes = probe_paths(&logical, &importing_dir, roots);
        let mut matches: Vec<FileId> = Vec::new();
        for probe in &probes {
            if provider.exists(probe) {
                if let Ok(canonical) = provider.canonicalize(probe) {
                    let id = FileId::new(canonical);
                    if !matches.contains(&id) {
                        matches.push(id);
                    }
                }
            }
        }

        let target = match matches.first() {
            None => {
                sink.push(
                    Diagnostic::new(
                        DiagCode::ImportNotFound,
                        format!("import '{logical}' not found"),
                    )
                    .with_file(file.clone())
                    .with_span(alias_span)
                    .with_note(probe_note(&probes)),
                );
                continue;
            }
            Some(first) => {
                if matches.len() > 1 {
                    sink.push(
                        Diagnostic::new(
                            DiagCode::AmbiguousImport,
                            format!(
                                "import '{logical}' resolves to {} different files",
                                matches.len()
                            ),
                        )
                        .with_file(file.clone())
                        .with_span(alias_span)
                        .with_note(format!(
                            "candidates: {}",
                            matches.iter().map(FileId::to_string).join(", ")
                        )),
                    );
                }
                first.clone()
            }
        };

        if let Some(start) = stack.iter().position(|f| *f == target) {
            let mut cycle: Vec<&str> = stack[start..].iter().map(FileId::stem).collect();
            cycle.push(target.stem());
            sink.push(
                Diagnostic::new(
                    DiagCode::CircularImport,
                    format!("circular import: {}", cycle.join(" -> ")),
                )
                .with_file(file.clone())
                .with_span(alias_span),
            );
            continue;
        }

        if !db.files.contains_key(&target) {
            load_file(
                target.clone(),
                roots,
                provider,
                db,
                envs,
                stack,
                sink,
            );
        }
        if db.files.contains_key(&target) {
            env.insert(alias, target);
        }
    }

    stack.pop();
    envs.envs.insert(file, env);
}

/// Enumerate probe paths for one logical import, in precedence order:
/// CLI roots, environment roots, then the importing file's directory for
/// `./`- and `../`-prefixed paths.
fn probe_paths(logical: &str, importing_dir: &Path, roots: &SearchRoots) -> Vec<PathBuf> {
    let with_ext = if Path::new(logical).extension().is_none() {
        format!("{logical}.{SOURCE_EXTENSION}")
    } else {
        logical.to_string()
    };

    let mut probes: Vec<PathBuf> = roots.iter().map(|root| root.join(&with_ext)).collect();
    if logical.starts_with("./") || logical.starts_with("../") {
        probes.push(importing_dir.join(&with_ext));
    }
    probes
}

fn probe_note(probes: &[PathBuf]) -> String {
    format!("searched: {}", probes.iter().map(|p| p.display()).join(", "))
}
