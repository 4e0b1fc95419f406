use std::path::{Path, PathBuf};

use asdl_core::WithDiagnostics;
use asdl_lang::{compile, CompileOptions, CompileOutput};

/// Utility to build an isolated ASDL project for integration tests.
///
/// Wraps a [`tempfile::TempDir`] so each test gets its own sandbox on disk.
/// Test code adds files with [`Self::add_file`] and compiles an entry with
/// [`Self::compile`]. Panics on IO errors to keep tests concise.
pub struct TestProject {
    _temp_dir: tempfile::TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let _temp_dir = tempfile::tempdir().expect("create temp dir for test project");
        let root = _temp_dir
            .path()
            .canonicalize()
            .expect("canonicalize temp dir");
        Self { _temp_dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `contents` under `rel_path`, creating intermediate directories.
    pub fn add_file(&self, rel_path: impl AsRef<Path>, contents: &str) -> PathBuf {
        let path = self.root.join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write test file");
        path
    }

    /// Compile `rel_entry` with default options.
    pub fn compile(&self, rel_entry: &str) -> WithDiagnostics<CompileOutput> {
        self.compile_with(rel_entry, CompileOptions::default())
    }

    pub fn compile_with(
        &self,
        rel_entry: &str,
        options: CompileOptions,
    ) -> WithDiagnostics<CompileOutput> {
        compile(&self.root.join(rel_entry), &options)
    }
}
