//! Compilation driver: resolve -> lower -> atomize -> verify -> emit.
//!
//! Stages are strictly gated: a stage runs only when no upstream stage
//! produced an error diagnostic. Within a stage, recovery is per entity;
//! between stages, the failing path stops and the diagnostics are returned
//! in their deterministic order.

pub mod render;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use asdl_core::provider::{DefaultFileProvider, FileProvider};
use asdl_core::resolve::SearchRoots;
use asdl_core::{
    atomize_program, lower_program, resolve_program, resolve_top, verify_program,
    DiagnosticSink, IdAllocator, VerifyOptions, WithDiagnostics, DEFAULT_MAX_EXPANSION,
};
use asdl_netlist::{dump_schematic, emit_netlist, BackendRegistry, EmitOptions};

pub use asdl_core::Diagnostic;
pub use asdl_netlist::DEFAULT_BACKEND;
pub use render::render_diagnostic;

/// Environment variable carrying extra library roots (path-list separated).
pub const ENV_ROOTS: &str = "ASDL_PATH";
/// Environment variable naming the backend registry file.
pub const ENV_BACKENDS: &str = "ASDL_BACKENDS";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// `-I` roots, highest precedence first.
    pub roots: Vec<PathBuf>,
    /// Roots taken from [`ENV_ROOTS`], after the CLI roots.
    pub env_roots: Vec<PathBuf>,
    pub backend: String,
    pub registry: BackendRegistry,
    /// Run the verification passes (on unless `--no-verify`).
    pub verify: bool,
    /// Override of the backend's `top_as_subckt` flag.
    pub top_as_subckt: Option<bool>,
    pub max_expansion: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            roots: Vec::new(),
            env_roots: Vec::new(),
            backend: DEFAULT_BACKEND.to_string(),
            registry: BackendRegistry::builtin(),
            verify: true,
            top_as_subckt: None,
            max_expansion: DEFAULT_MAX_EXPANSION,
        }
    }
}

/// A successful compilation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub netlist: String,
    /// Output extension of the selected backend, dot included.
    pub extension: String,
}

/// Compile `entry` against the real file system.
pub fn compile(entry: &Path, options: &CompileOptions) -> WithDiagnostics<CompileOutput> {
    compile_with_provider(entry, options, &DefaultFileProvider)
}

/// Compile `entry` with any [`FileProvider`].
pub fn compile_with_provider(
    entry: &Path,
    options: &CompileOptions,
    provider: &dyn FileProvider,
) -> WithDiagnostics<CompileOutput> {
    let mut sink = DiagnosticSink::new();
    let roots = SearchRoots {
        cli: options.roots.clone(),
        env: options.env_roots.clone(),
    };

    log::debug!("compiling {}", entry.display());
    let (db, envs) = resolve_program(entry, &roots, provider, &mut sink);
    if sink.has_errors() {
        return WithDiagnostics::failure(sink.into_sorted());
    }

    let mut alloc = IdAllocator::default();
    let graph = lower_program(&db, &envs, &mut alloc, options.max_expansion, &mut sink);
    if sink.has_errors() {
        return WithDiagnostics::failure(sink.into_sorted());
    }

    let atomized = atomize_program(&graph, &mut alloc, options.max_expansion, &mut sink);
    if sink.has_errors() {
        return WithDiagnostics::failure(sink.into_sorted());
    }

    if options.verify {
        verify_program(&graph, &atomized, &VerifyOptions::default(), &mut sink);
        if sink.has_errors() {
            return WithDiagnostics::failure(sink.into_sorted());
        }
    }

    let Some(top) = resolve_top(&db, &graph, &mut sink) else {
        return WithDiagnostics::failure(sink.into_sorted());
    };

    let extension = options
        .registry
        .get(&options.backend)
        .map(|cfg| cfg.extension.clone())
        .unwrap_or_default();
    let emit_opts = EmitOptions {
        top_as_subckt: options.top_as_subckt,
    };
    let netlist = emit_netlist(
        &graph,
        &atomized,
        top,
        &options.backend,
        &options.registry,
        &emit_opts,
        &mut sink,
    );

    match netlist {
        Some(netlist) => {
            WithDiagnostics::success(CompileOutput { netlist, extension }, sink.into_sorted())
        }
        None => WithDiagnostics::failure(sink.into_sorted()),
    }
}

/// Run the pipeline up to verification and return the atomized program as
/// JSON for downstream tooling (schematic viewers carry the group hints
/// emission ignores).
pub fn dump_graph(entry: &Path, options: &CompileOptions) -> WithDiagnostics<String> {
    dump_graph_with_provider(entry, options, &DefaultFileProvider)
}

pub fn dump_graph_with_provider(
    entry: &Path,
    options: &CompileOptions,
    provider: &dyn FileProvider,
) -> WithDiagnostics<String> {
    let mut sink = DiagnosticSink::new();
    let roots = SearchRoots {
        cli: options.roots.clone(),
        env: options.env_roots.clone(),
    };

    let (db, envs) = resolve_program(entry, &roots, provider, &mut sink);
    if sink.has_errors() {
        return WithDiagnostics::failure(sink.into_sorted());
    }
    let mut alloc = IdAllocator::default();
    let graph = lower_program(&db, &envs, &mut alloc, options.max_expansion, &mut sink);
    if sink.has_errors() {
        return WithDiagnostics::failure(sink.into_sorted());
    }
    let atomized = atomize_program(&graph, &mut alloc, options.max_expansion, &mut sink);
    if sink.has_errors() {
        return WithDiagnostics::failure(sink.into_sorted());
    }
    if options.verify {
        verify_program(&graph, &atomized, &VerifyOptions::default(), &mut sink);
        if sink.has_errors() {
            return WithDiagnostics::failure(sink.into_sorted());
        }
    }

    // A dump is useful even for programs without a nominated top.
    let mut top_sink = DiagnosticSink::new();
    let top = resolve_top(&db, &graph, &mut top_sink);

    let dump = dump_schematic(&graph, &atomized, top);
    let json = dump.to_json().expect("graph dump serializes");
    WithDiagnostics::success(json, sink.into_sorted())
}

/// Split a path-list environment value with the platform's separator.
pub fn split_root_list(value: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value).collect()
}

/// Load the backend registry: an explicit path wins, then [`ENV_BACKENDS`],
/// then the built-ins.
pub fn load_backend_registry(explicit: Option<&Path>) -> anyhow::Result<BackendRegistry> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var_os(ENV_BACKENDS).map(PathBuf::from),
    };
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("cannot read backend registry {}: {e}", path.display()))?;
            BackendRegistry::from_yaml(&text)
                .map_err(|e| anyhow::anyhow!("invalid backend registry {}: {e}", path.display()))
        }
        None => Ok(BackendRegistry::builtin()),
    }
}

/// Serialize diagnostics for machine consumption.
pub fn diagnostics_to_json(diags: &[Diagnostic]) -> String {
    serde_json::to_string_pretty(diags).expect("diagnostics serialize")
}
