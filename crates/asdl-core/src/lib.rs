//! Core compilation pipeline for the ASDL analog topology language.
//!
//! The pipeline is a pure, strictly sequential function from sources to a
//! graph: import resolution builds the program database and per-file name
//! environments; lowering produces the patterned graph; atomization
//! materializes the pattern-free graph; verification checks it. Netlist
//! emission lives in `asdl-netlist`, orchestration in `asdl-lang`.
//!
//! Every stage takes an explicit [`DiagnosticSink`] and never surfaces
//! user-facing failures as errors or panics. A stage's result is only
//! consumed downstream when no error diagnostics were produced upstream.

pub mod ast;
pub mod atomize;
pub mod diagnostics;
pub mod graph;
pub mod ids;
pub mod lower;
pub mod pattern;
pub mod provider;
pub mod resolve;
pub mod span;
pub mod vars;
pub mod verify;

pub use atomize::{atomize_program, AtomizedModule, AtomizedProgram};
pub use diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity, WithDiagnostics};
pub use graph::{ModuleGraph, ProgramGraph, SymbolRef};
pub use ids::{DeviceId, EndpointId, ExprId, IdAllocator, InstId, ModuleId, NetId};
pub use lower::lower_program;
pub use pattern::DEFAULT_MAX_EXPANSION;
pub use provider::{DefaultFileProvider, FileProvider, FileProviderError, InMemoryFileProvider};
pub use resolve::{resolve_program, NameEnvMap, ProgramDatabase, SearchRoots, SOURCE_EXTENSION};
pub use span::{FileId, Span};
pub use verify::{resolve_top, verify_program, VerifyOptions};
