//! The diagnostics bus: structured, append-only, deterministically ordered.
//!
//! Every pipeline stage takes a [`DiagnosticSink`] and returns a value next
//! to whatever it pushed; user-facing failures are never surfaced as panics
//! or `Err` values out of the core. The sink appends in arrival order and is
//! sorted exactly once when the results are handed to a consumer.

use serde::Serialize;

use crate::span::{FileId, Span};

/// Severity of a diagnostic. Orders errors before warnings before infos,
/// which is also the primary sort key for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Diagnostic kinds, independent of any numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DiagCode {
    // Lexical / parse
    InvalidPatternSyntax,
    InvalidInstanceExpression,
    InvalidEndpointExpression,
    // Naming
    DuplicateName,
    DuplicateImportAlias,
    AtomNameCollision,
    // References
    UnknownImportAlias,
    UnresolvedReference,
    ImportNotFound,
    CircularImport,
    AmbiguousImport,
    ImportParseFailed,
    UndefinedVariable,
    TopNotFound,
    AmbiguousTop,
    // Structure
    UnknownPort,
    MissingPort,
    WildcardNotAllowed,
    EndpointMissingDot,
    DuplicateEndpointBinding,
    RecursiveInstantiation,
    // Patterns
    DuplicateAxisId,
    AxisSizeMismatch,
    BindingLengthMismatch,
    ExpansionTooLarge,
    // Emission
    UnresolvedPlaceholder,
    UnknownModel,
    UnconnectedPort,
    UnknownParam,
    // Lints
    UnusedImport,
    VariableShadowsParameter,
}

impl DiagCode {
    /// The severity this kind carries unless a caller overrides it.
    pub fn default_severity(self) -> Severity {
        use DiagCode::*;
        match self {
            UnusedImport => Severity::Info,
            VariableShadowsParameter | UnknownParam => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for DiagCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One structured diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub severity: Severity,
    pub file: Option<FileId>,
    pub span: Option<Span>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: DiagCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: code.default_severity(),
            file: None,
            span: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: FileId) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Sort key defined by the output contract:
    /// `(severity, file_id, start line, start column, code)`.
    fn sort_key(&self) -> (Severity, Option<&FileId>, u32, u32, DiagCode) {
        let (line, col) = self
            .span
            .map(|s| (s.start_line, s.start_col))
            .unwrap_or((0, 0));
        (self.severity, self.file.as_ref(), line, col, self.code)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: ", self.severity, self.code)?;
        if let Some(file) = &self.file {
            write!(f, "{file}")?;
            if let Some(span) = &self.span {
                write!(f, ":{span}")?;
            }
            write!(f, " ")?;
        }
        write!(f, "{}", self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

/// Append-only collector threaded through the pipeline as an explicit
/// parameter.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diags: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        log::debug!("diagnostic: {}: {}", diag.code, diag.message);
        self.diags.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diags.iter().filter(|d| d.is_error()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    /// Consume the sink, producing the deterministic output order. The sort
    /// is stable, so diagnostics that compare equal keep arrival order.
    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut diags = self.diags;
        diags.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        diags
    }
}

/// A stage result: the produced value (if the stage could produce one) plus
/// the diagnostics that surfaced on the way.
#[derive(Debug, Clone)]
pub struct WithDiagnostics<T> {
    pub output: Option<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> WithDiagnostics<T> {
    pub fn success(output: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            output: Some(output),
            diagnostics,
        }
    }

    pub fn failure(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            output: None,
            diagnostics,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// `true` when a value was produced and no error diagnostic exists.
    pub fn is_success(&self) -> bool {
        self.output.is_some() && !self.has_errors()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WithDiagnostics<U> {
        WithDiagnostics {
            output: self.output.map(f),
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_severities() {
        assert_eq!(DiagCode::UnusedImport.default_severity(), Severity::Info);
        assert_eq!(
            DiagCode::VariableShadowsParameter.default_severity(),
            Severity::Warning
        );
        assert_eq!(DiagCode::UnknownPort.default_severity(), Severity::Error);
    }

    #[test]
    fn sink_sorts_errors_first_then_location() {
        let file_a = FileId::new("/a.asdl");
        let file_b = FileId::new("/b.asdl");
        let mut sink = DiagnosticSink::new();
        sink.push(
            Diagnostic::new(DiagCode::UnusedImport, "late info")
                .with_file(file_a.clone())
                .with_span(Some(Span::point(1, 1))),
        );
        sink.push(
            Diagnostic::new(DiagCode::UnknownPort, "error in b")
                .with_file(file_b.clone())
                .with_span(Some(Span::point(9, 1))),
        );
        sink.push(
            Diagnostic::new(DiagCode::UnknownPort, "error in a")
                .with_file(file_a)
                .with_span(Some(Span::point(2, 4))),
        );

        let sorted = sink.into_sorted();
        assert_eq!(sorted[0].message, "error in a");
        assert_eq!(sorted[1].message, "error in b");
        assert_eq!(sorted[2].message, "late info");
    }

    #[test]
    fn with_diagnostics_success_requires_no_errors() {
        let ok: WithDiagnostics<u32> = WithDiagnostics::success(1, vec![]);
        assert!(ok.is_success());

        let softly: WithDiagnostics<u32> = WithDiagnostics::success(
            1,
            vec![Diagnostic::new(DiagCode::UnusedImport, "unused import")],
        );
        assert!(softly.is_success());

        let broken: WithDiagnostics<u32> = WithDiagnostics::success(
            1,
            vec![Diagnostic::new(DiagCode::UnknownPort, "boom")],
        );
        assert!(!broken.is_success());
    }
}
