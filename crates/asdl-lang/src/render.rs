//! Terminal rendering of diagnostics with `ariadne`.
//!
//! The source is re-read from disk at render time; when that fails (or the
//! diagnostic carries no span) the report falls back to plain `eprintln!`.

use std::ops::Range;

use ariadne::{Label, Report, ReportKind, Source};

use asdl_core::{Diagnostic, Severity, Span};

/// Render one diagnostic as a colored report, or plainly when no source is
/// available.
pub fn render_diagnostic(diag: &Diagnostic) {
    let Some(file) = &diag.file else {
        eprintln!("{diag}");
        return;
    };
    let Some(span) = &diag.span else {
        eprintln!("{diag}");
        return;
    };
    let Ok(source) = std::fs::read_to_string(file.path()) else {
        eprintln!("{diag}");
        return;
    };
    let Some(range) = byte_range(&source, span) else {
        eprintln!("{diag}");
        return;
    };

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    };

    let path = file.to_string();
    let mut report = Report::build(kind, (path.clone(), range.clone()))
        .with_code(diag.code)
        .with_message(&diag.message)
        .with_label(Label::new((path.clone(), range)).with_message(&diag.message));
    for note in &diag.notes {
        report = report.with_note(note);
    }
    let _ = report.finish().eprint((path, Source::from(source)));
}

/// Translate a 1-based line/column span into a byte range of `source`.
fn byte_range(source: &str, span: &Span) -> Option<Range<usize>> {
    let mut offset = 0usize;
    let mut begin = None;
    let mut end = None;
    for (idx, line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        if line_no == span.start_line {
            begin = Some(offset + span.start_col.saturating_sub(1) as usize);
        }
        if line_no == span.end_line {
            end = Some(offset + span.end_col.saturating_sub(1) as usize);
            break;
        }
        offset += line.len() + 1;
    }
    match (begin, end) {
        (Some(b), Some(e)) if b < e && e <= source.len() => Some(b..e),
        _ => None,
    }
}
