//! Source identity and location types shared by every pipeline stage.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

/// Identity of a source file across the whole pipeline.
///
/// A `FileId` wraps the *canonical absolute path* of the file; two imports
/// that resolve to the same path (through different aliases or roots) share
/// one `FileId`. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(Arc<PathBuf>);

impl FileId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileId(Arc::new(path.into()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// The file stem, used when emitted subckt names need disambiguation.
    pub fn stem(&self) -> &str {
        self.0.file_stem().and_then(|s| s.to_str()).unwrap_or("file")
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.display().to_string())
    }
}

/// A half-open region of a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn point(line: u32, col: u32) -> Self {
        Span {
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }

    pub fn of_token(line: u32, col: u32, len: usize) -> Self {
        Span {
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col + len as u32,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Best-effort locator for authored tokens.
///
/// The YAML loader hands us structured values without positions, so
/// diagnostics recover spans by scanning the original text for the token
/// they talk about. The first occurrence wins; a token that cannot be found
/// simply yields no span, which the renderers tolerate.
#[derive(Debug, Clone, Default)]
pub struct SourceText {
    text: Arc<str>,
}

impl SourceText {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        SourceText { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Find `token` appearing as a standalone word and return its span.
    pub fn locate(&self, token: &str) -> Option<Span> {
        if token.is_empty() {
            return None;
        }
        for (idx, line) in self.text.lines().enumerate() {
            let mut from = 0;
            while let Some(pos) = line[from..].find(token) {
                let at = from + pos;
                let before_ok = at == 0 || !is_word_char(line.as_bytes()[at - 1]);
                let end = at + token.len();
                let after_ok = end >= line.len() || !is_word_char(line.as_bytes()[end]);
                if before_ok && after_ok {
                    return Some(Span::of_token(idx as u32 + 1, at as u32 + 1, token.len()));
                }
                from = at + 1;
            }
        }
        None
    }
}

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_finds_whole_words_only() {
        let src = SourceText::new("modules:\n  inv:\n    instances:\n      MN: nfet m=1\n");
        let span = src.locate("MN").unwrap();
        assert_eq!(span.start_line, 4);
        assert_eq!(span.start_col, 7);
        // `inv` must not match inside `instances`... it does not: standalone word check.
        let span = src.locate("inv").unwrap();
        assert_eq!(span.start_line, 2);
    }

    #[test]
    fn locate_missing_token() {
        let src = SourceText::new("a b c");
        assert!(src.locate("missing").is_none());
    }

    #[test]
    fn file_id_orders_by_path() {
        let a = FileId::new("/a/x.asdl");
        let b = FileId::new("/b/x.asdl");
        assert!(a < b);
        assert_eq!(a, FileId::new("/a/x.asdl"));
    }
}
