use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::parser::SectionKind;

/// Maximum number of diagnostics kept for one section of a parse.
pub const MAX_ERRORS_PER_SECTION: usize = 50;

/// A recoverable parse diagnostic.
///
/// `line` is the 1-based source line the diagnostic refers to, or `None` for
/// file-level problems (a missing section, for instance). `section` names
/// the section the diagnostic belongs to; stray top-level lines have none.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseError {
    pub line: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionKind>,
}

impl ParseError {
    pub fn at(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            line: Some(line),
            message: message.into(),
            section: None,
        }
    }

    pub fn file_level(message: impl Into<String>) -> Self {
        ParseError {
            line: None,
            message: message.into(),
            section: None,
        }
    }

    pub fn in_section(mut self, kind: SectionKind) -> Self {
        self.section = Some(kind);
        self
    }

    /// Serialize to JSON. `line` is always present (null for file-level errors).
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut v = serde_json::json!({
            "line":    self.line,
            "message": self.message,
        });
        if let Some(kind) = self.section {
            v["section"] = serde_json::Value::from(kind.name());
        }
        v
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Fatal errors. A parse that hits one of these produces no output at all.
#[derive(Debug, thiserror::Error)]
pub enum SqonError {
    /// Contradictory or incomplete setup, detected before or during the parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading or rewriting a source file failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SqonError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SqonError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Bounded diagnostic accumulator.
///
/// Holds at most [`MAX_ERRORS_PER_SECTION`] entries. The first push past the
/// cap replaces the last slot with a single overflow marker; later pushes are
/// dropped. A [pinned](ErrorList::pin) error counts toward the cap but is
/// never displaced.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    errors: Vec<ParseError>,
    pinned: Option<ParseError>,
    overflowed: bool,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&self) -> usize {
        MAX_ERRORS_PER_SECTION - usize::from(self.pinned.is_some())
    }

    pub fn push(&mut self, error: ParseError) {
        if self.errors.len() < self.room() {
            self.errors.push(error);
            return;
        }
        if !self.overflowed {
            self.mark_overflow();
        }
    }

    /// Keep `error` regardless of how many diagnostics arrive before or
    /// after it. Only the first pinned error is kept.
    pub fn pin(&mut self, error: ParseError) {
        if self.pinned.is_some() {
            return;
        }
        self.pinned = Some(error);
        if self.errors.len() > self.room() {
            self.errors.truncate(self.room());
            self.mark_overflow();
        }
    }

    fn mark_overflow(&mut self) {
        if !self.overflowed {
            tracing::warn!(
                cap = MAX_ERRORS_PER_SECTION,
                "error limit reached, further diagnostics dropped"
            );
        }
        self.overflowed = true;
        if let Some(last) = self.errors.last_mut() {
            *last = ParseError::file_level(format!(
                "too many errors (limit {}), remaining diagnostics omitted",
                MAX_ERRORS_PER_SECTION
            ));
        }
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ParseError>) {
        for e in errors {
            self.push(e);
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len() + usize::from(self.pinned.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.errors.iter().chain(self.pinned.iter())
    }

    pub fn into_vec(self) -> Vec<ParseError> {
        let mut errors = self.errors;
        errors.extend(self.pinned);
        errors
    }

    /// Mark every held diagnostic as belonging to `kind`.
    pub fn tag(&mut self, kind: SectionKind) {
        for e in self.errors.iter_mut().chain(self.pinned.iter_mut()) {
            e.section = Some(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_list_never_exceeds_cap() {
        let mut list = ErrorList::new();
        for i in 0..120 {
            list.push(ParseError::at(i + 1, format!("error {}", i)));
        }
        assert_eq!(list.len(), MAX_ERRORS_PER_SECTION);
        assert!(list.overflowed());
        let errors = list.into_vec();
        assert!(errors[MAX_ERRORS_PER_SECTION - 1]
            .message
            .contains("too many errors"));
        assert_eq!(errors[0].message, "error 0");
    }

    #[test]
    fn error_list_at_cap_without_overflow_keeps_all() {
        let mut list = ErrorList::new();
        for i in 0..MAX_ERRORS_PER_SECTION as u32 {
            list.push(ParseError::at(i + 1, "e"));
        }
        assert!(!list.overflowed());
        assert!(list.iter().all(|e| e.message == "e"));
    }

    #[test]
    fn pinned_error_survives_overflow_before_and_after() {
        let mut list = ErrorList::new();
        for i in 0..60 {
            list.push(ParseError::at(i + 1, "junk"));
        }
        list.pin(ParseError::at(100, "limit reached"));
        for i in 0..10 {
            list.push(ParseError::at(200 + i, "late"));
        }
        assert_eq!(list.len(), MAX_ERRORS_PER_SECTION);
        let errors = list.into_vec();
        assert_eq!(errors.last().unwrap().message, "limit reached");
        assert_eq!(
            errors.iter().filter(|e| e.message.contains("too many errors")).count(),
            1
        );
        assert!(errors.iter().all(|e| e.message != "late"));
    }

    #[test]
    fn pinned_error_reserves_a_slot_when_list_is_short() {
        let mut list = ErrorList::new();
        list.pin(ParseError::at(1, "limit reached"));
        list.pin(ParseError::at(2, "second pin ignored"));
        for i in 0..MAX_ERRORS_PER_SECTION as u32 {
            list.push(ParseError::at(i + 10, "e"));
        }
        assert_eq!(list.len(), MAX_ERRORS_PER_SECTION);
        assert!(list.overflowed());
        assert!(list.iter().any(|e| e.message == "limit reached"));
        assert!(list.iter().all(|e| e.message != "second pin ignored"));
    }

    #[test]
    fn json_line_is_null_for_file_level_errors() {
        let v = ParseError::file_level("missing @records section").to_json_value();
        assert!(v["line"].is_null());
        let v = ParseError::at(3, "unknown command").to_json_value();
        assert_eq!(v["line"], 3);
        assert!(v.get("section").is_none());
        let v = ParseError::at(4, "bad marker")
            .in_section(SectionKind::Records)
            .to_json_value();
        assert_eq!(v["section"], "records");
    }

    #[test]
    fn display_includes_line() {
        assert_eq!(
            ParseError::at(7, "unexpected @end").to_string(),
            "line 7: unexpected @end"
        );
    }
}
