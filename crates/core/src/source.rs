//! Input sources and the line buffer.
//!
//! A parse reads from exactly one [`Source`]. Files are streamed line by
//! line; inline content is split in memory. Both paths go through
//! [`buffer_lines`], so trimming and empty-line filtering are identical.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::SqonError;

/// One trimmed, non-empty source line with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: u32,
    pub text: String,
}

/// Where the SQON text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Inline(String),
}

/// Buffered input: the filtered lines plus the raw byte size of the source.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    pub lines: Vec<Line>,
    pub byte_size: u64,
}

impl Source {
    /// Build a source from the optional path / content pair.
    ///
    /// Exactly one of the two must be given.
    pub fn from_parts(path: Option<&Path>, content: Option<&str>) -> Result<Self, SqonError> {
        match (path, content) {
            (Some(p), None) => Ok(Source::File(p.to_path_buf())),
            (None, Some(c)) => Ok(Source::Inline(c.to_owned())),
            (None, None) => Err(SqonError::Config(
                "either a file path or inline content must be provided".into(),
            )),
            (Some(_), Some(_)) => Err(SqonError::Config(
                "provide a file path or inline content, not both".into(),
            )),
        }
    }

    /// Read the source into a [`LineBuffer`].
    pub fn read(&self) -> Result<LineBuffer, SqonError> {
        match self {
            Source::File(path) => {
                let file = File::open(path).map_err(|e| SqonError::io(path, e))?;
                let byte_size = file
                    .metadata()
                    .map_err(|e| SqonError::io(path, e))?
                    .len();
                let lines = buffer_lines(BufReader::new(file).lines())
                    .map_err(|e| SqonError::io(path, e))?;
                Ok(LineBuffer { lines, byte_size })
            }
            Source::Inline(content) => {
                let lines = buffer_lines(content.lines().map(|l| Ok(l.to_owned())))
                    .map_err(|e| SqonError::io("<inline>", e))?;
                Ok(LineBuffer {
                    lines,
                    byte_size: content.len() as u64,
                })
            }
        }
    }
}

/// Trim every line and drop the empty ones, keeping original line numbers.
pub fn buffer_lines<I>(raw: I) -> Result<Vec<Line>, std::io::Error>
where
    I: Iterator<Item = Result<String, std::io::Error>>,
{
    let mut lines = Vec::new();
    for (idx, line) in raw.enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        lines.push(Line {
            number: idx as u32 + 1,
            text: text.to_owned(),
        });
    }
    Ok(lines)
}
