//! Record marker resequencing.

use std::fs;
use std::path::Path;

use crate::error::SqonError;

/// Rewrite every `#<digits>` record marker inside `@records ... @end` to
/// `#0`, `#1`, ... in order of appearance. All other bytes are kept as is,
/// line endings and indentation included.
pub fn renumber_records(text: &str) -> String {
    renumber(text).0
}

/// Renumber the records of a file in place. Returns how many markers were
/// rewritten.
pub fn renumber_file(path: impl AsRef<Path>) -> Result<usize, SqonError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| SqonError::io(path, e))?;
    let (rewritten, count) = renumber(&text);
    fs::write(path, rewritten).map_err(|e| SqonError::io(path, e))?;
    tracing::info!(path = %path.display(), records = count, "renumbered records");
    Ok(count)
}

fn renumber(text: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut in_records = false;
    let mut next = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        match trimmed {
            "@records" => in_records = true,
            "@end" => in_records = false,
            _ if in_records => {
                if let Some(rewritten) = rewrite_marker(line, next) {
                    out.push_str(&rewritten);
                    next += 1;
                    continue;
                }
            }
            _ => {}
        }
        out.push_str(line);
    }
    (out, next)
}

/// Replace the digits of a leading `#<digits>` marker, or `None` when the
/// line does not start with one.
fn rewrite_marker(line: &str, ordinal: usize) -> Option<String> {
    let indent = line.len() - line.trim_start().len();
    let rest = line[indent..].strip_prefix('#')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    Some(format!(
        "{}#{}{}",
        &line[..indent],
        ordinal,
        &rest[digits..]
    ))
}
