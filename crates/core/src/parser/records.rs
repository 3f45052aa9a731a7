use serde::Serialize;
use serde_json::Value;

use super::{boundary, Boundary, SectionPass};
use crate::error::{ErrorList, ParseError};
use crate::lexer::{lex_lines, nesting_delta};
use crate::source::Line;
use crate::value::parse_tokens;

/// Records kept per parse unless configured otherwise.
pub const DEFAULT_MAX_RECORDS: usize = 500;

/// One record: its `#N` marker, the line the marker sits on, and its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub ordinal: u64,
    pub line: u32,
    pub value: Value,
}

/// Parses one `@records` section body.
pub(crate) struct RecordParser<'a> {
    lines: &'a [Line],
    pos: usize,
    max_records: usize,
    errors: ErrorList,
    documents: Vec<Document>,
    truncated: bool,
}

impl<'a> RecordParser<'a> {
    pub(crate) fn new(lines: &'a [Line], start: usize, max_records: usize) -> Self {
        RecordParser {
            lines,
            pos: start,
            max_records,
            errors: ErrorList::new(),
            documents: Vec::new(),
            truncated: false,
        }
    }

    pub(crate) fn run(mut self) -> SectionPass<Vec<Document>> {
        let mut closed = false;
        while self.pos < self.lines.len() {
            let line = &self.lines[self.pos];
            match boundary(&line.text) {
                Some(Boundary::End) => {
                    self.pos += 1;
                    closed = true;
                    break;
                }
                Some(Boundary::Section) => break,
                None => {}
            }
            self.pos += 1;

            let Some(rest) = line.text.strip_prefix('#') else {
                self.errors.push(ParseError::at(
                    line.number,
                    format!("expected a record marker '#<n>', got '{}'", line.text),
                ));
                continue;
            };
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let (digits, body) = rest.split_at(digits_end);
            let ordinal = match digits.parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    self.errors.push(ParseError::at(
                        line.number,
                        format!("invalid record marker '#{}'", rest),
                    ));
                    // Skip whatever body follows so its lines are not
                    // reported one by one.
                    self.collect_body(line, body.trim());
                    continue;
                }
            };
            let Some(fragments) = self.collect_body(line, body.trim()) else {
                continue;
            };

            if self.documents.len() >= self.max_records {
                if !self.truncated {
                    self.truncated = true;
                    tracing::warn!(
                        limit = self.max_records,
                        line = line.number,
                        "record limit reached, remaining records ignored"
                    );
                    self.errors.pin(ParseError::at(
                        line.number,
                        format!(
                            "record limit of {} reached; record #{} and later records are ignored",
                            self.max_records, ordinal
                        ),
                    ));
                }
                continue;
            }

            let parsed = lex_lines(&fragments).and_then(|tokens| parse_tokens(&tokens));
            match parsed {
                Ok(value) => self.documents.push(Document {
                    ordinal,
                    line: line.number,
                    value,
                }),
                Err(e) => self.errors.push(ParseError::at(
                    e.line.unwrap_or(line.number),
                    format!("record #{}: {}", ordinal, e.message),
                )),
            }
        }
        SectionPass {
            value: self.documents,
            errors: self.errors,
            cursor: self.pos,
            closed,
        }
    }

    /// Gather the text of one record body, starting with what follows the
    /// marker. Continuation lines are consumed until brackets balance.
    ///
    /// Returns `None` (with an error recorded) when a marker, a section
    /// directive, or end of input arrives first.
    fn collect_body(&mut self, marker: &Line, first: &str) -> Option<Vec<Line>> {
        let mut fragments = Vec::new();
        let mut depth = 0;
        if !first.is_empty() {
            depth = nesting_delta(first);
            fragments.push(Line {
                number: marker.number,
                text: first.to_owned(),
            });
        }
        while fragments.is_empty() || depth > 0 {
            let next = self.lines.get(self.pos).filter(|l| {
                boundary(&l.text).is_none() && !l.text.starts_with('#')
            });
            let Some(next) = next else {
                self.errors.push(ParseError::at(
                    marker.number,
                    format!("record '{}' is not terminated", marker.text),
                ));
                return None;
            };
            self.pos += 1;
            depth += nesting_delta(&next.text);
            fragments.push(next.clone());
        }
        Some(fragments)
    }
}
