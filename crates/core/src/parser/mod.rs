//! Section orchestrator.
//!
//! Walks the buffered lines, handles the `*STRICT=` directive, enforces
//! section order, and hands each section body to its own sub-parser. Every
//! sub-parser returns its value, its own capped error list, and the cursor
//! to resume at.

mod records;
mod schema;
mod validations;

pub use records::{Document, DEFAULT_MAX_RECORDS};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::error::{ErrorList, ParseError, SqonError};
use crate::metadata::{MetadataCollector, ParsingMetadata};
use crate::rules::RuleSet;
use crate::schema::Schema;
use crate::source::{Line, LineBuffer, Source};
use crate::validate::{CustomValidators, Validator};
use records::RecordParser;
use schema::SchemaParser;
use validations::ValidationRuleParser;

// ──────────────────────────────────────────────
// Directives and section bookkeeping
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Schema,
    Validations,
    Records,
}

impl SectionKind {
    const ALL: [SectionKind; 3] = [
        SectionKind::Schema,
        SectionKind::Validations,
        SectionKind::Records,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SectionKind::Schema => "schema",
            SectionKind::Validations => "validations",
            SectionKind::Records => "records",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SectionKind::Schema => 0,
            SectionKind::Validations => 1,
            SectionKind::Records => 2,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive<'a> {
    Strict(&'a str),
    Open(SectionKind),
    End,
}

impl<'a> Directive<'a> {
    fn parse(text: &'a str) -> Option<Self> {
        if let Some(value) = text.strip_prefix("*STRICT=") {
            return Some(Directive::Strict(value.trim()));
        }
        match text {
            "@schema" => Some(Directive::Open(SectionKind::Schema)),
            "@validations" => Some(Directive::Open(SectionKind::Validations)),
            "@records" => Some(Directive::Open(SectionKind::Records)),
            "@end" => Some(Directive::End),
            _ => None,
        }
    }
}

/// Where a sub-parser must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boundary {
    /// `@end`: consumed by the sub-parser.
    End,
    /// Another section directive: left for the orchestrator.
    Section,
}

pub(crate) fn boundary(text: &str) -> Option<Boundary> {
    match Directive::parse(text)? {
        Directive::End => Some(Boundary::End),
        Directive::Open(_) => Some(Boundary::Section),
        Directive::Strict(_) => None,
    }
}

/// Result of one sub-parser run.
pub(crate) struct SectionPass<T> {
    pub value: T,
    pub errors: ErrorList,
    /// Index of the first line the orchestrator should look at next.
    pub cursor: usize,
    /// Whether the section's `@end` was found and consumed.
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SectionState {
    #[default]
    Unopened,
    Open,
    Closed,
}

#[derive(Debug, Default)]
struct Sections {
    schema: SectionState,
    validations: SectionState,
    records: SectionState,
}

impl Sections {
    fn get(&self, kind: SectionKind) -> SectionState {
        match kind {
            SectionKind::Schema => self.schema,
            SectionKind::Validations => self.validations,
            SectionKind::Records => self.records,
        }
    }

    fn set(&mut self, kind: SectionKind, state: SectionState) {
        match kind {
            SectionKind::Schema => self.schema = state,
            SectionKind::Validations => self.validations = state,
            SectionKind::Records => self.records = state,
        }
    }

    fn check_order(&self, kind: SectionKind) -> Result<(), String> {
        if self.get(kind) != SectionState::Unopened {
            return Err(format!("duplicate {} section", kind));
        }
        if kind != SectionKind::Schema && self.schema == SectionState::Unopened {
            return Err(format!("{} section requires a preceding @schema section", kind));
        }
        let later = SectionKind::ALL
            .into_iter()
            .find(|k| k.rank() > kind.rank() && self.get(*k) != SectionState::Unopened);
        match later {
            Some(later) => Err(format!("{} section must precede {}", kind, later)),
            None => Ok(()),
        }
    }
}

/// Skip a rejected section body: stop after its `@end`, or before the next
/// section directive.
fn skip_section(lines: &[Line], mut pos: usize) -> usize {
    while pos < lines.len() {
        match boundary(&lines[pos].text) {
            Some(Boundary::End) => return pos + 1,
            Some(Boundary::Section) => return pos,
            None => pos += 1,
        }
    }
    pos
}

// ──────────────────────────────────────────────
// Options and output
// ──────────────────────────────────────────────

/// Parse only one section; everything else is skipped unparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Schema,
    Records,
}

impl Focus {
    fn kind(&self) -> SectionKind {
        match self {
            Focus::Schema => SectionKind::Schema,
            Focus::Records => SectionKind::Records,
        }
    }
}

/// Parse configuration. Exactly one of `path` and `content` must be set.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub path: Option<PathBuf>,
    pub content: Option<String>,
    pub focus: Option<Focus>,
    pub max_records: usize,
    /// Run every record through the validation engine after parsing.
    pub validate_records: bool,
    pub custom: CustomValidators,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            path: None,
            content: None,
            focus: None,
            max_records: DEFAULT_MAX_RECORDS,
            validate_records: true,
            custom: CustomValidators::new(),
        }
    }
}

impl ParseOptions {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::default().path(path)
    }

    pub fn from_content(content: impl Into<String>) -> Self {
        Self::default().content(content)
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn focus(mut self, focus: Focus) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn validate_records(mut self, validate: bool) -> Self {
        self.validate_records = validate;
        self
    }

    pub fn custom<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.custom.register(name, predicate);
        self
    }

    pub fn custom_validators(mut self, custom: CustomValidators) -> Self {
        self.custom = custom;
        self
    }
}

/// File-wide settings from `*` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileRules {
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutput {
    pub file_rules: FileRules,
    pub schema: Schema,
    pub validations: RuleSet,
    pub records: Vec<Document>,
    /// Sorted by line; file-level errors last.
    pub errors: Vec<ParseError>,
    pub metadata: ParsingMetadata,
}

impl ParseOutput {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

/// One parse request over one buffered source.
#[derive(Debug)]
pub struct Parser {
    options: ParseOptions,
    buffer: LineBuffer,
}

/// Accumulated state of one orchestrator pass.
#[derive(Default)]
struct Collected {
    file_rules: FileRules,
    schema: Schema,
    rules: RuleSet,
    records: Vec<Document>,
    top: ErrorList,
    sections: Vec<(SectionKind, ErrorList)>,
}

impl Parser {
    /// Resolve the source and buffer its lines.
    pub fn new(options: ParseOptions) -> Result<Self, SqonError> {
        let source = Source::from_parts(options.path.as_deref(), options.content.as_deref())?;
        let buffer = source.read()?;
        tracing::debug!(
            lines = buffer.lines.len(),
            bytes = buffer.byte_size,
            "source buffered"
        );
        Ok(Parser { options, buffer })
    }

    pub fn lines(&self) -> &[Line] {
        &self.buffer.lines
    }

    pub fn parse(&self) -> Result<ParseOutput, SqonError> {
        let mut meta = MetadataCollector::start();
        let lines = self.lines();
        let focus = self.options.focus;
        let mut out = Collected::default();
        let mut states = Sections::default();
        let mut section_seen = false;
        let mut pos = 0;

        while pos < lines.len() {
            let line = &lines[pos];
            let Some(directive) = Directive::parse(&line.text) else {
                if focus.is_none() {
                    out.top.push(ParseError::at(
                        line.number,
                        format!("unknown command '{}'", line.text),
                    ));
                }
                pos += 1;
                continue;
            };

            match directive {
                Directive::Strict(value) => {
                    pos += 1;
                    if focus.is_some() {
                        if value == "TRUE" {
                            return Err(SqonError::Config(format!(
                                "*STRICT=TRUE on line {} cannot be combined with a focused parse",
                                line.number
                            )));
                        }
                        continue;
                    }
                    if section_seen {
                        out.top.push(ParseError::at(
                            line.number,
                            "*STRICT must appear before any section",
                        ));
                        continue;
                    }
                    match value {
                        "TRUE" => out.file_rules.strict = true,
                        "FALSE" => out.file_rules.strict = false,
                        other => out.top.push(ParseError::at(
                            line.number,
                            format!("invalid *STRICT value '{}', expected TRUE or FALSE", other),
                        )),
                    }
                }
                Directive::End => {
                    if focus.is_none() {
                        out.top
                            .push(ParseError::at(line.number, "unexpected @end"));
                    }
                    pos += 1;
                }
                Directive::Open(kind) => {
                    section_seen = true;
                    if let Some(focus) = focus {
                        if focus.kind() != kind {
                            pos = skip_section(lines, pos + 1);
                            continue;
                        }
                        self.run_section(kind, line, pos + 1, &mut out, &mut meta);
                        return Ok(self.finish(out, meta));
                    }
                    if let Err(msg) = states.check_order(kind) {
                        out.top.push(ParseError::at(line.number, msg).in_section(kind));
                        pos = skip_section(lines, pos + 1);
                        continue;
                    }
                    states.set(kind, SectionState::Open);
                    pos = self.run_section(kind, line, pos + 1, &mut out, &mut meta);
                    states.set(kind, SectionState::Closed);
                }
            }
        }

        if let Some(focus) = focus {
            out.top.push(
                ParseError::file_level(format!("missing {} section", focus.kind()))
                    .in_section(focus.kind()),
            );
            return Ok(self.finish(out, meta));
        }

        if states.schema == SectionState::Unopened {
            out.top.push(
                ParseError::file_level("missing @schema section").in_section(SectionKind::Schema),
            );
        } else if out.schema.is_empty() {
            out.top.push(
                ParseError::file_level("@schema section declares no fields")
                    .in_section(SectionKind::Schema),
            );
        }
        if out.records.is_empty() {
            let message = if states.records == SectionState::Unopened {
                "missing @records section"
            } else {
                "@records section contains no records"
            };
            out.top
                .push(ParseError::file_level(message).in_section(SectionKind::Records));
        }

        if self.options.validate_records && !out.schema.is_empty() && !out.records.is_empty() {
            let started = Instant::now();
            let errors = self.validate_records(&mut out);
            meta.section("record_validation", started.elapsed());
            out.sections.push((SectionKind::Records, errors));
        }

        Ok(self.finish(out, meta))
    }

    /// Run the sub-parser for `kind` starting at `start`; returns the cursor.
    fn run_section(
        &self,
        kind: SectionKind,
        directive: &Line,
        start: usize,
        out: &mut Collected,
        meta: &mut MetadataCollector,
    ) -> usize {
        tracing::debug!(section = kind.name(), line = directive.number, "parsing section");
        let started = Instant::now();
        let lines = self.lines();
        let (mut errors, cursor, closed) = match kind {
            SectionKind::Schema => {
                let pass = SchemaParser::new(lines, start).run();
                out.schema = pass.value;
                (pass.errors, pass.cursor, pass.closed)
            }
            SectionKind::Validations => {
                let pass = ValidationRuleParser::new(lines, start, &out.schema).run();
                out.rules = pass.value;
                (pass.errors, pass.cursor, pass.closed)
            }
            SectionKind::Records => {
                let pass = RecordParser::new(lines, start, self.options.max_records).run();
                out.records = pass.value;
                (pass.errors, pass.cursor, pass.closed)
            }
        };
        meta.section(kind.name(), started.elapsed());
        if !closed {
            errors.push(ParseError::at(
                directive.number,
                format!("{} section is not closed with @end", kind),
            ));
        }
        tracing::debug!(section = kind.name(), errors = errors.len(), cursor, "section done");
        out.sections.push((kind, errors));
        cursor
    }

    /// Check every record against the schema and rules, replacing each with
    /// its normalized copy.
    fn validate_records(&self, out: &mut Collected) -> ErrorList {
        let validator = Validator::new(&out.schema, &out.rules)
            .strict(out.file_rules.strict)
            .with_custom_validators(self.options.custom.clone());
        let values: Vec<Value> = out.records.iter().map(|d| d.value.clone()).collect();
        let ordinals: Vec<u64> = out.records.iter().map(|d| d.ordinal).collect();
        let reports = validator.validate_set(&values, |idx| format!("record #{}", ordinals[idx]));

        let mut errors = ErrorList::new();
        for (doc, report) in out.records.iter_mut().zip(reports) {
            for d in &report.diagnostics {
                errors.push(ParseError::at(
                    doc.line,
                    format!("record #{}: {}: {}", doc.ordinal, d.field, d.message),
                ));
            }
            if let Some(data) = report.data {
                doc.value = data;
            }
        }
        errors
    }

    fn finish(&self, out: Collected, meta: MetadataCollector) -> ParseOutput {
        let mut errors = out.top.into_vec();
        for (kind, mut list) in out.sections {
            list.tag(kind);
            errors.extend(list.into_vec());
        }
        errors.sort_by_key(|e| (e.line.is_none(), e.line));

        let metadata = meta.finish(
            self.buffer.byte_size,
            self.buffer.lines.len(),
            &out.schema,
            &out.rules,
            &out.records,
            errors.len(),
        );
        ParseOutput {
            file_rules: out.file_rules,
            schema: out.schema,
            validations: out.rules,
            records: out.records,
            errors,
            metadata,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTag;

    fn parse(src: &str) -> ParseOutput {
        Parser::new(ParseOptions::from_content(src))
            .unwrap()
            .parse()
            .unwrap()
    }

    fn messages(out: &ParseOutput) -> Vec<String> {
        out.errors.iter().map(|e| e.to_string()).collect()
    }

    const GOOD: &str = "\
*STRICT=TRUE
@schema
name: String
age: Number
@end
@validations
name: trim(), required
age: min(18)
@end
@records
#0 { name: '  Ann ', age: 30 }
#1 { name: 'Bo', age: 19 }
@end
";

    #[test]
    fn well_formed_input_has_no_errors() {
        let out = parse(GOOD);
        assert!(out.is_ok(), "{:?}", messages(&out));
        assert!(out.file_rules.strict);
        assert_eq!(out.schema.get("age").unwrap().ty, TypeTag::Number);
        assert_eq!(out.validations.rule_count(), 3);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].value["name"], "Ann");
        assert_eq!(out.metadata.record_count, 2);
        assert_eq!(out.metadata.field_count, 2);
    }

    #[test]
    fn validations_before_schema_is_one_error() {
        let out = parse("@validations\nage: min(1)\n@end\n@schema\nage: Number\n@end\n@records\n#0 {age: 3}\n@end");
        assert_eq!(messages(&out), vec!["line 1: @validations section requires a preceding @schema section"]);
        assert!(out.validations.is_empty());
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn order_and_duplicate_checks() {
        let out = parse("@schema\na: Number\n@end\n@records\n#0 {a: 1}\n@end\n@validations\na: min(0)\n@end\n@schema\nb: String\n@end");
        assert_eq!(
            messages(&out),
            vec![
                "line 7: @validations section must precede @records",
                "line 10: duplicate @schema section",
            ]
        );
        assert!(out.schema.get("b").is_none());
    }

    #[test]
    fn strict_directive_values_and_placement() {
        let out = parse("*STRICT=MAYBE\n@schema\na: Number\n@end\n@records\n#0 {a: 1}\n@end");
        assert_eq!(out.errors.len(), 1);
        assert!(!out.file_rules.strict);

        let out = parse("@schema\na: Number\n@end\n*STRICT=TRUE\n@records\n#0 {a: 1}\n@end");
        assert_eq!(messages(&out), vec!["line 4: *STRICT must appear before any section"]);
        assert!(!out.file_rules.strict);
    }

    #[test]
    fn stray_lines_and_end_markers() {
        let out = parse("hello\n@end\n@schema\na: Number\n@end\n@records\n#0 {a: 1}\n@end");
        assert_eq!(
            messages(&out),
            vec!["line 1: unknown command 'hello'", "line 2: unexpected @end"]
        );
    }

    #[test]
    fn missing_and_empty_sections_are_file_level() {
        let out = parse("@records\n#0 {a: 1}\n@end");
        let last = out.errors.last().unwrap();
        assert_eq!(last.line, None);
        assert!(messages(&out).contains(&"missing @schema section".to_string()));

        let out = parse("@schema\n@end\n@records\n@end");
        assert_eq!(
            messages(&out),
            vec![
                "@schema section declares no fields",
                "@records section contains no records"
            ]
        );

        let out = parse("@schema\na: Number\n@end");
        assert_eq!(messages(&out), vec!["missing @records section"]);
    }

    #[test]
    fn unclosed_section_is_reported_at_its_directive() {
        let out = parse("@schema\na: Number\n@records\n#0 {a: 1}\n@end");
        assert_eq!(messages(&out), vec!["line 1: @schema section is not closed with @end"]);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn record_validation_errors_carry_record_lines() {
        let out = parse("@schema\nage: Number\n@end\n@validations\nage: min(18)\n@end\n@records\n#4 {age: 10}\n#5 {age: 20}\n@end");
        assert_eq!(messages(&out), vec!["line 8: record #4: age: must be at least 18"]);

        let out = Parser::new(
            ParseOptions::from_content("@schema\nage: Number\n@end\n@validations\nage: min(18)\n@end\n@records\n#4 {age: 10}\n@end")
                .validate_records(false),
        )
        .unwrap()
        .parse()
        .unwrap();
        assert!(out.is_ok());
    }

    #[test]
    fn strict_mode_flags_undeclared_record_fields() {
        let out = parse("*STRICT=TRUE\n@schema\na: Number\n@end\n@records\n#0 {a: 1, b: 2}\n@end");
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].message.contains("record #0: b:"));
    }

    #[test]
    fn focus_parses_only_the_focused_section() {
        let src = "@validations\nbogus\n@end\n@schema\na: Number\n@end\n@records\n#0 {a: 1}\n@end";
        let out = Parser::new(ParseOptions::from_content(src).focus(Focus::Records))
            .unwrap()
            .parse()
            .unwrap();
        assert!(out.is_ok(), "{:?}", messages(&out));
        assert_eq!(out.records.len(), 1);
        assert!(out.schema.is_empty());

        let out = Parser::new(ParseOptions::from_content(src).focus(Focus::Schema))
            .unwrap()
            .parse()
            .unwrap();
        assert!(out.is_ok());
        assert!(out.records.is_empty());
        assert_eq!(out.schema.field_count(), 1);
    }

    #[test]
    fn strict_true_with_focus_is_fatal() {
        let err = Parser::new(ParseOptions::from_content("*STRICT=TRUE\n@schema\na: Number\n@end").focus(Focus::Schema))
            .unwrap()
            .parse()
            .unwrap_err();
        assert!(matches!(err, SqonError::Config(_)));
    }

    #[test]
    fn errors_are_sorted_by_line() {
        let out = parse("@schema\na: Strng\nb: Number\n@end\nnoise\n@records\n#0 {b: 1}\n@end");
        let lines: Vec<Option<u32>> = out.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![Some(2), Some(5)]);
    }

    #[test]
    fn custom_predicates_from_options() {
        let src = "@schema\ncode: String\n@end\n@validations\ncode: custom(upper)\n@end\n@records\n#0 {code: 'ab'}\n@end";
        let out = Parser::new(
            ParseOptions::from_content(src)
                .custom("upper", |v, _| v.as_str().is_some_and(|s| s.chars().all(char::is_uppercase))),
        )
        .unwrap()
        .parse()
        .unwrap();
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].message.contains("custom validator 'upper'"));
    }

    #[test]
    fn custom_validator_registry_from_options() {
        let mut registry = CustomValidators::new();
        registry.register("positive", |v, _| v.as_f64().is_some_and(|n| n > 0.0));
        let src = "@schema\nn: Number\n@end\n@validations\nn: custom(positive)\n@end\n@records\n#0 {n: 3}\n#1 {n: -1}\n@end";
        let out = Parser::new(ParseOptions::from_content(src).custom_validators(registry))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].message.starts_with("record #1: n:"));
    }

    #[test]
    fn errors_carry_their_section() {
        let out = parse("stray\n@schema\na: Nope\nb: Number\n@end\n@records\nnot a record\n#0 {b: 'x'}\n@end");
        let tagged: Vec<(Option<u32>, Option<SectionKind>)> =
            out.errors.iter().map(|e| (e.line, e.section)).collect();
        assert_eq!(
            tagged,
            vec![
                (Some(1), None),
                (Some(3), Some(SectionKind::Schema)),
                (Some(7), Some(SectionKind::Records)),
                (Some(8), Some(SectionKind::Records)),
            ]
        );

        let missing = parse("@schema\na: Number\n@end");
        assert_eq!(missing.errors[0].section, Some(SectionKind::Records));
    }

    #[test]
    fn output_json_uses_snake_case_keys() {
        let out = parse("*STRICT=TRUE\n@schema\na: Number\n@end\n@records\n#0 {a: 1}\n@end");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["file_rules"], serde_json::json!({"strict": true}));
        assert!(json.get("metadata").is_some());
    }

    #[test]
    fn directive_recognition() {
        assert_eq!(Directive::parse("@schema"), Some(Directive::Open(SectionKind::Schema)));
        assert_eq!(Directive::parse("*STRICT= TRUE"), Some(Directive::Strict("TRUE")));
        assert_eq!(Directive::parse("@Schema"), None);
        assert_eq!(boundary("@records"), Some(Boundary::Section));
        assert_eq!(boundary("*STRICT=TRUE"), None);
    }
}
