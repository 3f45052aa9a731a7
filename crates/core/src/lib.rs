//! sqon-core: parser and validation engine for SQON files.
//!
//! A SQON file carries a `@schema` section (typed field declarations), an
//! optional `@validations` section (per-field rule lists), and a `@records`
//! section (ordinal-tagged value literals). Parsing produces a
//! [`ParseOutput`]; problems inside the file are reported as [`ParseError`]
//! values rather than aborting the parse.
//!
//! # Public API
//!
//! - [`Parser`] with [`ParseOptions`]: the full parse, optionally focused on
//!   one section
//! - [`parse_str()`] / [`parse_file()`]: shorthand for the default options
//! - [`validate()`] and [`Validator`]: check arbitrary JSON data against a
//!   schema and rule set
//! - [`renumber_records()`] / [`renumber_file()`]: resequence record markers

pub mod date;
pub mod error;
pub mod lexer;
pub mod metadata;
pub mod parser;
pub mod renumber;
pub mod rules;
pub mod schema;
pub mod source;
pub mod types;
pub mod validate;
pub mod value;

// ── Convenience re-exports ───────────────────────────────────────────

pub use error::{ErrorList, ParseError, SqonError, MAX_ERRORS_PER_SECTION};
pub use metadata::ParsingMetadata;
pub use parser::{
    Document, FileRules, Focus, ParseOptions, ParseOutput, Parser, SectionKind,
    DEFAULT_MAX_RECORDS,
};
pub use renumber::{renumber_file, renumber_records};
pub use rules::{FieldRules, Keyword, Rule, RuleSet};
pub use schema::{Schema, SchemaField};
pub use types::TypeTag;
pub use validate::{
    validate, CustomPredicate, CustomValidators, Diagnostic, ValidationReport, Validator,
};

use std::path::Path;

/// Parse inline SQON text with default options.
pub fn parse_str(content: &str) -> Result<ParseOutput, SqonError> {
    Parser::new(ParseOptions::from_content(content))?.parse()
}

/// Parse a SQON file with default options.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParseOutput, SqonError> {
    Parser::new(ParseOptions::from_path(path.as_ref()))?.parse()
}
