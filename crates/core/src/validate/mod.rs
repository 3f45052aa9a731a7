//! Validation engine: checks a data value against a schema and rule set.
//!
//! [`validate`] is the one-shot entry point. [`Validator`] carries strict
//! mode and registered custom predicates, and can validate a whole record
//! set so that `isUnique` applies across documents.

mod checks;

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::rules::{reference_error, Keyword, RuleSet};
use crate::schema::Schema;

pub(crate) use checks::values_equal;

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Field address: `name`, `parent.child`, `items[2].sku`, or `$root`.
    pub field: String,
    /// Keyword that failed, or `type` / `strict` / `schema`.
    pub keyword: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        field: impl Into<String>,
        keyword: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            field: field.into(),
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.keyword)
    }
}

/// Outcome of one validation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Normalized copy of the input (`trim`, case folding, defaults
    /// applied). `None` when data was not evaluated.
    pub data: Option<Value>,
}

impl ValidationReport {
    fn new(diagnostics: Vec<Diagnostic>, data: Option<Value>) -> Self {
        ValidationReport {
            valid: diagnostics.is_empty(),
            diagnostics,
            data,
        }
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
        self.valid = false;
    }
}

/// A named predicate for the `custom(name)` keyword. Receives the field value
/// and the enclosing object.
pub type CustomPredicate = Arc<dyn Fn(&Value, &Map<String, Value>) -> bool + Send + Sync>;

/// Registry of custom predicates, cheap to clone.
#[derive(Clone, Default)]
pub struct CustomValidators {
    predicates: HashMap<String, CustomPredicate>,
}

impl CustomValidators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value, &Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn get(&self, name: &str) -> Option<&CustomPredicate> {
        self.predicates.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl fmt::Debug for CustomValidators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CustomValidators")
            .field("names", &names)
            .finish()
    }
}

/// Validate `data` against `schema` and `rules`.
///
/// With `validate_data` false only the schema / rule pairing is checked and
/// the report carries no data.
pub fn validate(
    schema: &Schema,
    rules: &RuleSet,
    data: &Value,
    validate_data: bool,
    strict: bool,
) -> ValidationReport {
    Validator::new(schema, rules)
        .strict(strict)
        .validate(data, validate_data)
}

/// Validation entry point with options.
#[derive(Debug, Clone)]
pub struct Validator<'a> {
    schema: &'a Schema,
    rules: &'a RuleSet,
    strict: bool,
    custom: CustomValidators,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a Schema, rules: &'a RuleSet) -> Self {
        Validator {
            schema,
            rules,
            strict: false,
            custom: CustomValidators::new(),
        }
    }

    /// Reject data keys the schema does not declare.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_custom<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.custom.register(name, predicate);
        self
    }

    pub fn with_custom_validators(mut self, custom: CustomValidators) -> Self {
        self.custom = custom;
        self
    }

    /// Check that every rule names a declared field, fits the field's type,
    /// and that its field references resolve.
    pub fn check_rules(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for (path, field_rules) in &self.rules.fields {
            let Some(field) = self.schema.resolve(path) else {
                diagnostics.push(Diagnostic::new(
                    path.as_str(),
                    "schema",
                    format!("field '{}' is not declared in the schema", path),
                ));
                continue;
            };
            for rule in field_rules.iter() {
                let keyword = rule.keyword();
                if !keyword.accepts(field.ty) {
                    diagnostics.push(Diagnostic::new(
                        path.as_str(),
                        keyword.name(),
                        format!(
                            "validation '{}' is not applicable to type {}",
                            keyword, field.ty
                        ),
                    ));
                    continue;
                }
                if let Some(msg) = reference_error(self.schema, path, rule) {
                    diagnostics.push(Diagnostic::new(path.as_str(), keyword.name(), msg));
                }
            }
        }
        diagnostics
    }

    /// Validate one value. The input is never mutated.
    pub fn validate(&self, data: &Value, validate_data: bool) -> ValidationReport {
        let mut diagnostics = self.check_rules();
        if !validate_data {
            return ValidationReport::new(diagnostics, None);
        }
        let mut normalized = data.clone();
        let mut run = checks::Run::new(self.rules, self.strict, &self.custom);
        match normalized.as_object_mut() {
            Some(object) => run.scope(self.schema, "", "", object),
            None => run.diagnostics.push(Diagnostic::new(
                "$root",
                "type",
                format!("expected an object, got {}", checks::kind(data)),
            )),
        }
        diagnostics.extend(run.diagnostics);
        ValidationReport::new(diagnostics, Some(normalized))
    }

    /// Validate a record set. Each document gets its own report; top-level
    /// `isUnique` fields are additionally compared across documents, and a
    /// repeat is reported on the later document.
    pub fn validate_documents(&self, documents: &[Value]) -> Vec<ValidationReport> {
        self.validate_set(documents, |idx| format!("the document at position {}", idx))
    }

    /// [`Validator::validate_documents`] with caller-chosen names for the
    /// documents, used in duplicate messages.
    pub(crate) fn validate_set<F>(&self, documents: &[Value], name: F) -> Vec<ValidationReport>
    where
        F: Fn(usize) -> String,
    {
        let mut reports: Vec<ValidationReport> = documents
            .iter()
            .map(|doc| self.validate(doc, true))
            .collect();

        let unique_fields = self.rules.fields.iter().filter_map(|(path, rules)| {
            let top_level = self.schema.get(path).is_some();
            (top_level && rules.get(Keyword::IsUnique).is_some()).then_some(path.as_str())
        });
        for field in unique_fields {
            let mut seen: Vec<(usize, Value)> = Vec::new();
            for (idx, report) in reports.iter_mut().enumerate() {
                let value = report
                    .data
                    .as_ref()
                    .and_then(|d| d.get(field))
                    .filter(|v| !v.is_null())
                    .cloned();
                let Some(value) = value else { continue };
                match seen.iter().find(|(_, v)| values_equal(v, &value)) {
                    Some((first, _)) => report.push(Diagnostic::new(
                        field,
                        Keyword::IsUnique.name(),
                        format!("value duplicates {}", name(*first)),
                    )),
                    None => seen.push((idx, value)),
                }
            }
        }
        reports
    }
}
