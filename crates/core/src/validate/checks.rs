use regex::Regex;
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::OnceLock;

use super::{CustomValidators, Diagnostic};
use crate::date::parse_date;
use crate::rules::{Keyword, Rule, RuleSet};
use crate::schema::{Schema, SchemaField};
use crate::types::TypeTag;

// ──────────────────────────────────────────────
// Scope walk
// ──────────────────────────────────────────────

/// State of one validation call.
pub(super) struct Run<'a> {
    rules: &'a RuleSet,
    strict: bool,
    custom: &'a CustomValidators,
    pub(super) diagnostics: Vec<Diagnostic>,
}

impl<'a> Run<'a> {
    pub(super) fn new(rules: &'a RuleSet, strict: bool, custom: &'a CustomValidators) -> Self {
        Run {
            rules,
            strict,
            custom,
            diagnostics: Vec::new(),
        }
    }

    /// Validate one object against one schema level.
    ///
    /// `rule_prefix` is the dotted schema path used to look up rules
    /// (`items.sku`); `addr_prefix` is the data address used in diagnostics
    /// (`items[1].sku`).
    pub(super) fn scope(
        &mut self,
        schema: &Schema,
        rule_prefix: &str,
        addr_prefix: &str,
        object: &mut Map<String, Value>,
    ) {
        let mut pending = Vec::new();
        for (name, field) in &schema.fields {
            let rule_path = join(rule_prefix, name);
            let addr = join(addr_prefix, name);
            self.field(field, &rule_path, &addr, object, &mut pending);

            let Some(shape) = field.shape.as_ref() else {
                continue;
            };
            match object.get_mut(name.as_str()) {
                Some(Value::Object(inner)) => self.scope(shape, &rule_path, &addr, inner),
                Some(Value::Array(items)) => {
                    for (idx, item) in items.iter_mut().enumerate() {
                        if let Value::Object(inner) = item {
                            let item_addr = format!("{}[{}]", addr, idx);
                            self.scope(shape, &rule_path, &item_addr, inner);
                        }
                    }
                }
                _ => {}
            }
        }

        // Siblings are compared only once every field of the scope is
        // normalized.
        for m in pending {
            let matches = object
                .get(m.other.as_str())
                .is_some_and(|o| values_equal(&m.value, o));
            if !matches {
                self.diagnostics.push(Diagnostic::new(
                    m.addr,
                    Keyword::MatchesField.name(),
                    format!("must match field '{}'", m.other),
                ));
            }
        }

        if self.strict {
            for key in object.keys() {
                if !schema.fields.contains_key(key) {
                    self.diagnostics.push(Diagnostic::new(
                        join(addr_prefix, key),
                        "strict",
                        format!("field '{}' is not declared in the schema", key),
                    ));
                }
            }
        }
    }

    /// Type check plus the field's rules, in order. The final working value
    /// is written back into `object`.
    fn field(
        &mut self,
        field: &SchemaField,
        rule_path: &str,
        addr: &str,
        object: &mut Map<String, Value>,
        pending: &mut Vec<PendingMatch>,
    ) {
        let mut working = object.get(field.name.as_str()).cloned();

        if let Some(value) = working.as_ref().filter(|v| !v.is_null()) {
            if !type_matches(field.ty, value) {
                self.diagnostics.push(Diagnostic::new(
                    addr,
                    "type",
                    format!("expected {}, got {}", field.ty, kind(value)),
                ));
            }
        }

        let Some(field_rules) = self.rules.get(rule_path) else {
            return;
        };
        for rule in field_rules.iter() {
            if let Rule::MatchesField(other) = rule {
                if let Some(value) = working.as_ref().filter(|v| !v.is_null()) {
                    pending.push(PendingMatch {
                        addr: addr.to_owned(),
                        other: other.clone(),
                        value: value.clone(),
                    });
                }
                continue;
            }
            let outcome = apply(rule, &mut working, field, object, self.custom);
            if let Err(message) = outcome {
                self.diagnostics
                    .push(Diagnostic::new(addr, rule.keyword().name(), message));
            }
        }

        if let Some(value) = working {
            object.insert(field.name.clone(), value);
        }
    }
}

/// A `matchesField` check waiting for the rest of its scope.
struct PendingMatch {
    addr: String,
    other: String,
    value: Value,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", prefix, name)
    }
}

// ──────────────────────────────────────────────
// Rules
// ──────────────────────────────────────────────

type Outcome = Result<(), String>;

fn check(ok: bool, message: impl FnOnce() -> String) -> Outcome {
    if ok {
        Ok(())
    } else {
        Err(message())
    }
}

/// Apply one rule to the working value. `siblings` is the enclosing object
/// as normalized so far.
fn apply(
    rule: &Rule,
    working: &mut Option<Value>,
    field: &SchemaField,
    siblings: &Map<String, Value>,
    custom: &CustomValidators,
) -> Outcome {
    let empty = working.as_ref().map_or(true, Value::is_null);

    // Presence rules run on every value; everything else needs a value.
    match rule {
        Rule::Required => return check(!empty, || "is required".into()),
        Rule::NotNull => {
            return check(!matches!(working, Some(Value::Null)), || {
                "must not be null".into()
            })
        }
        Rule::IsNull => return check(empty, || "must be null".into()),
        Rule::Default(value) => {
            if empty {
                *working = Some(value.clone());
            }
            return Ok(());
        }
        _ if empty => return Ok(()),
        _ => {}
    }
    let Some(value) = working.as_mut() else {
        return Ok(());
    };

    match rule {
        Rule::Trim | Rule::Lowercase | Rule::Uppercase => {
            if let Value::String(s) = value {
                *s = match rule {
                    Rule::Trim => s.trim().to_owned(),
                    Rule::Lowercase => s.to_lowercase(),
                    _ => s.to_uppercase(),
                };
            }
            Ok(())
        }
        Rule::Custom(name) => match custom.get(name) {
            Some(predicate) => check(predicate(&*value, siblings), || {
                format!("failed custom validator '{}'", name)
            }),
            None => Err(format!("unknown custom validator '{}'", name)),
        },
        Rule::IsEqualTo(expected) => check(values_equal(value, expected), || {
            format!("must equal {}", expected)
        }),
        Rule::Enum(options) => {
            let allowed = |v: &Value| options.iter().any(|o| values_equal(v, o));
            let ok = match &*value {
                Value::Array(items) if !allowed(&*value) => items.iter().all(allowed),
                other => allowed(other),
            };
            check(ok, || format!("must be one of {}", Value::Array(options.clone())))
        }
        Rule::IsUnique => match &*value {
            Value::Array(items) => check(!has_duplicates(items), || {
                "must not contain duplicate elements".into()
            }),
            _ => Ok(()),
        },
        // Deferred to the end of the scope walk.
        Rule::MatchesField(_) => Ok(()),
        Rule::Min(bound) => each_number(value, |n| n >= *bound, || format!("must be at least {}", bound)),
        Rule::Max(bound) => each_number(value, |n| n <= *bound, || format!("must be at most {}", bound)),
        Rule::IsPositive => each_number(value, |n| n > 0.0, || "must be positive".into()),
        Rule::IsNegative => each_number(value, |n| n < 0.0, || "must be negative".into()),
        Rule::IsInteger => match value.as_f64() {
            Some(n) => check(n.fract() == 0.0, || "must be an integer".into()),
            None => Err(format!("must be a number, got {}", kind(value))),
        },
        Rule::IsFloat => match value.as_f64() {
            Some(n) => check(n.is_finite() && n.fract() != 0.0, || {
                "must be a number with a fractional part".into()
            }),
            None => Err(format!("must be a number, got {}", kind(value))),
        },
        Rule::MinLength(min) => match length(value) {
            Some(len) => check(len >= *min, || format!("length must be at least {}", min)),
            None => Err(format!("has no length ({})", kind(value))),
        },
        Rule::MaxLength(max) => match length(value) {
            Some(len) => check(len <= *max, || format!("length must be at most {}", max)),
            None => Err(format!("has no length ({})", kind(value))),
        },
        Rule::MaxSize(max) => {
            let size = byte_size(value);
            check(size <= *max, || {
                format!("size {} bytes exceeds the maximum of {}", size, max)
            })
        }
        Rule::IsDate => with_str(value, |s| {
            check(parse_date(s).is_some(), || format!("'{}' is not a valid date", s))
        }),
        Rule::MinDate(bound) => with_str(value, |s| match parse_date(s) {
            Some(at) => check(at >= bound.at, || format!("must be on or after {}", bound.text)),
            None => Err(format!("'{}' is not a valid date", s)),
        }),
        Rule::MaxDate(bound) => with_str(value, |s| match parse_date(s) {
            Some(at) => check(at <= bound.at, || format!("must be on or before {}", bound.text)),
            None => Err(format!("'{}' is not a valid date", s)),
        }),
        Rule::HasProperties(names) => has_properties(value, names, field),
        Rule::Pattern(pattern) => with_str(value, |s| {
            check(pattern.is_match(s), || {
                format!("does not match pattern /{}/{}", pattern.source, pattern.flags)
            })
        }),
        Rule::IsUrl => with_str(value, |s| {
            let ok = url::Url::parse(s).is_ok_and(|u| u.host().is_some());
            check(ok, || format!("'{}' is not a valid URL", s))
        }),
        Rule::IsAlpha => with_str(value, |s| {
            check(!s.is_empty() && s.chars().all(char::is_alphabetic), || {
                "must contain only letters".into()
            })
        }),
        Rule::IsNumeric => with_str(value, |s| {
            check(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()), || {
                "must contain only digits".into()
            })
        }),
        Rule::IsAlphanumeric => with_str(value, |s| {
            check(!s.is_empty() && s.chars().all(char::is_alphanumeric), || {
                "must contain only letters and digits".into()
            })
        }),
        Rule::IsIp => with_str(value, |s| {
            check(s.parse::<IpAddr>().is_ok(), || {
                format!("'{}' is not a valid IP address", s)
            })
        }),
        Rule::IsEmail => match &*value {
            Value::Array(items) => {
                let bad = items.iter().find(|item| !item.as_str().is_some_and(is_email));
                match bad {
                    Some(item) => Err(format!("{} is not a valid email address", item)),
                    None => Ok(()),
                }
            }
            _ => with_str(value, |s| {
                check(is_email(s), || format!("'{}' is not a valid email address", s))
            }),
        },
        Rule::IsBoolean => check(value.is_boolean(), || {
            format!("must be a boolean, got {}", kind(value))
        }),
        Rule::Required | Rule::NotNull | Rule::IsNull | Rule::Default(_) => Ok(()),
    }
}

fn with_str(value: &Value, f: impl FnOnce(&str) -> Outcome) -> Outcome {
    match value {
        Value::String(s) => f(s),
        other => Err(format!("must be a string, got {}", kind(other))),
    }
}

/// Numeric predicate over a number or every element of a numeric array.
fn each_number(
    value: &Value,
    ok: impl Fn(f64) -> bool,
    message: impl FnOnce() -> String,
) -> Outcome {
    let numbers: Option<Vec<f64>> = match value {
        Value::Number(n) => n.as_f64().map(|n| vec![n]),
        Value::Array(items) => items.iter().map(Value::as_f64).collect(),
        _ => None,
    };
    match numbers {
        Some(numbers) => check(numbers.into_iter().all(ok), message),
        None => Err(format!("must be numeric, got {}", kind(value))),
    }
}

fn has_properties(value: &Value, names: &[String], field: &SchemaField) -> Outcome {
    let required: Vec<&str> = if names.is_empty() {
        field
            .shape
            .as_ref()
            .map(|s| s.fields.keys().map(String::as_str).collect())
            .unwrap_or_default()
    } else {
        names.iter().map(String::as_str).collect()
    };
    match value {
        Value::Object(object) => {
            let missing = missing_in(&required, object);
            check(missing.is_empty(), || {
                format!("missing properties: {}", missing.join(", "))
            })
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let Value::Object(object) = item else {
                    return Err(format!("element {} is not an object", idx));
                };
                let missing = missing_in(&required, object);
                if !missing.is_empty() {
                    return Err(format!(
                        "element {} is missing properties: {}",
                        idx,
                        missing.join(", ")
                    ));
                }
            }
            Ok(())
        }
        other => Err(format!("must be an object, got {}", kind(other))),
    }
}

fn missing_in<'r>(required: &[&'r str], object: &Map<String, Value>) -> Vec<&'r str> {
    required
        .iter()
        .copied()
        .filter(|name| !object.contains_key(*name))
        .collect()
}

fn is_email(text: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

// ──────────────────────────────────────────────
// Value helpers
// ──────────────────────────────────────────────

/// JSON-ish name of a value's kind, for messages.
pub(super) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_byte(value: &Value) -> bool {
    value.as_u64().is_some_and(|n| n <= 255)
}

fn type_matches(ty: TypeTag, value: &Value) -> bool {
    let all = |pred: fn(&Value) -> bool| value.as_array().is_some_and(|a| a.iter().all(pred));
    match ty {
        TypeTag::Any => true,
        TypeTag::Number => value.is_number(),
        TypeTag::String | TypeTag::Binary | TypeTag::Date => value.is_string(),
        TypeTag::Boolean => value.is_boolean(),
        TypeTag::Object => value.is_object(),
        TypeTag::Null => value.is_null(),
        TypeTag::Undefined => false,
        TypeTag::Array | TypeTag::AnyArray => value.is_array(),
        TypeTag::ByteArray => all(is_byte),
        TypeTag::NumberArray => all(Value::is_number),
        TypeTag::StringArray => all(Value::is_string),
        TypeTag::ObjectArray => all(Value::is_object),
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn byte_size(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Array(items) if items.iter().all(is_byte) => items.len(),
        other => serde_json::to_string(other).map_or(0, |s| s.len()),
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn has_duplicates(items: &[Value]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(i, x)| items[i + 1..].iter().any(|y| values_equal(x, y)))
}
