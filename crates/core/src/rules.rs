//! Validation keywords, typed rule arguments, and the keyword/type
//! compatibility matrix.

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use time::OffsetDateTime;

use crate::date::parse_date;
use crate::lexer::{self, Token};
use crate::schema::Schema;
use crate::types::TypeTag;
use crate::value;

// ──────────────────────────────────────────────
// Keywords and the compatibility matrix
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Custom,
    Default,
    IsNull,
    Required,
    IsEqualTo,
    IsUnique,
    NotNull,
    Enum,
    MatchesField,
    Min,
    Max,
    IsPositive,
    IsNegative,
    MinLength,
    MaxLength,
    MaxSize,
    IsDate,
    MinDate,
    MaxDate,
    HasProperties,
    Pattern,
    IsUrl,
    IsAlpha,
    IsNumeric,
    IsAlphanumeric,
    IsIp,
    Trim,
    Lowercase,
    Uppercase,
    IsEmail,
    IsInteger,
    IsFloat,
    IsBoolean,
}

const ANY: &[TypeTag] = &[TypeTag::Any];
const NUMERIC: &[TypeTag] = &[TypeTag::Number, TypeTag::NumberArray, TypeTag::ByteArray];
const LENGTH: &[TypeTag] = &[
    TypeTag::String,
    TypeTag::StringArray,
    TypeTag::ObjectArray,
    TypeTag::Array,
    TypeTag::Object,
    TypeTag::NumberArray,
    TypeTag::ByteArray,
];
const SIZE: &[TypeTag] = &[
    TypeTag::Binary,
    TypeTag::Array,
    TypeTag::StringArray,
    TypeTag::NumberArray,
    TypeTag::ObjectArray,
    TypeTag::Object,
    TypeTag::ByteArray,
];
const DATE: &[TypeTag] = &[TypeTag::Date];
const SHAPED: &[TypeTag] = &[TypeTag::Object, TypeTag::ObjectArray];
const STRING: &[TypeTag] = &[TypeTag::String];
const EMAIL: &[TypeTag] = &[TypeTag::String, TypeTag::StringArray];
const NUMBER: &[TypeTag] = &[TypeTag::Number];
const BOOLEAN: &[TypeTag] = &[TypeTag::Boolean];

/// Keyword name, keyword, and the field types it may be attached to.
/// `Any` in the type list means every type.
pub const COMPATIBILITY: &[(&str, Keyword, &[TypeTag])] = &[
    ("custom", Keyword::Custom, ANY),
    ("default", Keyword::Default, ANY),
    ("isNull", Keyword::IsNull, ANY),
    ("required", Keyword::Required, ANY),
    ("isEqualTo", Keyword::IsEqualTo, ANY),
    ("isUnique", Keyword::IsUnique, ANY),
    ("notNull", Keyword::NotNull, ANY),
    ("enum", Keyword::Enum, ANY),
    ("matchesField", Keyword::MatchesField, ANY),
    ("min", Keyword::Min, NUMERIC),
    ("max", Keyword::Max, NUMERIC),
    ("isPositive", Keyword::IsPositive, NUMERIC),
    ("isNegative", Keyword::IsNegative, NUMERIC),
    ("minLength", Keyword::MinLength, LENGTH),
    ("maxLength", Keyword::MaxLength, LENGTH),
    ("maxSize", Keyword::MaxSize, SIZE),
    ("isDate", Keyword::IsDate, DATE),
    ("minDate", Keyword::MinDate, DATE),
    ("maxDate", Keyword::MaxDate, DATE),
    ("hasProperties", Keyword::HasProperties, SHAPED),
    ("pattern", Keyword::Pattern, STRING),
    ("isURL", Keyword::IsUrl, STRING),
    ("isAlpha", Keyword::IsAlpha, STRING),
    ("isNumeric", Keyword::IsNumeric, STRING),
    ("isAlphanumeric", Keyword::IsAlphanumeric, STRING),
    ("isIP", Keyword::IsIp, STRING),
    ("trim", Keyword::Trim, STRING),
    ("lowercase", Keyword::Lowercase, STRING),
    ("uppercase", Keyword::Uppercase, STRING),
    ("isEmail", Keyword::IsEmail, EMAIL),
    ("isInteger", Keyword::IsInteger, NUMBER),
    ("isFloat", Keyword::IsFloat, NUMBER),
    ("isBoolean", Keyword::IsBoolean, BOOLEAN),
];

impl Keyword {
    pub fn from_name(name: &str) -> Option<Keyword> {
        COMPATIBILITY
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, k, _)| *k)
    }

    pub fn name(&self) -> &'static str {
        self.entry().0
    }

    /// Field types this keyword may be attached to.
    pub fn applicable_types(&self) -> &'static [TypeTag] {
        self.entry().2
    }

    /// Whether the keyword may be attached to a field of type `ty`.
    pub fn accepts(&self, ty: TypeTag) -> bool {
        let types = self.applicable_types();
        ty == TypeTag::Any || types.contains(&TypeTag::Any) || types.contains(&ty)
    }

    fn entry(&self) -> &'static (&'static str, Keyword, &'static [TypeTag]) {
        COMPATIBILITY
            .iter()
            .find(|(_, k, _)| k == self)
            .unwrap_or(&COMPATIBILITY[0])
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ──────────────────────────────────────────────
// Typed arguments
// ──────────────────────────────────────────────

/// A compiled `pattern(...)` argument.
#[derive(Debug, Clone)]
pub struct RulePattern {
    pub source: String,
    pub flags: String,
    pub regex: Regex,
}

impl RulePattern {
    /// Compile `source` with JavaScript-style flags. `g` and `u` are accepted
    /// and ignored; `i`, `m`, `s`, `x` map onto the regex builder.
    pub fn compile(source: &str, flags: &str) -> Result<Self, String> {
        let mut builder = RegexBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                'g' | 'u' => {}
                other => return Err(format!("unsupported regex flag '{}'", other)),
            }
        }
        let regex = builder
            .build()
            .map_err(|e| format!("invalid regular expression /{}/: {}", source, e))?;
        Ok(RulePattern {
            source: source.to_owned(),
            flags: flags.to_owned(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for RulePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

/// A `minDate` / `maxDate` bound: the text as written plus its instant.
#[derive(Debug, Clone, PartialEq)]
pub struct DateBound {
    pub text: String,
    pub at: OffsetDateTime,
}

/// One validation rule with its typed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Custom(String),
    Default(Value),
    IsNull,
    Required,
    IsEqualTo(Value),
    IsUnique,
    NotNull,
    Enum(Vec<Value>),
    MatchesField(String),
    Min(f64),
    Max(f64),
    IsPositive,
    IsNegative,
    MinLength(usize),
    MaxLength(usize),
    MaxSize(usize),
    IsDate,
    MinDate(DateBound),
    MaxDate(DateBound),
    /// Empty means "every field of the declared nested shape".
    HasProperties(Vec<String>),
    Pattern(RulePattern),
    IsUrl,
    IsAlpha,
    IsNumeric,
    IsAlphanumeric,
    IsIp,
    Trim,
    Lowercase,
    Uppercase,
    IsEmail,
    IsInteger,
    IsFloat,
    IsBoolean,
}

impl Rule {
    pub fn keyword(&self) -> Keyword {
        match self {
            Rule::Custom(_) => Keyword::Custom,
            Rule::Default(_) => Keyword::Default,
            Rule::IsNull => Keyword::IsNull,
            Rule::Required => Keyword::Required,
            Rule::IsEqualTo(_) => Keyword::IsEqualTo,
            Rule::IsUnique => Keyword::IsUnique,
            Rule::NotNull => Keyword::NotNull,
            Rule::Enum(_) => Keyword::Enum,
            Rule::MatchesField(_) => Keyword::MatchesField,
            Rule::Min(_) => Keyword::Min,
            Rule::Max(_) => Keyword::Max,
            Rule::IsPositive => Keyword::IsPositive,
            Rule::IsNegative => Keyword::IsNegative,
            Rule::MinLength(_) => Keyword::MinLength,
            Rule::MaxLength(_) => Keyword::MaxLength,
            Rule::MaxSize(_) => Keyword::MaxSize,
            Rule::IsDate => Keyword::IsDate,
            Rule::MinDate(_) => Keyword::MinDate,
            Rule::MaxDate(_) => Keyword::MaxDate,
            Rule::HasProperties(_) => Keyword::HasProperties,
            Rule::Pattern(_) => Keyword::Pattern,
            Rule::IsUrl => Keyword::IsUrl,
            Rule::IsAlpha => Keyword::IsAlpha,
            Rule::IsNumeric => Keyword::IsNumeric,
            Rule::IsAlphanumeric => Keyword::IsAlphanumeric,
            Rule::IsIp => Keyword::IsIp,
            Rule::Trim => Keyword::Trim,
            Rule::Lowercase => Keyword::Lowercase,
            Rule::Uppercase => Keyword::Uppercase,
            Rule::IsEmail => Keyword::IsEmail,
            Rule::IsInteger => Keyword::IsInteger,
            Rule::IsFloat => Keyword::IsFloat,
            Rule::IsBoolean => Keyword::IsBoolean,
        }
    }

    /// Build a rule from its keyword and the raw text between the
    /// parentheses (`None` when the keyword was written without them).
    pub fn from_argument(keyword: Keyword, raw: Option<&str>, line: u32) -> Result<Rule, String> {
        let raw = raw.map(str::trim).filter(|r| !r.is_empty());
        if let Some(rule) = flag_rule(keyword) {
            return match raw {
                None => Ok(rule),
                Some(arg) => Err(format!("'{}' takes no argument, got '{}'", keyword, arg)),
            };
        }
        let missing = || format!("'{}' requires an argument", keyword);
        let count = || -> Result<usize, String> {
            parse_literal(raw.ok_or_else(missing)?, line)?
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| format!("'{}' requires a non-negative integer argument", keyword))
        };
        match keyword {
            Keyword::Custom => Ok(Rule::Custom(parse_name(raw.ok_or_else(missing)?, line)?)),
            Keyword::MatchesField => Ok(Rule::MatchesField(parse_name(
                raw.ok_or_else(missing)?,
                line,
            )?)),
            Keyword::Default => Ok(Rule::Default(parse_literal(raw.ok_or_else(missing)?, line)?)),
            Keyword::IsEqualTo => Ok(Rule::IsEqualTo(parse_literal(
                raw.ok_or_else(missing)?,
                line,
            )?)),
            Keyword::Enum => {
                let raw = raw.ok_or_else(missing)?;
                let list = if raw.starts_with('[') {
                    parse_literal(raw, line)?
                } else {
                    parse_literal(&format!("[{}]", raw), line)?
                };
                match list {
                    Value::Array(items) if !items.is_empty() => Ok(Rule::Enum(items)),
                    _ => Err("'enum' requires a non-empty list of values".into()),
                }
            }
            Keyword::Min | Keyword::Max => {
                let n = parse_literal(raw.ok_or_else(missing)?, line)?
                    .as_f64()
                    .ok_or_else(|| format!("'{}' requires a numeric argument", keyword))?;
                Ok(if keyword == Keyword::Min {
                    Rule::Min(n)
                } else {
                    Rule::Max(n)
                })
            }
            Keyword::MinLength => Ok(Rule::MinLength(count()?)),
            Keyword::MaxLength => Ok(Rule::MaxLength(count()?)),
            Keyword::MaxSize => Ok(Rule::MaxSize(count()?)),
            Keyword::MinDate | Keyword::MaxDate => {
                let text = unquote(raw.ok_or_else(missing)?);
                let at = parse_date(&text)
                    .ok_or_else(|| format!("'{}' requires a date argument, got '{}'", keyword, text))?;
                let bound = DateBound { text, at };
                Ok(if keyword == Keyword::MinDate {
                    Rule::MinDate(bound)
                } else {
                    Rule::MaxDate(bound)
                })
            }
            Keyword::HasProperties => match raw {
                None => Ok(Rule::HasProperties(Vec::new())),
                Some(raw) => Ok(Rule::HasProperties(parse_name_list(raw, line)?)),
            },
            Keyword::Pattern => {
                let raw = raw.ok_or_else(missing)?;
                let (source, flags) = split_regex_literal(raw).unwrap_or_else(|| (unquote(raw), String::new()));
                Ok(Rule::Pattern(RulePattern::compile(&source, &flags)?))
            }
            Keyword::IsNull
            | Keyword::Required
            | Keyword::IsUnique
            | Keyword::NotNull
            | Keyword::IsPositive
            | Keyword::IsNegative
            | Keyword::IsDate
            | Keyword::IsUrl
            | Keyword::IsAlpha
            | Keyword::IsNumeric
            | Keyword::IsAlphanumeric
            | Keyword::IsIp
            | Keyword::Trim
            | Keyword::Lowercase
            | Keyword::Uppercase
            | Keyword::IsEmail
            | Keyword::IsInteger
            | Keyword::IsFloat
            | Keyword::IsBoolean => Err(format!("'{}' takes no argument", keyword)),
        }
    }

    /// Argument as JSON, for serialized output. Flag rules have `null`.
    pub fn argument(&self) -> Value {
        match self {
            Rule::Custom(name) | Rule::MatchesField(name) => Value::String(name.clone()),
            Rule::Default(v) | Rule::IsEqualTo(v) => v.clone(),
            Rule::Enum(items) => Value::Array(items.clone()),
            Rule::Min(n) | Rule::Max(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Rule::MinLength(n) | Rule::MaxLength(n) | Rule::MaxSize(n) => Value::from(*n as u64),
            Rule::MinDate(b) | Rule::MaxDate(b) => Value::String(b.text.clone()),
            Rule::HasProperties(names) => {
                Value::Array(names.iter().cloned().map(Value::String).collect())
            }
            Rule::Pattern(p) => Value::String(format!("/{}/{}", p.source, p.flags)),
            _ => Value::Null,
        }
    }
}

/// The rule for a keyword written without arguments, or `None` when the
/// keyword needs one.
fn flag_rule(keyword: Keyword) -> Option<Rule> {
    let rule = match keyword {
        Keyword::IsNull => Rule::IsNull,
        Keyword::Required => Rule::Required,
        Keyword::IsUnique => Rule::IsUnique,
        Keyword::NotNull => Rule::NotNull,
        Keyword::IsPositive => Rule::IsPositive,
        Keyword::IsNegative => Rule::IsNegative,
        Keyword::IsDate => Rule::IsDate,
        Keyword::IsUrl => Rule::IsUrl,
        Keyword::IsAlpha => Rule::IsAlpha,
        Keyword::IsNumeric => Rule::IsNumeric,
        Keyword::IsAlphanumeric => Rule::IsAlphanumeric,
        Keyword::IsIp => Rule::IsIp,
        Keyword::Trim => Rule::Trim,
        Keyword::Lowercase => Rule::Lowercase,
        Keyword::Uppercase => Rule::Uppercase,
        Keyword::IsEmail => Rule::IsEmail,
        Keyword::IsInteger => Rule::IsInteger,
        Keyword::IsFloat => Rule::IsFloat,
        Keyword::IsBoolean => Rule::IsBoolean,
        Keyword::Custom
        | Keyword::Default
        | Keyword::IsEqualTo
        | Keyword::Enum
        | Keyword::MatchesField
        | Keyword::Min
        | Keyword::Max
        | Keyword::MinLength
        | Keyword::MaxLength
        | Keyword::MaxSize
        | Keyword::MinDate
        | Keyword::MaxDate
        | Keyword::HasProperties
        | Keyword::Pattern => return None,
    };
    Some(rule)
}

fn parse_literal(raw: &str, line: u32) -> Result<Value, String> {
    value::parse_value(raw, line).map_err(|e| e.message)
}

/// A field or predicate name: bare identifier or quoted string.
fn parse_name(raw: &str, line: u32) -> Result<String, String> {
    let tokens = lexer::lex(raw, line).map_err(|e| e.message)?;
    match tokens.as_slice() {
        [first, last] if last.token == Token::Eof => match &first.token {
            Token::Word(w) | Token::Str(w) => Ok(w.clone()),
            _ => Err(format!("expected a name, got '{}'", raw)),
        },
        _ => Err(format!("expected a single name, got '{}'", raw)),
    }
}

/// `["a", "b"]`, `"a", "b"`, or `a, b`.
fn parse_name_list(raw: &str, line: u32) -> Result<Vec<String>, String> {
    let tokens = lexer::lex(raw, line).map_err(|e| e.message)?;
    let mut names = Vec::new();
    let mut expect_name = true;
    for spanned in &tokens {
        match (&spanned.token, expect_name) {
            (Token::LBracket, _) | (Token::RBracket, _) | (Token::Eof, _) => {}
            (Token::Word(w), true) | (Token::Str(w), true) => {
                names.push(w.clone());
                expect_name = false;
            }
            (Token::Comma, false) => expect_name = true,
            _ => return Err(format!("expected a list of property names, got '{}'", raw)),
        }
    }
    if names.is_empty() {
        return Err("'hasProperties' list is empty".into());
    }
    Ok(names)
}

/// Split `/source/flags` into its parts. `None` if `raw` is not a regex literal.
fn split_regex_literal(raw: &str) -> Option<(String, String)> {
    let body = raw.strip_prefix('/')?;
    let end = body.rfind('/')?;
    let flags = &body[end + 1..];
    if !flags.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((body[..end].to_owned(), flags.to_owned()))
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return raw[1..raw.len() - 1].to_owned();
        }
    }
    raw.to_owned()
}

/// Check that a rule's field references resolve against `schema`.
///
/// `matchesField` must name a sibling in the same object scope and
/// `hasProperties` may only name fields of the declared nested shape.
pub fn reference_error(schema: &Schema, field: &str, rule: &Rule) -> Option<String> {
    match rule {
        Rule::MatchesField(target) => {
            let sibling = match field.rsplit_once('.') {
                Some((parent, _)) => format!("{}.{}", parent, target),
                None => target.clone(),
            };
            if schema.resolve(&sibling).is_none() {
                return Some(format!(
                    "'matchesField' on field '{}' refers to unknown field '{}'",
                    field, sibling
                ));
            }
            None
        }
        Rule::HasProperties(names) => {
            let shape = schema.resolve(field).and_then(|f| f.shape.as_ref());
            match shape {
                None if names.is_empty() => Some(format!(
                    "'hasProperties' on field '{}' needs a list since it declares no nested fields",
                    field
                )),
                None => None,
                Some(shape) => names
                    .iter()
                    .find(|name| shape.get(name).is_none())
                    .map(|name| {
                        format!(
                            "'hasProperties' on field '{}' names undeclared property '{}'",
                            field, name
                        )
                    }),
            }
        }
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Rule sets
// ──────────────────────────────────────────────

/// Rules for one field, keyed by keyword, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRules {
    rules: IndexMap<Keyword, Rule>,
}

impl FieldRules {
    /// Insert a rule. A repeated keyword replaces the earlier rule in place
    /// and returns it.
    pub fn insert(&mut self, rule: Rule) -> Option<Rule> {
        self.rules.insert(rule.keyword(), rule)
    }

    pub fn get(&self, keyword: Keyword) -> Option<&Rule> {
        self.rules.get(&keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Serialize for FieldRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for (keyword, rule) in &self.rules {
            map.serialize_entry(keyword.name(), &rule.argument())?;
        }
        map.end()
    }
}

/// Field path to its rules, in first-declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuleSet {
    pub fields: IndexMap<String, FieldRules>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for rule sets assembled in code.
    pub fn rule(mut self, field: &str, rule: Rule) -> Self {
        self.insert(field, rule);
        self
    }

    pub fn insert(&mut self, field: &str, rule: Rule) -> Option<Rule> {
        self.fields.entry(field.to_owned()).or_default().insert(rule)
    }

    pub fn get(&self, field: &str) -> Option<&FieldRules> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of rules across every field.
    pub fn rule_count(&self) -> usize {
        self.fields.values().map(FieldRules::len).sum()
    }
}
