use super::{boundary, Boundary, SectionPass};
use crate::error::{ErrorList, ParseError};
use crate::rules::{reference_error, Keyword, Rule, RuleSet};
use crate::schema::Schema;
use crate::source::Line;
use crate::types::TypeTag;

/// Parses one `@validations` section body against an already-parsed schema.
pub(crate) struct ValidationRuleParser<'a> {
    lines: &'a [Line],
    pos: usize,
    schema: &'a Schema,
    errors: ErrorList,
    rules: RuleSet,
}

impl<'a> ValidationRuleParser<'a> {
    pub(crate) fn new(lines: &'a [Line], start: usize, schema: &'a Schema) -> Self {
        ValidationRuleParser {
            lines,
            pos: start,
            schema,
            errors: ErrorList::new(),
            rules: RuleSet::new(),
        }
    }

    pub(crate) fn run(mut self) -> SectionPass<RuleSet> {
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
            self.rule_line(line);
        }
        SectionPass {
            value: self.rules,
            errors: self.errors,
            cursor: self.pos,
            closed,
        }
    }

    /// `<field>: <keyword>(<arg>), <keyword>, ...`
    fn rule_line(&mut self, line: &Line) {
        let Some((field, body)) = line.text.split_once(':') else {
            self.errors.push(ParseError::at(
                line.number,
                format!("expected '<field>: <rules>', got '{}'", line.text),
            ));
            return;
        };
        let field = field.trim();
        let Some(declared) = self.schema.resolve(field) else {
            self.errors.push(ParseError::at(
                line.number,
                format!("unknown field '{}' in @validations", field),
            ));
            return;
        };
        let ty = declared.ty;

        let items = match split_rules(body) {
            Ok(items) => items,
            Err(msg) => {
                self.errors.push(ParseError::at(line.number, msg));
                return;
            }
        };
        if items.is_empty() {
            self.errors.push(ParseError::at(
                line.number,
                format!("no rules given for field '{}'", field),
            ));
            return;
        }

        for item in items {
            self.rule_item(line.number, field, ty, item);
        }
    }

    fn rule_item(&mut self, line: u32, field: &str, ty: TypeTag, item: &str) {
        let (name, arg) = match item.split_once('(') {
            Some((name, rest)) => match rest.trim_end().strip_suffix(')') {
                Some(arg) => (name.trim(), Some(arg)),
                None => {
                    self.errors.push(ParseError::at(
                        line,
                        format!("missing ')' in rule '{}' for field '{}'", item, field),
                    ));
                    return;
                }
            },
            None => (item, None),
        };

        let Some(keyword) = Keyword::from_name(name) else {
            self.errors.push(ParseError::at(
                line,
                format!("unknown validation keyword '{}' for field '{}'", name, field),
            ));
            return;
        };
        if !keyword.accepts(ty) {
            self.errors.push(ParseError::at(
                line,
                format!(
                    "validation '{}' is not applicable to field '{}' of type {}",
                    keyword, field, ty
                ),
            ));
            return;
        }
        let rule = match Rule::from_argument(keyword, arg, line) {
            Ok(rule) => rule,
            Err(msg) => {
                self.errors.push(ParseError::at(
                    line,
                    format!("invalid argument for '{}' on field '{}': {}", keyword, field, msg),
                ));
                return;
            }
        };
        if let Some(msg) = reference_error(self.schema, field, &rule) {
            self.errors.push(ParseError::at(line, msg));
            return;
        }
        if self.rules.insert(field, rule).is_some() {
            tracing::debug!(field, keyword = %keyword, line, "validation keyword redeclared, last one wins");
        }
    }
}

/// Split a rule list on top-level commas.
///
/// Commas inside `()`, `[]`, `{}`, quotes, or a `/regex/` literal that opens
/// an argument do not split.
fn split_rules(body: &str) -> Result<Vec<&str>, String> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut in_regex = false;
    let mut escaped = false;
    let mut prev_significant: Option<char> = None;
    let mut start = 0usize;

    for (idx, c) in body.char_indices() {
        if quote.is_some() || in_regex {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if Some(c) == quote {
                quote = None;
            } else if in_regex && c == '/' {
                in_regex = false;
            }
            if !c.is_whitespace() {
                prev_significant = Some(c);
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '/' if prev_significant == Some('(') => in_regex = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced '{}' in rule list", c));
                }
            }
            ',' if depth == 0 => {
                let item = body[start..idx].trim();
                if !item.is_empty() {
                    items.push(item);
                }
                start = idx + c.len_utf8();
            }
            _ => {}
        }
        if !c.is_whitespace() {
            prev_significant = Some(c);
        }
    }
    if quote.is_some() || in_regex {
        return Err("unterminated literal in rule list".into());
    }
    if depth != 0 {
        return Err("unbalanced brackets in rule list".into());
    }
    let tail = body[start..].trim();
    if !tail.is_empty() {
        items.push(tail);
    }
    Ok(items)
}
