use super::{boundary, Boundary, SectionPass};
use crate::error::{ErrorList, ParseError};
use crate::schema::{Schema, SchemaField};
use crate::source::Line;
use crate::types::TypeTag;

/// An open `{ ... }` block. `path` is `None` when the opening declaration was
/// rejected; lines inside such a block are skipped silently.
struct Scope {
    path: Option<String>,
    line: u32,
}

/// Parses one `@schema` section body.
pub(crate) struct SchemaParser<'a> {
    lines: &'a [Line],
    pos: usize,
    errors: ErrorList,
    schema: Schema,
    scopes: Vec<Scope>,
}

impl<'a> SchemaParser<'a> {
    pub(crate) fn new(lines: &'a [Line], start: usize) -> Self {
        SchemaParser {
            lines,
            pos: start,
            errors: ErrorList::new(),
            schema: Schema::new(),
            scopes: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> SectionPass<Schema> {
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

            let text = line.text.trim_end_matches(',').trim_end();
            if text == "}" {
                if self.scopes.pop().is_none() {
                    self.errors
                        .push(ParseError::at(line.number, "unmatched '}' in @schema"));
                }
                continue;
            }
            if self.scopes.last().is_some_and(|s| s.path.is_none()) {
                // Inside a rejected block: track nesting only.
                if text.ends_with('{') {
                    self.scopes.push(Scope {
                        path: None,
                        line: line.number,
                    });
                }
                continue;
            }
            self.declaration(line.number, text);
        }

        for scope in std::mem::take(&mut self.scopes) {
            if let Some(path) = scope.path {
                self.errors.push(ParseError::at(
                    scope.line,
                    format!("nested fields of '{}' are not closed with '}}'", path),
                ));
            }
        }

        SectionPass {
            value: self.schema,
            errors: self.errors,
            cursor: self.pos,
            closed,
        }
    }

    /// `<name>: <TypeTag>` or `<name>: <TypeTag> {`.
    fn declaration(&mut self, line: u32, text: &str) {
        let (opens_block, text) = match text.strip_suffix('{') {
            Some(rest) => (true, rest.trim_end()),
            None => (false, text),
        };

        let Some((name, type_token)) = text.split_once(':') else {
            self.reject(
                line,
                opens_block,
                format!("expected '<field>: <type>', got '{}'", text),
            );
            return;
        };
        let name = name.trim();
        let type_token = type_token.trim();

        if !is_valid_path(name) {
            self.reject(line, opens_block, format!("invalid field name '{}'", name));
            return;
        }
        let Some(ty) = TypeTag::from_token(type_token) else {
            self.reject(
                line,
                opens_block,
                format!("unknown type '{}' for field '{}'", type_token, name),
            );
            return;
        };
        if opens_block && !ty.has_shape() {
            self.reject(
                line,
                opens_block,
                format!("type {} of field '{}' cannot declare nested fields", ty, name),
            );
            return;
        }

        // Full path of the new field: enclosing block path + declared name.
        let full_path = match self.scopes.last().and_then(|s| s.path.as_deref()) {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_owned(),
        };
        let (parent, leaf) = match full_path.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent.to_owned()), leaf.to_owned()),
            None => (None, full_path.clone()),
        };

        let target = match &parent {
            None => &mut self.schema,
            Some(parent_path) => match self.schema.resolve_mut(parent_path) {
                Some(field) if field.ty.has_shape() => field.shape.get_or_insert_with(Schema::new),
                Some(field) => {
                    let msg = format!(
                        "field '{}' is {} and cannot contain '{}'",
                        parent_path, field.ty, leaf
                    );
                    self.reject(line, opens_block, msg);
                    return;
                }
                None => {
                    self.reject(
                        line,
                        opens_block,
                        format!("unknown parent field '{}' for '{}'", parent_path, leaf),
                    );
                    return;
                }
            },
        };

        if target.fields.contains_key(&leaf) {
            self.reject(line, opens_block, format!("duplicate field '{}'", full_path));
            return;
        }
        let mut field = SchemaField::new(leaf.clone(), ty);
        field.line = line;
        target.fields.insert(leaf, field);

        if opens_block {
            self.scopes.push(Scope {
                path: Some(full_path),
                line,
            });
        }
    }

    fn reject(&mut self, line: u32, opens_block: bool, message: String) {
        self.errors.push(ParseError::at(line, message));
        if opens_block {
            self.scopes.push(Scope { path: None, line });
        }
    }
}

fn is_valid_path(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '-')
        })
}
