//! Parsed schema model.

use indexmap::IndexMap;
use serde::Serialize;

use crate::types::TypeTag;

/// One declared field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeTag,
    /// Declaration line; 0 for schemas built in code.
    #[serde(skip)]
    pub line: u32,
    /// Nested field shape for `Object` / `ObjectArray` fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Schema>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, ty: TypeTag) -> Self {
        SchemaField {
            name: name.into(),
            ty,
            line: 0,
            shape: None,
        }
    }

    pub fn with_shape(mut self, shape: Schema) -> Self {
        self.shape = Some(shape);
        self
    }
}

/// Field name to declaration, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    pub fields: IndexMap<String, SchemaField>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for schemas assembled in code.
    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SchemaField> {
        self.fields.get(name)
    }

    /// Resolve a dotted path (`address.city`) through nested shapes.
    pub fn resolve(&self, path: &str) -> Option<&SchemaField> {
        let mut parts = path.split('.');
        let mut field = self.fields.get(parts.next()?)?;
        for part in parts {
            field = field.shape.as_ref()?.fields.get(part)?;
        }
        Some(field)
    }

    pub(crate) fn resolve_mut(&mut self, path: &str) -> Option<&mut SchemaField> {
        let mut parts = path.split('.');
        let mut field = self.fields.get_mut(parts.next()?)?;
        for part in parts {
            field = field.shape.as_mut()?.fields.get_mut(part)?;
        }
        Some(field)
    }

    /// Total number of declared fields, nested ones included.
    pub fn field_count(&self) -> usize {
        self.fields
            .values()
            .map(|f| 1 + f.shape.as_ref().map_or(0, Schema::field_count))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        let address = Schema::new()
            .field(SchemaField::new("city", TypeTag::String))
            .field(SchemaField::new("zip", TypeTag::String));
        Schema::new()
            .field(SchemaField::new("name", TypeTag::String))
            .field(SchemaField::new("address", TypeTag::Object).with_shape(address))
    }

    #[test]
    fn resolves_dotted_paths() {
        let schema = sample();
        assert_eq!(schema.resolve("address.city").unwrap().ty, TypeTag::String);
        assert!(schema.resolve("address.street").is_none());
        assert!(schema.resolve("name.first").is_none());
    }

    #[test]
    fn counts_nested_fields() {
        assert_eq!(sample().field_count(), 4);
    }

    #[test]
    fn serializes_in_declaration_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        let name_at = json.find("\"name\"").unwrap();
        let address_at = json.find("\"address\"").unwrap();
        assert!(name_at < address_at);
        assert!(json.contains("\"type\":\"Object\""));
    }
}
