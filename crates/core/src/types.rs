//! Field type vocabulary.

use serde::{Serialize, Serializer};
use std::fmt;

/// Declared type of a schema field.
///
/// Also the domain of the keyword compatibility matrix in [`crate::rules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Number,
    String,
    Binary,
    Date,
    Boolean,
    ByteArray,
    Object,
    Null,
    Undefined,
    Array,
    NumberArray,
    StringArray,
    ObjectArray,
    AnyArray,
    Any,
}

/// Every accepted type token and the tag it maps to. Matching is exact.
pub const TYPE_TOKENS: &[(&str, TypeTag)] = &[
    ("Number", TypeTag::Number),
    ("String", TypeTag::String),
    ("Binary", TypeTag::Binary),
    ("Date", TypeTag::Date),
    ("Boolean", TypeTag::Boolean),
    ("byte-array", TypeTag::ByteArray),
    ("Object", TypeTag::Object),
    ("Any[]", TypeTag::AnyArray),
    ("StringArray", TypeTag::StringArray),
    ("ObjectArray", TypeTag::ObjectArray),
    ("NumberArray", TypeTag::NumberArray),
    ("Number[]", TypeTag::NumberArray),
    ("String[]", TypeTag::StringArray),
    ("Object[]", TypeTag::ObjectArray),
    ("Null", TypeTag::Null),
    ("undefined", TypeTag::Undefined),
    ("Array", TypeTag::Array),
    ("[]", TypeTag::Array),
    ("Any", TypeTag::Any),
    ("AnyArray", TypeTag::AnyArray),
];

impl TypeTag {
    /// Look up a type token from a schema declaration.
    pub fn from_token(token: &str) -> Option<TypeTag> {
        TYPE_TOKENS
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, tag)| *tag)
    }

    /// Canonical spelling, used in diagnostics and serialized output.
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Number => "Number",
            TypeTag::String => "String",
            TypeTag::Binary => "Binary",
            TypeTag::Date => "Date",
            TypeTag::Boolean => "Boolean",
            TypeTag::ByteArray => "byte-array",
            TypeTag::Object => "Object",
            TypeTag::Null => "Null",
            TypeTag::Undefined => "undefined",
            TypeTag::Array => "Array",
            TypeTag::NumberArray => "NumberArray",
            TypeTag::StringArray => "StringArray",
            TypeTag::ObjectArray => "ObjectArray",
            TypeTag::AnyArray => "AnyArray",
            TypeTag::Any => "Any",
        }
    }

    /// Types that may carry a nested field shape.
    pub fn has_shape(&self) -> bool {
        matches!(self, TypeTag::Object | TypeTag::ObjectArray)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            TypeTag::Array
                | TypeTag::NumberArray
                | TypeTag::StringArray
                | TypeTag::ObjectArray
                | TypeTag::AnyArray
                | TypeTag::ByteArray
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
