// Native value categories
//
// Samples are JSON value trees. Every value falls into exactly one native
// category, which selects the base interpretation for chain resolution.

use std::fmt;

use bitflags::bitflags;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Native category of a sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    /// Lowercase name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the native category of a value
pub fn value_kind(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

bitflags! {
    /// Set of native categories observed at a field path
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueTypes: u8 {
        const NULL = 0b0000_0001;
        const BOOLEAN = 0b0000_0010;
        const NUMBER = 0b0000_0100;
        const STRING = 0b0000_1000;
        const ARRAY = 0b0001_0000;
        const OBJECT = 0b0010_0000;
    }
}

const TYPE_NAMES: [(ValueTypes, &str); 6] = [
    (ValueTypes::NULL, "null"),
    (ValueTypes::BOOLEAN, "boolean"),
    (ValueTypes::NUMBER, "number"),
    (ValueTypes::STRING, "string"),
    (ValueTypes::ARRAY, "array"),
    (ValueTypes::OBJECT, "object"),
];

impl From<ValueKind> for ValueTypes {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Null => ValueTypes::NULL,
            ValueKind::Boolean => ValueTypes::BOOLEAN,
            ValueKind::Number => ValueTypes::NUMBER,
            ValueKind::String => ValueTypes::STRING,
            ValueKind::Array => ValueTypes::ARRAY,
            ValueKind::Object => ValueTypes::OBJECT,
        }
    }
}

impl ValueTypes {
    /// True when any container category was observed
    pub fn has_container(&self) -> bool {
        self.intersects(ValueTypes::ARRAY | ValueTypes::OBJECT)
    }

    /// Names of the contained categories in a fixed order
    pub fn names(&self) -> Vec<&'static str> {
        TYPE_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for ValueTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ValueTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut types = ValueTypes::empty();
        for name in names {
            let flag = TYPE_NAMES
                .iter()
                .find(|(_, known)| *known == name)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| de::Error::custom(format!("unknown value type '{}'", name)))?;
            types |= flag;
        }
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_kind() {
        assert_eq!(value_kind(&json!(null)), ValueKind::Null);
        assert_eq!(value_kind(&json!(1.5)), ValueKind::Number);
        assert_eq!(value_kind(&json!([1])), ValueKind::Array);
        assert_eq!(value_kind(&json!({"a": 1})), ValueKind::Object);
    }

    #[test]
    fn test_types_serialize_as_names() {
        let types = ValueTypes::STRING | ValueTypes::NUMBER;
        let text = serde_json::to_string(&types).unwrap();
        assert_eq!(text, r#"["number","string"]"#);

        let parsed: ValueTypes = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, types);
        assert!(serde_json::from_str::<ValueTypes>(r#"["blob"]"#).is_err());
    }
}
