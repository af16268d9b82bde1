// Schema type system
//
// This module defines the Schema tree produced by detection and consumed by
// the architecture compiler. Object properties are kept in a sorted map so
// serialization and compilation are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accumulator::FieldStatistics;
use crate::compiler::layers::LayerSpec;
use crate::internal::error::{Error, Result};
use crate::schema::utils;
use crate::schema::value::ValueTypes;

/// Structural type of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Binary,
}

impl SchemaType {
    /// Lowercase name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Binary => "binary",
        }
    }

    /// Returns true for container types
    pub fn is_container(&self) -> bool {
        matches!(self, SchemaType::Object | SchemaType::Array)
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics and naming information attached to every schema node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldMetadata {
    /// Final segment of the variable path
    pub variable_name: String,
    /// Dotted path from the root ("." for objects, "[]" for array items)
    pub variable_path: String,
    /// Native value types observed
    pub types: ValueTypes,
    /// Bounded list of example values
    pub examples: Vec<Value>,
    /// Canonical interpretation chain
    pub interpretation_chain: Option<Vec<String>>,
    /// Last interpretation of the canonical chain
    pub main_interpretation: Option<String>,
    /// Number of distinct values, by fingerprint
    pub distinct: usize,
    /// Number of values observed
    pub total: usize,
    /// Distinct over total
    pub cardinality: f64,
    /// Interpretation specific statistics
    pub statistics: FieldStatistics,
}

/// Configuration of the compiler strategy for a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentConfig {
    /// Layer stack applied by the strategy
    pub layers: Vec<LayerSpec>,
    /// Whether sequences are truncated to `max_sequence_length`
    pub enforce_sequence_length_limit: bool,
    /// Maximum sequence length when enforced
    pub max_sequence_length: usize,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            enforce_sequence_length_limit: false,
            max_sequence_length: 2500,
        }
    }
}

/// User-controlled configuration of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldConfiguration {
    /// Whether the node takes part in the architecture
    pub included: bool,
    /// Settings owned by the node's main interpretation
    #[serde(skip_serializing_if = "Value::is_null")]
    pub interpretation: Value,
    /// Settings owned by the compiler strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentConfig>,
}

impl Default for FieldConfiguration {
    fn default() -> Self {
        Self {
            included: true,
            interpretation: Value::Null,
            component: None,
        }
    }
}

/// A node of the schema tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Variable path of the node
    #[serde(default)]
    pub title: String,

    /// Structural type
    #[serde(rename = "type")]
    pub schema_type: SchemaType,

    /// Child schemas of an object, sorted by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,

    /// Item schema of an array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    /// Enumerated values of a classification node
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default)]
    pub metadata: FieldMetadata,

    #[serde(default)]
    pub configuration: FieldConfiguration,
}

impl Schema {
    /// Creates a leaf schema
    pub fn leaf(title: &str, schema_type: SchemaType) -> Self {
        Self {
            title: title.to_string(),
            schema_type,
            properties: None,
            items: None,
            enum_values: None,
            metadata: FieldMetadata::default(),
            configuration: FieldConfiguration::default(),
        }
    }

    /// Creates an object schema
    pub fn object(title: &str, properties: BTreeMap<String, Schema>) -> Self {
        let mut schema = Self::leaf(title, SchemaType::Object);
        schema.properties = Some(properties);
        schema
    }

    /// Creates an array schema
    pub fn array(title: &str, items: Schema) -> Self {
        let mut schema = Self::leaf(title, SchemaType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    /// Parses a schema from JSON text and fills in missing variable names
    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut schema: Schema = serde_json::from_str(text)?;
        schema.validate()?;
        if schema.metadata.variable_path.is_empty() && !schema.title.is_empty() {
            let root = schema.title.clone();
            schema.update_variable_names_from(&root);
        } else {
            schema.update_variable_names_and_paths();
        }
        Ok(schema)
    }

    /// Serializes the schema to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_object(&self) -> bool {
        self.schema_type == SchemaType::Object
    }

    pub fn is_array(&self) -> bool {
        self.schema_type == SchemaType::Array
    }

    /// A field is any node that is neither an object nor an array
    pub fn is_field(&self) -> bool {
        !self.schema_type.is_container()
    }

    pub fn variable_name(&self) -> &str {
        &self.metadata.variable_name
    }

    pub fn variable_path(&self) -> &str {
        &self.metadata.variable_path
    }

    /// Variable name with every non-word character removed
    pub fn machine_variable_name(&self) -> String {
        utils::machine_name(&self.metadata.variable_name)
    }

    /// Variable path rendered as a single identifier
    pub fn machine_variable_path(&self) -> String {
        utils::machine_path(&self.metadata.variable_path)
    }

    /// Name of the main interpretation, if detection assigned one
    pub fn main_interpretation(&self) -> Option<&str> {
        self.metadata.main_interpretation.as_deref()
    }

    /// Children of an object in sorted order; empty for other nodes
    pub fn children(&self) -> Vec<&Schema> {
        match &self.properties {
            Some(properties) if self.is_object() => properties.values().collect(),
            _ => Vec::new(),
        }
    }

    /// Item schema of an array
    pub fn items(&self) -> Result<&Schema> {
        self.items.as_deref().ok_or_else(|| {
            Error::SchemaError(format!("Array schema '{}' has no items", self.title))
        })
    }

    /// This node followed by all descendants, depth first
    pub fn all_schemas(&self) -> Vec<&Schema> {
        let mut schemas = vec![self];
        for child in self.children() {
            schemas.extend(child.all_schemas());
        }
        if let Some(items) = &self.items {
            schemas.extend(items.all_schemas());
        }
        schemas
    }

    /// Visits every descendant with its parent
    pub fn walk<F: FnMut(&Schema, &Schema)>(&self, func: &mut F) {
        for child in self.children() {
            func(child, self);
            child.walk(func);
        }
        if let Some(items) = &self.items {
            func(items, self);
            items.walk(func);
        }
    }

    /// Recomputes titles, variable names and paths from the tree structure
    pub fn update_variable_names_and_paths(&mut self) {
        self.update_variable_names_from("");
    }

    /// Recomputes titles, variable names and paths below an explicit root path
    pub fn update_variable_names_from(&mut self, path: &str) {
        self.title = path.to_string();
        self.metadata.variable_path = path.to_string();
        self.metadata.variable_name = utils::last_segment(path).to_string();

        if let Some(properties) = self.properties.as_mut() {
            for (name, child) in properties.iter_mut() {
                child.update_variable_names_from(&utils::join_path(path, name));
            }
        }
        if let Some(items) = self.items.as_mut() {
            items.update_variable_names_from(&utils::join_path(path, utils::ARRAY_SEGMENT));
        }
    }

    /// Checks the structural invariants of the tree
    pub fn validate(&self) -> Result<()> {
        self.validate_node()?;
        let mut failure = None;
        self.walk(&mut |child: &Schema, parent: &Schema| {
            if failure.is_none() {
                failure = child.validate_node().err().map(|error| match error {
                    Error::SchemaError(message) => {
                        Error::SchemaError(format!("{} (inside '{}')", message, parent.title))
                    }
                    other => other,
                });
            }
        });
        failure.map_or(Ok(()), Err)
    }

    fn validate_node(&self) -> Result<()> {
        match self.schema_type {
            SchemaType::Object => {
                if self.items.is_some() {
                    return Err(Error::SchemaError(format!(
                        "Object schema '{}' must not carry items", self.title
                    )));
                }
            }
            SchemaType::Array => {
                if self.items.is_none() {
                    return Err(Error::SchemaError(format!(
                        "Array schema '{}' must have exactly one items schema", self.title
                    )));
                }
                if self.properties.is_some() {
                    return Err(Error::SchemaError(format!(
                        "Array schema '{}' must not carry properties", self.title
                    )));
                }
            }
            _ => {
                if self.items.is_some() || self.properties.is_some() {
                    return Err(Error::SchemaError(format!(
                        "Field schema '{}' must not have children", self.title
                    )));
                }
            }
        }
        Ok(())
    }

    /// Deserializes the interpretation configuration into a typed structure
    pub fn interpretation_config<T: DeserializeOwned>(&self) -> Result<T> {
        if self.configuration.interpretation.is_null() {
            return Err(Error::ConfigError(format!(
                "Schema '{}' has no interpretation configuration", self.title
            )));
        }
        serde_json::from_value(self.configuration.interpretation.clone()).map_err(|e| {
            Error::ConfigError(format!(
                "Invalid interpretation configuration for '{}': {}", self.title, e
            ))
        })
    }

    /// Component configuration, or the default when none is set
    pub fn component(&self) -> ComponentConfig {
        self.configuration.component.clone().unwrap_or_default()
    }

    /// Number of enumerated values of a classification node
    pub fn enum_len(&self) -> Option<usize> {
        self.enum_values.as_ref().map(|values| values.len())
    }
}
