// Interpretations
//
// An interpretation is a pluggable semantic type. It decides whether a value
// belongs to it, transforms values and schemas forward into its own form, and
// knows how its values are presented to and recovered from the network.
//
// Interpretations form chains: each one names the interpretations it may
// follow (its upstream), and detection walks downstream from a base
// interpretation chosen by the native category of the value.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accumulator::FieldAccumulator;
use crate::compiler::layers::LayerSpec;
use crate::internal::config::DetectorConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::Schema;
use crate::schema::value::ValueKind;

pub mod boolean;
pub mod date;
pub mod hex;
pub mod number;
pub mod object;
pub mod registry;
pub mod sequence;
pub mod string;

pub use self::registry::InterpretationRegistry;

/// Layer stacks stored in interpretation configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerStacks {
    /// Recurrent stack used when a value becomes a sequence
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sequence_layers: Vec<LayerSpec>,
    /// Fixed-size stack used for scalar outputs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fixed_layers: Vec<LayerSpec>,
}

/// A pluggable semantic type
pub trait Interpretation: Debug + Send + Sync {
    /// Unique name, recorded in interpretation chains
    fn name(&self) -> &'static str;

    /// Interpretations this one may directly follow in a chain
    fn upstream_interpretations(&self) -> &'static [&'static str] {
        &[]
    }

    /// Native categories for which this is the base interpretation
    fn native_kinds(&self) -> &'static [ValueKind] {
        &[]
    }

    /// Candidate ordering among downstream interpretations, lower first
    fn priority(&self) -> u32 {
        100
    }

    /// Whether the value, already transformed by the upstream chain, belongs here
    fn check_value(&self, value: &Value) -> bool;

    /// Transforms an accepted value into this interpretation's form
    fn transform_value(&self, value: &Value) -> Value {
        value.clone()
    }

    /// Applies this interpretation to a detected schema node
    fn transform_schema(&self, schema: &mut Schema);

    /// Shortens a value before it is kept as an example
    fn transform_example(&self, value: &Value) -> Value {
        value.clone()
    }

    /// Creates the statistics accumulator for values of this interpretation
    fn create_accumulator(&self, config: &DetectorConfig) -> Box<dyn FieldAccumulator>;

    /// Default `configuration.interpretation` for a detected node
    fn default_configuration(&self, schema: &Schema, config: &DetectorConfig) -> Result<Value>;

    /// Schema of the values this interpretation hands to the network
    fn transform_schema_for_network(&self, schema: &Schema, _registry: &InterpretationRegistry) -> Result<Schema> {
        Err(self.unimplemented("transform_schema_for_network", schema))
    }

    /// Converts a value into its network form
    fn transform_value_for_network(
        &self,
        _value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        Err(self.unimplemented("transform_value_for_network", schema))
    }

    /// Recovers a value from its network form
    fn transform_value_back_from_network(
        &self,
        _value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        Err(self.unimplemented("transform_value_back_from_network", schema))
    }

    /// Accuracy of a recovered network output against the expected value, in [0, 1]
    fn compare_network_outputs(&self, expected: &Value, actual: &Value, _schema: &Schema) -> Result<f64> {
        Ok(if expected == actual { 1.0 } else { 0.0 })
    }

    /// Error for an operation this interpretation does not provide
    fn unimplemented(&self, operation: &str, schema: &Schema) -> Error {
        Error::UnimplementedCapability(format!(
            "Interpretation {} does not implement {} (field '{}')",
            self.name(),
            operation,
            schema.title
        ))
    }
}

/// Textual form of a scalar value
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric form of a scalar value; strings are parsed, anything else is None
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// JSON number, integral when the value has no fractional part
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_helpers() {
        assert_eq!(as_text(&json!("abc")), "abc");
        assert_eq!(as_text(&json!(12)), "12");
        assert_eq!(as_number(&json!("-3.5")), Some(-3.5));
        assert_eq!(as_number(&json!([1])), None);
        assert_eq!(number_value(4.0), json!(4));
        assert_eq!(number_value(0.5), json!(0.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_layer_stacks_serialization() {
        let stacks = LayerStacks {
            sequence_layers: Vec::new(),
            fixed_layers: vec![LayerSpec::new("Tanh").unwrap()],
        };
        let value = serde_json::to_value(&stacks).unwrap();
        assert!(value.get("sequenceLayers").is_none());
        assert_eq!(value["fixedLayers"][0]["name"], "Tanh");
    }
}
