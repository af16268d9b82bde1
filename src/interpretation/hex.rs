// Hexadecimal interpretation
//
// Downstream of string for non-empty, even-length runs of hexadecimal digits.
// Binary blobs travel through the crate as such strings. On the network side
// a blob is a sequence of single digit classifications.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::accumulator::{FieldAccumulator, FieldStatistics, ValueHistogram};
use crate::interpretation::{as_text, Interpretation, InterpretationRegistry};
use crate::internal::config::DetectorConfig;
use crate::internal::error::Result;
use crate::schema::types::{Schema, SchemaType};
use crate::schema::utils::{join_path, ARRAY_SEGMENT};

const HEX_DIGITS: [&str; 16] = [
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "a", "b", "c", "d", "e", "f",
];

const MAX_EXAMPLE_LENGTH: usize = 50;

#[derive(Debug)]
struct HexAccumulator {
    values: Vec<String>,
    max_length: usize,
}

impl FieldAccumulator for HexAccumulator {
    fn accumulate_value(&mut self, value: &Value) {
        if let Value::String(text) = value {
            if text.len() < self.max_length {
                self.values.push(text.clone());
            }
        }
    }

    fn field_statistics(&self) -> FieldStatistics {
        FieldStatistics {
            value_histogram: Some(ValueHistogram::compute(&self.values)),
            ..FieldStatistics::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HexInterpretation;

impl Interpretation for HexInterpretation {
    fn name(&self) -> &'static str {
        "hex"
    }

    fn upstream_interpretations(&self) -> &'static [&'static str] {
        &["string"]
    }

    fn priority(&self) -> u32 {
        40
    }

    fn check_value(&self, value: &Value) -> bool {
        match value {
            Value::String(text) => !text.is_empty() && hex::decode(text).is_ok(),
            _ => false,
        }
    }

    fn transform_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(text.to_ascii_lowercase()),
            other => other.clone(),
        }
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::Binary;
    }

    fn transform_example(&self, value: &Value) -> Value {
        match value {
            Value::String(text) if text.len() > MAX_EXAMPLE_LENGTH => {
                Value::String(format!("{}...", &text[..MAX_EXAMPLE_LENGTH]))
            }
            other => other.clone(),
        }
    }

    fn create_accumulator(&self, config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(HexAccumulator {
            values: Vec::new(),
            max_length: config.max_string_length_for_histogram,
        })
    }

    fn default_configuration(&self, _schema: &Schema, _config: &DetectorConfig) -> Result<Value> {
        Ok(json!({}))
    }

    fn transform_schema_for_network(&self, schema: &Schema, _registry: &InterpretationRegistry) -> Result<Schema> {
        let item_path = join_path(&schema.title, ARRAY_SEGMENT);

        let mut digit = Schema::leaf(&join_path(&item_path, "hex"), SchemaType::String);
        let mut values = vec![Value::Null];
        values.extend(HEX_DIGITS.iter().map(|digit| Value::from(*digit)));
        digit.enum_values = Some(values);

        let mut properties = BTreeMap::new();
        properties.insert("hex".to_string(), digit);

        let mut network = Schema::array(&schema.title, Schema::object(&item_path, properties));
        network.metadata = schema.metadata.clone();
        Ok(network)
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let text = as_text(value).to_ascii_lowercase();
        let digits = text
            .chars()
            .map(|c| {
                if c.is_ascii_hexdigit() {
                    json!({ "hex": c.to_string() })
                } else {
                    debug!(field = %schema.title, character = %c, "Character is not a hexadecimal digit");
                    json!({ "hex": null })
                }
            })
            .collect();
        Ok(Value::Array(digits))
    }

    fn transform_value_back_from_network(
        &self,
        value: &Value,
        _schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        if value.is_string() {
            return Ok(value.clone());
        }
        let text: String = value
            .as_array()
            .map(|items| items.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|item| item.get("hex").and_then(Value::as_str))
            .filter(|digit| HEX_DIGITS.contains(digit))
            .collect();
        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        let hex = HexInterpretation;
        assert!(hex.check_value(&json!("ff00")));
        assert!(hex.check_value(&json!("DEADbeef")));
        assert!(!hex.check_value(&json!("f")));
        assert!(!hex.check_value(&json!("")));
        assert!(!hex.check_value(&json!("zz")));
        assert_eq!(hex.transform_value(&json!("DEADbeef")), json!("deadbeef"));
    }

    #[test]
    fn test_network_round_trip() {
        let registry = InterpretationRegistry::with_defaults();
        let hex = HexInterpretation;
        let schema = Schema::leaf("blob", SchemaType::Binary);

        let network = hex.transform_value_for_network(&json!("ff00"), &schema, &registry).unwrap();
        assert_eq!(network, json!([{"hex": "f"}, {"hex": "f"}, {"hex": "0"}, {"hex": "0"}]));
        let back = hex.transform_value_back_from_network(&network, &schema, &registry).unwrap();
        assert_eq!(back, json!("ff00"));
    }

    #[test]
    fn test_non_hex_characters_map_to_unknown() {
        let registry = InterpretationRegistry::with_defaults();
        let hex = HexInterpretation;
        let schema = Schema::leaf("blob", SchemaType::Binary);

        let network = hex.transform_value_for_network(&json!("ffzz"), &schema, &registry).unwrap();
        assert_eq!(network, json!([{"hex": "f"}, {"hex": "f"}, {"hex": null}, {"hex": null}]));

        // Unknown entries sit at enum index 0 and are dropped on the way back
        let network_schema = hex.transform_schema_for_network(&schema, &registry).unwrap();
        let digit = &network_schema.items().unwrap().properties.as_ref().unwrap()["hex"];
        assert_eq!(digit.enum_values.as_ref().unwrap()[0], Value::Null);
        let back = hex.transform_value_back_from_network(&network, &schema, &registry).unwrap();
        assert_eq!(back, json!("ff"));
    }

    #[test]
    fn test_network_schema() {
        let registry = InterpretationRegistry::with_defaults();
        let schema = Schema::leaf("blob", SchemaType::Binary);
        let network = HexInterpretation.transform_schema_for_network(&schema, &registry).unwrap();

        assert!(network.is_array());
        let digit = &network.items().unwrap().properties.as_ref().unwrap()["hex"];
        assert_eq!(digit.title, "blob.[].hex");
        assert_eq!(digit.enum_len(), Some(17));
    }
}
