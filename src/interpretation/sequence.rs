// Sequence interpretation
//
// Base interpretation for arrays. Items are handed to the network through the
// main interpretation of the item schema, one after the other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accumulator::{FieldAccumulator, FieldStatistics, NumberHistogram};
use crate::compiler::layers::{multi_layer_lstm, NetworkSize};
use crate::interpretation::{Interpretation, InterpretationRegistry, LayerStacks};
use crate::internal::config::DetectorConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::{ComponentConfig, Schema, SchemaType};
use crate::schema::value::ValueKind;

/// Interpretation configuration of array fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SequenceConfig {
    pub enforce_sequence_length_limit: bool,
    pub max_sequence_length: usize,
    pub stack: LayerStacks,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            enforce_sequence_length_limit: false,
            max_sequence_length: 2500,
            stack: LayerStacks::default(),
        }
    }
}

#[derive(Debug)]
struct SequenceAccumulator {
    lengths: Vec<f64>,
    desired_buckets: usize,
}

impl FieldAccumulator for SequenceAccumulator {
    fn accumulate_value(&mut self, value: &Value) {
        if let Value::Array(items) = value {
            self.lengths.push(items.len() as f64);
        }
    }

    fn field_statistics(&self) -> FieldStatistics {
        FieldStatistics {
            array_length_histogram: Some(NumberHistogram::compute(&self.lengths, self.desired_buckets)),
            ..FieldStatistics::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceInterpretation;

impl SequenceInterpretation {
    fn items_of<'a>(value: &'a Value, schema: &Schema) -> Result<&'a [Value]> {
        match value {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(&[]),
            other => Err(Error::SchemaShapeMismatch(format!(
                "Field '{}' expects an array, got {}",
                schema.title, other
            ))),
        }
    }
}

impl Interpretation for SequenceInterpretation {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn native_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::Array]
    }

    fn check_value(&self, value: &Value) -> bool {
        value.is_array()
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::Array;
    }

    fn transform_example(&self, _value: &Value) -> Value {
        Value::Null
    }

    fn create_accumulator(&self, config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(SequenceAccumulator {
            lengths: Vec::new(),
            desired_buckets: config.desired_histogram_buckets,
        })
    }

    fn default_configuration(&self, _schema: &Schema, _config: &DetectorConfig) -> Result<Value> {
        let configuration = SequenceConfig {
            stack: LayerStacks {
                sequence_layers: multi_layer_lstm(NetworkSize::Medium),
                fixed_layers: Vec::new(),
            },
            ..SequenceConfig::default()
        };
        Ok(serde_json::to_value(configuration)?)
    }

    fn transform_schema_for_network(&self, schema: &Schema, registry: &InterpretationRegistry) -> Result<Schema> {
        let config: SequenceConfig = schema.interpretation_config()?;
        let items = schema.items()?;
        let item_network = registry.for_schema(items)?.transform_schema_for_network(items, registry)?;

        let mut network = schema.clone();
        network.items = Some(Box::new(item_network));
        network.configuration.component = Some(ComponentConfig {
            layers: config.stack.sequence_layers,
            enforce_sequence_length_limit: config.enforce_sequence_length_limit,
            max_sequence_length: config.max_sequence_length,
        });
        if let Some(items) = network.items.as_deref_mut() {
            if items.configuration.component.is_none() {
                items.configuration.component = Some(ComponentConfig::default());
            }
        }
        Ok(network)
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        schema: &Schema,
        registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let items = schema.items()?;
        let interpretation = registry.for_schema(items)?;
        Self::items_of(value, schema)?
            .iter()
            .map(|item| interpretation.transform_value_for_network(item, items, registry))
            .collect::<Result<Vec<Value>>>()
            .map(Value::Array)
    }

    fn transform_value_back_from_network(
        &self,
        value: &Value,
        schema: &Schema,
        registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let items = schema.items()?;
        let interpretation = registry.for_schema(items)?;
        Self::items_of(value, schema)?
            .iter()
            .map(|item| interpretation.transform_value_back_from_network(item, items, registry))
            .collect::<Result<Vec<Value>>>()
            .map(Value::Array)
    }

    fn compare_network_outputs(&self, expected: &Value, actual: &Value, schema: &Schema) -> Result<f64> {
        let expected = Self::items_of(expected, schema)?;
        let actual = Self::items_of(actual, schema)?;
        let longest = expected.len().max(actual.len());
        if longest == 0 {
            return Ok(1.0);
        }
        let matching = expected.iter().zip(actual).filter(|(e, a)| e == a).count();
        Ok(matching as f64 / longest as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpretation::hex::HexInterpretation;
    use serde_json::json;

    fn hex_list() -> Schema {
        let mut items = Schema::leaf("blobs.[]", SchemaType::Binary);
        items.metadata.main_interpretation = Some("hex".to_string());
        items.configuration.interpretation = json!({});

        let mut schema = Schema::array("blobs", items);
        schema.metadata.main_interpretation = Some("sequence".to_string());
        schema.configuration.interpretation = SequenceInterpretation
            .default_configuration(&schema, &DetectorConfig::default())
            .unwrap();
        schema
    }

    #[test]
    fn test_items_use_their_interpretation() {
        let registry = InterpretationRegistry::with_defaults();
        let schema = hex_list();
        let value = json!(["0a", "ff"]);

        let network = SequenceInterpretation
            .transform_value_for_network(&value, &schema, &registry)
            .unwrap();
        assert_eq!(network[1], json!([{"hex": "f"}, {"hex": "f"}]));

        let back = SequenceInterpretation
            .transform_value_back_from_network(&network, &schema, &registry)
            .unwrap();
        assert_eq!(back, value);
        assert_eq!(
            HexInterpretation.transform_value_back_from_network(&network[0], schema.items().unwrap(), &registry).unwrap(),
            json!("0a")
        );
    }

    #[test]
    fn test_network_schema_carries_component() {
        let registry = InterpretationRegistry::with_defaults();
        let network = SequenceInterpretation
            .transform_schema_for_network(&hex_list(), &registry)
            .unwrap();

        let component = network.component();
        assert_eq!(component.max_sequence_length, 2500);
        assert!(!component.enforce_sequence_length_limit);
        assert_eq!(component.layers.len(), multi_layer_lstm(NetworkSize::Medium).len());
        assert!(network.items().unwrap().is_array());
    }

    #[test]
    fn test_scalar_is_a_shape_mismatch() {
        let registry = InterpretationRegistry::with_defaults();
        let result = SequenceInterpretation.transform_value_for_network(&json!(5), &hex_list(), &registry);
        assert!(matches!(result, Err(Error::SchemaShapeMismatch(_))));
    }

    #[test]
    fn test_length_histogram() {
        let mut accumulator = SequenceInterpretation.create_accumulator(&DetectorConfig::default());
        for value in [json!([1, 2]), json!([]), json!([1, 2, 3])] {
            accumulator.accumulate_value(&value);
        }
        let histogram = accumulator.field_statistics().array_length_histogram.unwrap();
        assert_eq!(histogram.total(), 3);
        assert!(SequenceInterpretation.transform_example(&json!([1])).is_null());
    }
}
