// Boolean interpretation
//
// Base interpretation for booleans, and downstream of string for the words
// "true" and "false" in any letter case. Booleans reach the network as 0 or 1.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::accumulator::{FieldAccumulator, FieldStatistics, ValueHistogram};
use crate::compiler::layers::{multi_layer_perceptron, NetworkSize};
use crate::interpretation::{as_number, Interpretation, InterpretationRegistry, LayerStacks};
use crate::internal::config::DetectorConfig;
use crate::internal::error::Result;
use crate::schema::types::{ComponentConfig, Schema, SchemaType};
use crate::schema::value::ValueKind;

/// Interpretation configuration of boolean fields
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BooleanConfig {
    pub stack: LayerStacks,
}

/// Truth value of a raw or transformed boolean
fn truth(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.eq_ignore_ascii_case("true"),
        Value::Number(_) => as_number(value).map_or(false, |n| n != 0.0),
        _ => false,
    }
}

#[derive(Debug, Default)]
struct BooleanAccumulator {
    truths: usize,
    falses: usize,
}

impl FieldAccumulator for BooleanAccumulator {
    fn accumulate_value(&mut self, value: &Value) {
        if truth(value) {
            self.truths += 1;
        } else {
            self.falses += 1;
        }
    }

    fn field_statistics(&self) -> FieldStatistics {
        let values = std::iter::repeat("true")
            .take(self.truths)
            .chain(std::iter::repeat("false").take(self.falses));
        FieldStatistics {
            value_histogram: Some(ValueHistogram::compute(values)),
            ..FieldStatistics::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanInterpretation;

impl Interpretation for BooleanInterpretation {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn upstream_interpretations(&self) -> &'static [&'static str] {
        &["string"]
    }

    fn native_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::Boolean]
    }

    fn priority(&self) -> u32 {
        10
    }

    fn check_value(&self, value: &Value) -> bool {
        match value {
            Value::Bool(_) => true,
            Value::String(text) => text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false"),
            _ => false,
        }
    }

    fn transform_value(&self, value: &Value) -> Value {
        Value::Bool(truth(value))
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::Boolean;
    }

    fn create_accumulator(&self, _config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(BooleanAccumulator::default())
    }

    fn default_configuration(&self, _schema: &Schema, _config: &DetectorConfig) -> Result<Value> {
        let configuration = BooleanConfig {
            stack: LayerStacks {
                sequence_layers: Vec::new(),
                fixed_layers: multi_layer_perceptron(NetworkSize::Medium),
            },
        };
        Ok(serde_json::to_value(configuration)?)
    }

    fn transform_schema_for_network(&self, schema: &Schema, _registry: &InterpretationRegistry) -> Result<Schema> {
        let config: BooleanConfig = schema.interpretation_config()?;
        let mut network = schema.clone();
        network.schema_type = SchemaType::Number;
        network.configuration.component = Some(ComponentConfig {
            layers: config.stack.fixed_layers,
            ..ComponentConfig::default()
        });
        Ok(network)
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        _schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        Ok(json!(if truth(value) { 1 } else { 0 }))
    }

    fn transform_value_back_from_network(
        &self,
        value: &Value,
        _schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let number = as_number(value).unwrap_or(0.0);
        Ok(Value::Bool(number.round() != 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        let boolean = BooleanInterpretation;
        assert!(boolean.check_value(&json!(true)));
        assert!(boolean.check_value(&json!("TRUE")));
        assert!(boolean.check_value(&json!("false")));
        assert!(!boolean.check_value(&json!("yes")));
        assert!(!boolean.check_value(&json!(1)));
        assert_eq!(boolean.transform_value(&json!("True")), json!(true));
    }

    #[test]
    fn test_network_round_trip() {
        let registry = InterpretationRegistry::with_defaults();
        let boolean = BooleanInterpretation;
        let mut schema = Schema::leaf("flag", SchemaType::Boolean);
        schema.configuration.interpretation = boolean
            .default_configuration(&schema, &DetectorConfig::default())
            .unwrap();

        assert_eq!(boolean.transform_value_for_network(&json!(true), &schema, &registry).unwrap(), json!(1));
        assert_eq!(boolean.transform_value_for_network(&json!(false), &schema, &registry).unwrap(), json!(0));
        assert_eq!(
            boolean.transform_value_back_from_network(&json!(0.7), &schema, &registry).unwrap(),
            json!(true)
        );
        assert_eq!(
            boolean.transform_value_back_from_network(&json!(0.2), &schema, &registry).unwrap(),
            json!(false)
        );

        let network = boolean.transform_schema_for_network(&schema, &registry).unwrap();
        assert_eq!(network.schema_type, SchemaType::Number);
        assert!(!network.component().layers.is_empty());
    }

    #[test]
    fn test_accumulator() {
        let mut accumulator = BooleanInterpretation.create_accumulator(&DetectorConfig::default());
        for value in [json!(true), json!(false), json!(true)] {
            accumulator.accumulate_value(&value);
        }
        let histogram = accumulator.field_statistics().value_histogram.unwrap();
        assert_eq!(histogram.values[0].value, "true");
        assert_eq!(histogram.values[0].frequency, 2);
        assert_eq!(histogram.total(), 3);
    }
}
