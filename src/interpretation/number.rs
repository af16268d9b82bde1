// Number interpretation
//
// Base interpretation for numbers, and downstream of string for strings that
// spell a decimal number. Numbers reach the network either as a continuous
// value (raw with a scaling function, or normalized to a z-score) or as the
// index of a configured bucket.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::accumulator::{mean_and_deviation, FieldAccumulator, FieldStatistics, NumberHistogram};
use crate::compiler::layers::{multi_layer_perceptron, NetworkSize};
use crate::interpretation::{as_number, number_value, Interpretation, InterpretationRegistry, LayerStacks};
use crate::internal::config::DetectorConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::{ComponentConfig, Schema, SchemaType};
use crate::schema::value::ValueKind;

/// How numbers are presented to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberMode {
    ContinuousRaw,
    ContinuousNormalized,
    Discrete,
}

impl FromStr for NumberMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "continuous_raw" => Ok(NumberMode::ContinuousRaw),
            "continuous_normalized" => Ok(NumberMode::ContinuousNormalized),
            "discrete" => Ok(NumberMode::Discrete),
            other => Err(Error::UnrecognizedMode(format!("Unknown mode for number interpretation: {}", other))),
        }
    }
}

/// Scaling applied to raw continuous values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingFunction {
    Linear,
    Quadratic,
    Logarithmic,
}

impl FromStr for ScalingFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(ScalingFunction::Linear),
            "quadratic" => Ok(ScalingFunction::Quadratic),
            "logarithmic" => Ok(ScalingFunction::Logarithmic),
            other => Err(Error::UnrecognizedMode(format!("Unknown scalingFunction '{}'", other))),
        }
    }
}

/// A named bucket covering `[bottom, top)`; a missing bound is unbounded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteValue {
    pub bottom: Option<f64>,
    pub top: Option<f64>,
    pub name: String,
}

impl DiscreteValue {
    fn contains(&self, value: f64) -> bool {
        self.top.map_or(true, |top| value < top) && self.bottom.map_or(true, |bottom| value >= bottom)
    }
}

/// Interpretation configuration of number fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumberConfig {
    pub mode: String,
    pub scaling_function: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discrete_values: Vec<DiscreteValue>,
    pub stack: LayerStacks,
}

impl Default for NumberConfig {
    fn default() -> Self {
        Self {
            mode: "continuous_normalized".to_string(),
            scaling_function: "linear".to_string(),
            discrete_values: Vec::new(),
            stack: LayerStacks::default(),
        }
    }
}

impl NumberConfig {
    /// Class index of a value: bucket position plus one, 0 when no bucket matches.
    /// When buckets overlap the last match wins.
    pub fn discrete_index(&self, value: f64) -> usize {
        self.discrete_values
            .iter()
            .enumerate()
            .filter(|(_, bucket)| bucket.contains(value))
            .map(|(position, _)| position + 1)
            .last()
            .unwrap_or(0)
    }
}

/// Returns true for strings of the form `[+-]digits[.digits]`
pub fn is_decimal_string(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (integral, fraction) = match body.split_once('.') {
        Some((integral, fraction)) => (integral, Some(fraction)),
        None => (body, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(integral) && fraction.map_or(true, digits)
}

#[derive(Debug)]
struct NumberAccumulator {
    values: Vec<f64>,
    desired_buckets: usize,
}

impl FieldAccumulator for NumberAccumulator {
    fn accumulate_value(&mut self, value: &Value) {
        if let Some(number) = as_number(value) {
            self.values.push(number);
        }
    }

    fn field_statistics(&self) -> FieldStatistics {
        let (average, deviation) = match mean_and_deviation(&self.values) {
            Some((average, deviation)) => (Some(average), Some(deviation)),
            None => (None, None),
        };
        FieldStatistics {
            average,
            standard_deviation: deviation,
            number_histogram: Some(NumberHistogram::compute(&self.values, self.desired_buckets)),
            ..FieldStatistics::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberInterpretation;

impl NumberInterpretation {
    fn statistics(schema: &Schema) -> Result<(f64, f64)> {
        let statistics = &schema.metadata.statistics;
        match (statistics.average, statistics.standard_deviation) {
            (Some(average), Some(deviation)) => Ok((average, deviation)),
            _ => Err(Error::SchemaError(format!(
                "Field '{}' has no average and standard deviation to normalize with",
                schema.title
            ))),
        }
    }
}

impl Interpretation for NumberInterpretation {
    fn name(&self) -> &'static str {
        "number"
    }

    fn upstream_interpretations(&self) -> &'static [&'static str] {
        &["string"]
    }

    fn native_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::Number]
    }

    fn priority(&self) -> u32 {
        20
    }

    fn check_value(&self, value: &Value) -> bool {
        match value {
            Value::String(text) => is_decimal_string(text),
            Value::Number(_) => true,
            _ => false,
        }
    }

    fn transform_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => text.parse::<f64>().map_or(Value::Null, number_value),
            other => other.clone(),
        }
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::Number;
    }

    fn create_accumulator(&self, config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(NumberAccumulator {
            values: Vec::new(),
            desired_buckets: config.desired_histogram_buckets,
        })
    }

    fn default_configuration(&self, _schema: &Schema, _config: &DetectorConfig) -> Result<Value> {
        let configuration = NumberConfig {
            stack: LayerStacks {
                sequence_layers: Vec::new(),
                fixed_layers: multi_layer_perceptron(NetworkSize::Medium),
            },
            ..NumberConfig::default()
        };
        Ok(serde_json::to_value(configuration)?)
    }

    fn transform_schema_for_network(&self, schema: &Schema, _registry: &InterpretationRegistry) -> Result<Schema> {
        let config: NumberConfig = schema.interpretation_config()?;
        let mode: NumberMode = config.mode.parse()?;

        let mut network = schema.clone();
        network.schema_type = SchemaType::Number;
        network.configuration.component = Some(ComponentConfig {
            layers: config.stack.fixed_layers.clone(),
            ..ComponentConfig::default()
        });
        if mode == NumberMode::Discrete {
            let mut values = vec![Value::Null];
            values.extend(config.discrete_values.iter().map(|bucket| Value::String(bucket.name.clone())));
            network.enum_values = Some(values);
        }
        Ok(network)
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let config: NumberConfig = schema.interpretation_config()?;
        let mode: NumberMode = config.mode.parse()?;
        let Some(number) = as_number(value) else {
            return Ok(json!(0));
        };

        match mode {
            NumberMode::ContinuousRaw => {
                let scaled = match config.scaling_function.parse::<ScalingFunction>()? {
                    ScalingFunction::Linear => number,
                    ScalingFunction::Quadratic => number * number,
                    ScalingFunction::Logarithmic => {
                        if number <= 0.0 {
                            debug!(field = %schema.title, value = number, "Non-positive value on logarithmic scale");
                            0.0
                        } else {
                            number.log10()
                        }
                    }
                };
                Ok(number_value(scaled))
            }
            NumberMode::ContinuousNormalized => {
                let (average, deviation) = Self::statistics(schema)?;
                let centred = number - average;
                Ok(number_value(if deviation == 0.0 { centred } else { centred / deviation }))
            }
            NumberMode::Discrete => Ok(json!(config.discrete_index(number))),
        }
    }

    fn transform_value_back_from_network(
        &self,
        value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let config: NumberConfig = schema.interpretation_config()?;
        let mode: NumberMode = config.mode.parse()?;
        let number = as_number(value).unwrap_or(0.0);

        match mode {
            NumberMode::ContinuousRaw => {
                let unscaled = match config.scaling_function.parse::<ScalingFunction>()? {
                    ScalingFunction::Linear => number,
                    ScalingFunction::Quadratic => number.max(0.0).sqrt(),
                    ScalingFunction::Logarithmic => 10f64.powf(number),
                };
                Ok(number_value(unscaled))
            }
            NumberMode::ContinuousNormalized => {
                let (average, deviation) = Self::statistics(schema)?;
                let scale = if deviation == 0.0 { 1.0 } else { deviation };
                Ok(number_value(number * scale + average))
            }
            NumberMode::Discrete => {
                let index = value.as_u64().unwrap_or(0) as usize;
                Ok(match index {
                    0 => Value::Null,
                    k => config
                        .discrete_values
                        .get(k - 1)
                        .map_or(Value::Null, |bucket| Value::String(bucket.name.clone())),
                })
            }
        }
    }

    fn compare_network_outputs(&self, expected: &Value, actual: &Value, schema: &Schema) -> Result<f64> {
        let config: NumberConfig = schema.interpretation_config()?;
        match config.mode.parse::<NumberMode>()? {
            NumberMode::ContinuousRaw | NumberMode::ContinuousNormalized => {
                let expected = as_number(expected).unwrap_or(0.0);
                let actual = as_number(actual).unwrap_or(0.0);
                let reference = if expected != 0.0 { expected } else { actual };
                if reference == 0.0 {
                    return Ok(1.0);
                }
                Ok(1.0 - ((expected - actual) / reference).abs().clamp(0.0, 1.0))
            }
            NumberMode::Discrete => {
                let expected_index = as_number(expected).map_or(0, |n| config.discrete_index(n));
                let expected_name = expected_index
                    .checked_sub(1)
                    .and_then(|position| config.discrete_values.get(position))
                    .map(|bucket| Value::String(bucket.name.clone()))
                    .unwrap_or(Value::Null);
                Ok(if expected_name == *actual { 1.0 } else { 0.0 })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with(config: NumberConfig) -> Schema {
        let mut schema = Schema::leaf("price", SchemaType::Number);
        schema.metadata.statistics.average = Some(10.0);
        schema.metadata.statistics.standard_deviation = Some(2.0);
        schema.configuration.interpretation = serde_json::to_value(config).unwrap();
        schema
    }

    #[test]
    fn test_decimal_strings() {
        assert!(is_decimal_string("42"));
        assert!(is_decimal_string("-3.25"));
        assert!(is_decimal_string("+7"));
        assert!(!is_decimal_string("3."));
        assert!(!is_decimal_string(".5"));
        assert!(!is_decimal_string("1e5"));
        assert!(!is_decimal_string(""));
    }

    #[test]
    fn test_transform_value() {
        let number = NumberInterpretation;
        assert!(number.check_value(&json!("12")));
        assert!(number.check_value(&json!(1.5)));
        assert!(!number.check_value(&json!("twelve")));
        assert_eq!(number.transform_value(&json!("12")), json!(12));
        assert_eq!(number.transform_value(&json!("1.5")), json!(1.5));
    }

    #[test]
    fn test_normalized_round_trip() {
        let registry = InterpretationRegistry::with_defaults();
        let schema = schema_with(NumberConfig::default());
        let number = NumberInterpretation;

        let network = number.transform_value_for_network(&json!(14), &schema, &registry).unwrap();
        assert_eq!(network, json!(2));
        let back = number.transform_value_back_from_network(&network, &schema, &registry).unwrap();
        assert_eq!(back, json!(14));
        assert_eq!(number.transform_value_for_network(&Value::Null, &schema, &registry).unwrap(), json!(0));
    }

    #[test]
    fn test_raw_scaling() {
        let registry = InterpretationRegistry::with_defaults();
        let number = NumberInterpretation;

        let log = schema_with(NumberConfig {
            mode: "continuous_raw".to_string(),
            scaling_function: "logarithmic".to_string(),
            ..NumberConfig::default()
        });
        let scaled = number.transform_value_for_network(&json!(1000), &log, &registry).unwrap();
        assert!((scaled.as_f64().unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(number.transform_value_for_network(&json!(-5), &log, &registry).unwrap(), json!(0));
        let back = number.transform_value_back_from_network(&json!(2), &log, &registry).unwrap();
        assert!((back.as_f64().unwrap() - 100.0).abs() < 1e-9);

        let bad = schema_with(NumberConfig {
            mode: "continuous_raw".to_string(),
            scaling_function: "cubic".to_string(),
            ..NumberConfig::default()
        });
        assert!(matches!(
            number.transform_value_for_network(&json!(1), &bad, &registry),
            Err(Error::UnrecognizedMode(_))
        ));
    }

    #[test]
    fn test_discrete_buckets() {
        let registry = InterpretationRegistry::with_defaults();
        let number = NumberInterpretation;
        let schema = schema_with(NumberConfig {
            mode: "discrete".to_string(),
            discrete_values: vec![
                DiscreteValue { bottom: None, top: Some(0.0), name: "negative".to_string() },
                DiscreteValue { bottom: Some(0.0), top: Some(10.0), name: "small".to_string() },
            ],
            ..NumberConfig::default()
        });

        assert_eq!(number.transform_value_for_network(&json!(-1), &schema, &registry).unwrap(), json!(1));
        assert_eq!(number.transform_value_for_network(&json!(5), &schema, &registry).unwrap(), json!(2));
        assert_eq!(number.transform_value_for_network(&json!(50), &schema, &registry).unwrap(), json!(0));
        assert_eq!(
            number.transform_value_back_from_network(&json!(2), &schema, &registry).unwrap(),
            json!("small")
        );
        assert_eq!(number.compare_network_outputs(&json!(3), &json!("small"), &schema).unwrap(), 1.0);

        let network = number.transform_schema_for_network(&schema, &registry).unwrap();
        assert_eq!(network.enum_len(), Some(3));
    }

    #[test]
    fn test_accumulator_statistics() {
        let mut accumulator = NumberInterpretation.create_accumulator(&DetectorConfig::default());
        for value in [json!(1), json!(2), json!(3), json!("x")] {
            accumulator.accumulate_value(&value);
        }
        let statistics = accumulator.field_statistics();
        assert_eq!(statistics.average, Some(2.0));
        assert_eq!(statistics.number_histogram.unwrap().total(), 3);
    }
}
