// String interpretation
//
// Base interpretation for strings and nulls. Depending on the configured mode
// a string reaches the network as a class index, a sequence of ASCII
// characters, a single word or a sequence of words.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::accumulator::{FieldAccumulator, FieldStatistics, ValueHistogram};
use crate::compiler::layers::{multi_layer_lstm, multi_layer_perceptron, NetworkSize};
use crate::interpretation::{as_text, Interpretation, InterpretationRegistry, LayerStacks};
use crate::internal::config::DetectorConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::{ComponentConfig, Schema, SchemaType};
use crate::schema::utils::{join_path, ARRAY_SEGMENT};
use crate::schema::value::ValueKind;

/// Number of character codes representable in sequence mode
pub const ASCII_LENGTH: u32 = 128;

/// Longest example kept before truncation
const MAX_EXAMPLE_LENGTH: usize = 50;

/// How strings are presented to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMode {
    Classification,
    Sequence,
    EnglishWord,
    EnglishText,
}

impl FromStr for StringMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classification" => Ok(StringMode::Classification),
            "sequence" => Ok(StringMode::Sequence),
            "english_word" => Ok(StringMode::EnglishWord),
            "english_text" => Ok(StringMode::EnglishText),
            other => Err(Error::UnrecognizedMode(format!("Unrecognized string mode: {}", other))),
        }
    }
}

/// Interpretation configuration of string fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StringConfig {
    pub mode: String,
    pub classification_values: Vec<String>,
    pub stack: LayerStacks,
    pub enforce_sequence_length_limit: bool,
    pub max_sequence_length: usize,
}

impl Default for StringConfig {
    fn default() -> Self {
        Self {
            mode: "classification".to_string(),
            classification_values: Vec::new(),
            stack: LayerStacks::default(),
            enforce_sequence_length_limit: false,
            max_sequence_length: 2500,
        }
    }
}

impl StringConfig {
    pub fn mode(&self) -> Result<StringMode> {
        self.mode.parse()
    }

    fn sequence_component(&self) -> ComponentConfig {
        ComponentConfig {
            layers: self.stack.sequence_layers.clone(),
            enforce_sequence_length_limit: self.enforce_sequence_length_limit,
            max_sequence_length: self.max_sequence_length,
        }
    }

    fn fixed_component(&self) -> ComponentConfig {
        ComponentConfig {
            layers: self.stack.fixed_layers.clone(),
            ..ComponentConfig::default()
        }
    }
}

/// Accumulates a value histogram of short strings
#[derive(Debug)]
struct StringAccumulator {
    values: Vec<String>,
    max_length: usize,
}

impl FieldAccumulator for StringAccumulator {
    fn accumulate_value(&mut self, value: &Value) {
        // Very long strings are nearly always unique and would bloat the histogram
        if let Value::String(text) = value {
            if text.chars().count() < self.max_length {
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

/// Splits lowercase text into runs of word characters and runs of punctuation
pub fn tokenize_words(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_is_word = false;
    for c in text.to_lowercase().chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        let is_word = c.is_alphanumeric() || c == '_';
        if !current.is_empty() && is_word != current_is_word {
            tokens.push(std::mem::take(&mut current));
        }
        current_is_word = is_word;
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringInterpretation;

impl Interpretation for StringInterpretation {
    fn name(&self) -> &'static str {
        "string"
    }

    fn native_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::String, ValueKind::Null]
    }

    fn check_value(&self, value: &Value) -> bool {
        value.is_string()
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::String;
    }

    fn transform_example(&self, value: &Value) -> Value {
        match value {
            Value::String(text) if text.chars().count() > MAX_EXAMPLE_LENGTH => {
                let head: String = text.chars().take(MAX_EXAMPLE_LENGTH).collect();
                Value::String(format!("{}...", head))
            }
            other => other.clone(),
        }
    }

    fn create_accumulator(&self, config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(StringAccumulator {
            values: Vec::new(),
            max_length: config.max_string_length_for_histogram,
        })
    }

    fn default_configuration(&self, schema: &Schema, config: &DetectorConfig) -> Result<Value> {
        let histogram = schema.metadata.statistics.value_histogram.clone().unwrap_or_default();
        let mode = if histogram.cardinality > config.sequence_cardinality_threshold
            || histogram.values.len() > config.known_value_enum_cutoff
        {
            "sequence"
        } else {
            "classification"
        };

        let mut classification_values = histogram.distinct_values();
        classification_values.sort();

        let configuration = StringConfig {
            mode: mode.to_string(),
            classification_values,
            stack: LayerStacks {
                sequence_layers: multi_layer_lstm(NetworkSize::Medium),
                fixed_layers: multi_layer_perceptron(NetworkSize::Medium),
            },
            enforce_sequence_length_limit: false,
            max_sequence_length: 2500,
        };
        Ok(serde_json::to_value(configuration)?)
    }

    fn transform_schema_for_network(&self, schema: &Schema, _registry: &InterpretationRegistry) -> Result<Schema> {
        let config: StringConfig = schema.interpretation_config()?;
        match config.mode()? {
            StringMode::Classification => {
                let mut network = schema.clone();
                network.schema_type = SchemaType::Number;
                let mut values = vec![Value::Null];
                values.extend(config.classification_values.iter().cloned().map(Value::String));
                network.enum_values = Some(values);
                network.configuration.component = Some(config.fixed_component());
                Ok(network)
            }
            StringMode::Sequence => {
                let item_path = join_path(&schema.title, ARRAY_SEGMENT);

                let mut character = Schema::leaf(&join_path(&item_path, "character"), SchemaType::Number);
                character.enum_values = Some((0..ASCII_LENGTH).map(Value::from).collect());
                character.configuration.component = Some(config.fixed_component());

                let mut properties = BTreeMap::new();
                properties.insert("character".to_string(), character);
                let mut item = Schema::object(&item_path, properties);
                item.configuration.component = Some(ComponentConfig::default());

                let mut network = Schema::array(&schema.title, item);
                network.metadata = schema.metadata.clone();
                network.configuration.component = Some(config.sequence_component());
                Ok(network)
            }
            StringMode::EnglishWord => {
                let mut network = schema.clone();
                network.configuration.component = Some(config.fixed_component());
                Ok(network)
            }
            StringMode::EnglishText => {
                let mut word = Schema::leaf(&join_path(&schema.title, ARRAY_SEGMENT), SchemaType::String);
                word.configuration.component = Some(config.fixed_component());

                let mut network = Schema::array(&schema.title, word);
                network.metadata = schema.metadata.clone();
                network.configuration.component = Some(config.sequence_component());
                Ok(network)
            }
        }
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let config: StringConfig = schema.interpretation_config()?;
        let text = as_text(value);
        match config.mode()? {
            StringMode::Classification => {
                if value.is_null() {
                    return Ok(json!(0));
                }
                match config.classification_values.iter().position(|v| *v == text) {
                    Some(position) => Ok(json!(position + 1)),
                    None => {
                        debug!(field = %schema.title, value = %text, "Value not in classification vocabulary");
                        Ok(json!(0))
                    }
                }
            }
            StringMode::Sequence => {
                let characters: Vec<Value> = text
                    .chars()
                    .map(|c| {
                        let code = c as u32;
                        json!({ "character": if code >= ASCII_LENGTH { 0 } else { code } })
                    })
                    .collect();
                Ok(Value::Array(characters))
            }
            StringMode::EnglishWord => Ok(Value::String(text.to_lowercase())),
            StringMode::EnglishText => Ok(Value::Array(
                tokenize_words(&text).into_iter().map(Value::String).collect(),
            )),
        }
    }

    fn transform_value_back_from_network(
        &self,
        value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let config: StringConfig = schema.interpretation_config()?;
        match config.mode()? {
            StringMode::Classification => {
                let index = value.as_u64().unwrap_or(0) as usize;
                Ok(match index {
                    0 => Value::Null,
                    k => config
                        .classification_values
                        .get(k - 1)
                        .cloned()
                        .map_or(Value::Null, Value::String),
                })
            }
            StringMode::Sequence => {
                let text: String = value
                    .as_array()
                    .map(|items| items.as_slice())
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|item| item.get("character").and_then(Value::as_u64))
                    .filter(|code| *code != 0)
                    .filter_map(|code| char::from_u32(code as u32))
                    .collect();
                Ok(Value::String(text))
            }
            StringMode::EnglishWord => Ok(value.clone()),
            StringMode::EnglishText => {
                let words: Vec<String> = value
                    .as_array()
                    .map(|items| items.iter().map(as_text).collect())
                    .unwrap_or_default();
                Ok(Value::String(words.join(" ")))
            }
        }
    }
}
