// Object interpretation
//
// Base interpretation for objects. Every property reaches the network through
// its own main interpretation; properties whose network form turns out empty
// are dropped along with their values.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::accumulator::{FieldAccumulator, FieldStatistics};
use crate::interpretation::{Interpretation, InterpretationRegistry};
use crate::internal::config::DetectorConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::{ComponentConfig, Schema, SchemaType};
use crate::schema::value::ValueKind;

/// Objects carry no statistics of their own
#[derive(Debug, Default)]
struct ObjectAccumulator;

impl FieldAccumulator for ObjectAccumulator {
    fn accumulate_value(&mut self, _value: &Value) {}

    fn field_statistics(&self) -> FieldStatistics {
        FieldStatistics::default()
    }
}

/// True for containers left without any leaf
fn is_empty_network(schema: &Schema) -> bool {
    match schema.schema_type {
        SchemaType::Object => schema.children().iter().all(|child| is_empty_network(child)),
        SchemaType::Array => schema.items.as_deref().map_or(true, is_empty_network),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectInterpretation;

impl ObjectInterpretation {
    /// Included properties with their network schemas, empty ones removed
    fn network_properties(
        schema: &Schema,
        registry: &InterpretationRegistry,
    ) -> Result<Vec<(String, Schema, Schema)>> {
        let mut properties = Vec::new();
        for (name, child) in schema.properties.iter().flatten() {
            if !child.configuration.included {
                continue;
            }
            let network = registry.for_schema(child)?.transform_schema_for_network(child, registry)?;
            if !is_empty_network(&network) {
                properties.push((name.clone(), child.clone(), network));
            }
        }
        Ok(properties)
    }

    fn fields_of<'a>(value: &'a Value, schema: &Schema) -> Result<Option<&'a Map<String, Value>>> {
        match value {
            Value::Object(fields) => Ok(Some(fields)),
            Value::Null => Ok(None),
            other => Err(Error::SchemaShapeMismatch(format!(
                "Field '{}' expects an object, got {}",
                schema.title, other
            ))),
        }
    }
}

impl Interpretation for ObjectInterpretation {
    fn name(&self) -> &'static str {
        "object"
    }

    fn native_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::Object]
    }

    fn check_value(&self, value: &Value) -> bool {
        value.is_object()
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::Object;
    }

    fn transform_example(&self, _value: &Value) -> Value {
        Value::Null
    }

    fn create_accumulator(&self, _config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(ObjectAccumulator)
    }

    fn default_configuration(&self, _schema: &Schema, _config: &DetectorConfig) -> Result<Value> {
        Ok(json!({}))
    }

    fn transform_schema_for_network(&self, schema: &Schema, registry: &InterpretationRegistry) -> Result<Schema> {
        let properties: BTreeMap<String, Schema> = Self::network_properties(schema, registry)?
            .into_iter()
            .map(|(name, _, network)| (name, network))
            .collect();

        let mut network = Schema::object(&schema.title, properties);
        network.metadata = schema.metadata.clone();
        network.configuration.interpretation = schema.configuration.interpretation.clone();
        network.configuration.component = Some(ComponentConfig::default());
        Ok(network)
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        schema: &Schema,
        registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let fields = Self::fields_of(value, schema)?;
        let mut output = Map::new();
        for (name, child, _) in Self::network_properties(schema, registry)? {
            let field = fields.and_then(|fields| fields.get(&name)).unwrap_or(&Value::Null);
            let converted = registry.for_schema(&child)?.transform_value_for_network(field, &child, registry)?;
            output.insert(name, converted);
        }
        Ok(Value::Object(output))
    }

    fn transform_value_back_from_network(
        &self,
        value: &Value,
        schema: &Schema,
        registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let fields = Self::fields_of(value, schema)?;
        let mut output = Map::new();
        for (name, child, _) in Self::network_properties(schema, registry)? {
            let field = fields.and_then(|fields| fields.get(&name)).unwrap_or(&Value::Null);
            let recovered = registry
                .for_schema(&child)?
                .transform_value_back_from_network(field, &child, registry)?;
            output.insert(name, recovered);
        }
        Ok(Value::Object(output))
    }

    fn compare_network_outputs(&self, expected: &Value, actual: &Value, schema: &Schema) -> Result<f64> {
        let expected = Self::fields_of(expected, schema)?;
        let actual = Self::fields_of(actual, schema)?;
        let names: Vec<&str> = schema.children().iter().map(|child| child.variable_name()).collect();
        if names.is_empty() {
            return Ok(1.0);
        }
        let matching = names
            .iter()
            .filter(|name| {
                let expected = expected.and_then(|fields| fields.get(**name));
                let actual = actual.and_then(|fields| fields.get(**name));
                expected.unwrap_or(&Value::Null) == actual.unwrap_or(&Value::Null)
            })
            .count();
        Ok(matching as f64 / names.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpretation::date::DateConfig;

    fn order_schema() -> Schema {
        let mut code = Schema::leaf("code", SchemaType::Binary);
        code.metadata.main_interpretation = Some("hex".to_string());
        code.configuration.interpretation = json!({});

        let mut flag = Schema::leaf("flag", SchemaType::Boolean);
        flag.metadata.main_interpretation = Some("boolean".to_string());
        flag.configuration.interpretation = json!({"stack": {}});

        let mut when = Schema::leaf("when", SchemaType::String);
        when.metadata.main_interpretation = Some("date".to_string());
        when.configuration.interpretation = serde_json::to_value(DateConfig {
            include_day_of_year: false,
            include_month: false,
            include_day_of_week: false,
            include_time_of_day: false,
            ..DateConfig::default()
        })
        .unwrap();

        let mut properties = BTreeMap::new();
        properties.insert("code".to_string(), code);
        properties.insert("flag".to_string(), flag);
        properties.insert("when".to_string(), when);
        let mut schema = Schema::object("", properties);
        schema.update_variable_names_and_paths();
        schema
    }

    #[test]
    fn test_empty_properties_are_dropped() {
        let registry = InterpretationRegistry::with_defaults();
        let network = ObjectInterpretation
            .transform_schema_for_network(&order_schema(), &registry)
            .unwrap();
        let names: Vec<&String> = network.properties.as_ref().unwrap().keys().collect();
        assert_eq!(names, vec!["code", "flag"]);
    }

    #[test]
    fn test_value_round_trip() {
        let registry = InterpretationRegistry::with_defaults();
        let schema = order_schema();
        let value = json!({"code": "0f", "flag": true, "when": "2016-01-01"});

        let network = ObjectInterpretation
            .transform_value_for_network(&value, &schema, &registry)
            .unwrap();
        assert_eq!(network, json!({"code": [{"hex": "0"}, {"hex": "f"}], "flag": 1}));

        let back = ObjectInterpretation
            .transform_value_back_from_network(&network, &schema, &registry)
            .unwrap();
        assert_eq!(back, json!({"code": "0f", "flag": true}));
    }

    #[test]
    fn test_missing_property_is_null() {
        let registry = InterpretationRegistry::with_defaults();
        let network = ObjectInterpretation
            .transform_value_for_network(&json!({"code": "aa"}), &order_schema(), &registry)
            .unwrap();
        assert_eq!(network["flag"], json!(0));

        let mismatch = ObjectInterpretation.transform_value_for_network(&json!([1]), &order_schema(), &registry);
        assert!(matches!(mismatch, Err(Error::SchemaShapeMismatch(_))));
    }
}
