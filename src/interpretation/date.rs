// Date interpretation
//
// Downstream of string. A string is a date when it matches one of a fixed
// list of layouts exactly, digit for digit. Dates reach the network as an
// object of calendar components, each optional in the configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::accumulator::{FieldAccumulator, FieldStatistics, ValueHistogram};
use crate::interpretation::{number_value, Interpretation, InterpretationRegistry};
use crate::internal::config::DetectorConfig;
use crate::internal::error::Result;
use crate::schema::types::{Schema, SchemaType};
use crate::schema::utils::join_path;

const MONTHS_IN_YEAR: u32 = 12;
const DAYS_IN_WEEK: u32 = 7;
const SECONDS_IN_DAY: f64 = 86_400.0;

/// Accepted layouts as (digit shape, chrono format)
///
/// In a shape every `d` stands for one ASCII digit and every other character
/// must match literally.
const DATE_FORMATS: [(&str, &str); 13] = [
    ("dddd-dd-ddTdd:dd:dd", "%Y-%m-%dT%H:%M:%S"),
    ("dd-dd-dddd", "%m-%d-%Y"),
    ("dddd-dd-dd", "%Y-%m-%d"),
    ("dddd-dd-dd", "%Y-%d-%m"),
    ("dd-dd-dddd", "%d-%m-%Y"),
    ("dd/dd/dddd", "%m/%d/%Y"),
    ("dddd/dd/dd", "%Y/%m/%d"),
    ("dddd/dd/dd", "%Y/%d/%m"),
    ("dd/dd/dddd", "%d/%m/%Y"),
    ("dd dd dddd", "%m %d %Y"),
    ("dddd dd dd", "%Y %m %d"),
    ("dddd dd dd", "%Y %d %m"),
    ("dd dd dddd", "%d %m %Y"),
];

/// Shape of a timestamp with milliseconds, before its zone designator
const ZONED_SHAPE: &str = "dddd-dd-ddTdd:dd:dd.ddd";

fn matches_shape(text: &str, shape: &str) -> bool {
    text.len() == shape.len()
        && text.bytes().zip(shape.bytes()).all(|(c, s)| match s {
            b'd' => c.is_ascii_digit(),
            other => c == other,
        })
}

fn is_zone_designator(zone: &str) -> bool {
    zone == "Z" || ((zone.starts_with('+') || zone.starts_with('-')) && matches_shape(&zone[1..], "dd:dd"))
}

/// Parses a string against the accepted layouts, first match wins
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if text.len() > ZONED_SHAPE.len() && text.is_char_boundary(ZONED_SHAPE.len()) {
        let (stamp, zone) = text.split_at(ZONED_SHAPE.len());
        if matches_shape(stamp, ZONED_SHAPE) && is_zone_designator(zone) {
            return DateTime::parse_from_rfc3339(text).ok().map(|date| date.naive_local());
        }
    }

    DATE_FORMATS
        .iter()
        .filter(|(shape, _)| matches_shape(text, shape))
        .find_map(|(_, format)| {
            if format.contains("%H") {
                NaiveDateTime::parse_from_str(text, format).ok()
            } else {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            }
        })
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == MONTHS_IN_YEAR {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .map_or(31, |last| last.day())
}

/// Interpretation configuration of date fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DateConfig {
    pub include_year: bool,
    pub include_day_of_year: bool,
    pub include_month: bool,
    pub include_day_of_month: bool,
    pub include_day_of_week: bool,
    pub include_time_of_day: bool,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            include_year: false,
            include_day_of_year: true,
            include_month: true,
            include_day_of_month: false,
            include_day_of_week: true,
            include_time_of_day: true,
        }
    }
}

impl DateConfig {
    /// Network components enabled by this configuration, in declaration order
    fn components(&self) -> Vec<&'static str> {
        [
            (self.include_year, "year"),
            (self.include_day_of_year, "dayOfYear"),
            (self.include_month, "month"),
            (self.include_day_of_month, "dayOfMonth"),
            (self.include_day_of_week, "dayOfWeek"),
            (self.include_time_of_day, "timeOfDay"),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, name)| name)
        .collect()
    }
}

fn component_value(date: &NaiveDateTime, component: &str) -> f64 {
    match component {
        "year" => f64::from(date.year()),
        "dayOfYear" => f64::from(date.ordinal()) / 366.0,
        "month" => f64::from(date.month0()),
        "dayOfMonth" => f64::from(date.day()) / f64::from(days_in_month(date.date())),
        "dayOfWeek" => f64::from(date.weekday().num_days_from_sunday()),
        "timeOfDay" => {
            let seconds = f64::from(date.num_seconds_from_midnight()) + f64::from(date.nanosecond()) / 1e9;
            seconds / SECONDS_IN_DAY
        }
        _ => 0.0,
    }
}

#[derive(Debug, Default)]
struct DateAccumulator {
    years: Vec<String>,
    months: Vec<String>,
    days_of_week: Vec<String>,
}

impl FieldAccumulator for DateAccumulator {
    fn accumulate_value(&mut self, value: &Value) {
        let Some(date) = value.as_str().and_then(parse_date) else {
            return;
        };
        self.years.push(date.format("%Y").to_string());
        self.months.push(date.format("%B").to_string());
        self.days_of_week.push(date.format("%A").to_string());
    }

    fn field_statistics(&self) -> FieldStatistics {
        FieldStatistics {
            year_histogram: Some(ValueHistogram::compute(&self.years)),
            month_histogram: Some(ValueHistogram::compute(&self.months)),
            day_of_week_histogram: Some(ValueHistogram::compute(&self.days_of_week)),
            ..FieldStatistics::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateInterpretation;

impl Interpretation for DateInterpretation {
    fn name(&self) -> &'static str {
        "date"
    }

    fn upstream_interpretations(&self) -> &'static [&'static str] {
        &["string"]
    }

    fn priority(&self) -> u32 {
        30
    }

    fn check_value(&self, value: &Value) -> bool {
        value.as_str().and_then(parse_date).is_some()
    }

    fn transform_schema(&self, schema: &mut Schema) {
        schema.schema_type = SchemaType::String;
    }

    fn create_accumulator(&self, _config: &DetectorConfig) -> Box<dyn FieldAccumulator> {
        Box::new(DateAccumulator::default())
    }

    fn default_configuration(&self, _schema: &Schema, _config: &DetectorConfig) -> Result<Value> {
        Ok(serde_json::to_value(DateConfig::default())?)
    }

    fn transform_schema_for_network(&self, schema: &Schema, _registry: &InterpretationRegistry) -> Result<Schema> {
        let config: DateConfig = schema.interpretation_config()?;

        let mut properties = BTreeMap::new();
        for component in config.components() {
            let mut child = Schema::leaf(&join_path(&schema.title, component), SchemaType::Number);
            match component {
                "month" => child.enum_values = Some((0..MONTHS_IN_YEAR).map(Value::from).collect()),
                "dayOfWeek" => child.enum_values = Some((0..DAYS_IN_WEEK).map(Value::from).collect()),
                _ => {}
            }
            properties.insert(component.to_string(), child);
        }

        let mut network = Schema::object(&schema.title, properties);
        network.metadata = schema.metadata.clone();
        Ok(network)
    }

    fn transform_value_for_network(
        &self,
        value: &Value,
        schema: &Schema,
        _registry: &InterpretationRegistry,
    ) -> Result<Value> {
        let config: DateConfig = schema.interpretation_config()?;
        let date = value.as_str().and_then(parse_date);
        if date.is_none() && !value.is_null() {
            warn!(field = %schema.title, value = %value, "Unparseable date presented as zeros");
        }

        let mut output = Map::new();
        for component in config.components() {
            let number = date.as_ref().map_or(0.0, |date| component_value(date, component));
            output.insert(component.to_string(), number_value(number));
        }
        Ok(Value::Object(output))
    }

    fn compare_network_outputs(&self, _expected: &Value, _actual: &Value, schema: &Schema) -> Result<f64> {
        Err(self.unimplemented("compare_network_outputs", schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strict_formats() {
        assert!(parse_date("2016-07-04").is_some());
        assert!(parse_date("07/04/2016").is_some());
        assert!(parse_date("2016-07-04T13:45:00").is_some());
        assert!(parse_date("2016-07-04T13:45:00.250Z").is_some());
        assert!(parse_date("2016-07-04T13:45:00.250+02:00").is_some());
        // Day first layouts are tried after month first ones fail
        assert_eq!(parse_date("25-12-2016").unwrap().month(), 12);

        assert!(parse_date("2016-7-4").is_none());
        assert!(parse_date("July 4th").is_none());
        assert!(parse_date("12345-01-01").is_none());
        assert!(parse_date("2016-13-45").is_none());
    }

    #[test]
    fn test_network_components() {
        let registry = InterpretationRegistry::with_defaults();
        let date = DateInterpretation;
        let mut schema = Schema::leaf("when", SchemaType::String);
        schema.configuration.interpretation = serde_json::to_value(DateConfig {
            include_year: true,
            include_day_of_month: true,
            ..DateConfig::default()
        })
        .unwrap();

        // 2016-02-15 was a Monday
        let value = date
            .transform_value_for_network(&json!("2016-02-15T12:00:00"), &schema, &registry)
            .unwrap();
        assert_eq!(value["year"], json!(2016));
        assert_eq!(value["month"], json!(1));
        assert_eq!(value["dayOfWeek"], json!(1));
        assert_eq!(value["timeOfDay"], json!(0.5));
        assert!((value["dayOfMonth"].as_f64().unwrap() - 15.0 / 29.0).abs() < 1e-12);
        assert!((value["dayOfYear"].as_f64().unwrap() - 46.0 / 366.0).abs() < 1e-12);

        let network = date.transform_schema_for_network(&schema, &registry).unwrap();
        assert!(network.is_object());
        let properties = network.properties.as_ref().unwrap();
        assert_eq!(properties.len(), 6);
        assert_eq!(properties["month"].enum_len(), Some(12));
        assert_eq!(properties["dayOfWeek"].enum_len(), Some(7));
        assert_eq!(properties["year"].title, "when.year");
    }

    #[test]
    fn test_unparseable_value_becomes_zeros() {
        let registry = InterpretationRegistry::with_defaults();
        let mut schema = Schema::leaf("when", SchemaType::String);
        schema.configuration.interpretation = serde_json::to_value(DateConfig::default()).unwrap();

        let value = DateInterpretation
            .transform_value_for_network(&json!("someday"), &schema, &registry)
            .unwrap();
        assert_eq!(value, json!({"dayOfYear": 0, "month": 0, "dayOfWeek": 0, "timeOfDay": 0}));

        let back = DateInterpretation.transform_value_back_from_network(&value, &schema, &registry);
        assert!(matches!(back, Err(crate::internal::error::Error::UnimplementedCapability(_))));
    }

    #[test]
    fn test_accumulator_histograms() {
        let mut accumulator = DateInterpretation.create_accumulator(&DetectorConfig::default());
        for value in ["2016-02-15", "2016-02-16", "2017-03-01", "not a date"] {
            accumulator.accumulate_value(&json!(value));
        }
        let statistics = accumulator.field_statistics();
        let months = statistics.month_histogram.unwrap();
        assert_eq!(months.values[0].value, "February");
        assert_eq!(months.total(), 3);
        assert_eq!(statistics.year_histogram.unwrap().values.len(), 2);
        assert_eq!(statistics.day_of_week_histogram.unwrap().total(), 3);
    }
}
