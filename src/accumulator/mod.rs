// Field analysis accumulators
//
// Every field path observed during detection owns a `FieldSummary` (counts,
// observed types, distinct fingerprints, examples) plus one interpretation
// specific `FieldAccumulator` per interpretation that won at that path.
// Accumulators are pure aggregation: they never reject input.

use std::collections::HashSet;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::value::{value_kind, ValueTypes};

pub mod histogram;

pub use self::histogram::{HistogramBucket, NumberHistogram, ValueFrequency, ValueHistogram};

/// Statistics summarizing the values seen at a single field path
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_histogram: Option<ValueHistogram>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_histogram: Option<NumberHistogram>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_deviation: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_length_histogram: Option<NumberHistogram>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_histogram: Option<ValueHistogram>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_histogram: Option<ValueHistogram>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week_histogram: Option<ValueHistogram>,
}

/// Interpretation specific aggregation state.
///
/// Instances are created through `Interpretation::create_accumulator` and fed
/// with values that have already passed through the interpretation chain.
pub trait FieldAccumulator: Debug + Send {
    /// Folds a single value into the accumulated state
    fn accumulate_value(&mut self, value: &Value);

    /// Summarizes the accumulated state without modifying it
    fn field_statistics(&self) -> FieldStatistics;
}

/// Interpretation independent counters kept for every field path
#[derive(Debug, Clone, Default)]
pub struct FieldSummary {
    fingerprints: HashSet<u32>,
    total: usize,
    types: ValueTypes,
    examples: Vec<Value>,
}

impl FieldSummary {
    /// Creates an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a raw value
    pub fn accumulate(&mut self, value: &Value) {
        self.types |= ValueTypes::from(value_kind(value));
        self.fingerprints.insert(fingerprint_value(value));
        self.total += 1;
    }

    /// Keeps an example unless it is already known or the list is full
    pub fn add_example(&mut self, example: Value, max_examples: usize) {
        if example.is_null() || self.examples.len() >= max_examples {
            return;
        }
        if !self.examples.contains(&example) {
            self.examples.push(example);
        }
    }

    /// Number of distinct values, by fingerprint
    pub fn distinct(&self) -> usize {
        self.fingerprints.len()
    }

    /// Number of values recorded
    pub fn total(&self) -> usize {
        self.total
    }

    /// Distinct count over total count
    pub fn cardinality(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.fingerprints.len() as f64 / self.total as f64
        }
    }

    /// Native types observed
    pub fn types(&self) -> ValueTypes {
        self.types
    }

    /// Retained examples in the order they were first seen
    pub fn examples(&self) -> &[Value] {
        &self.examples
    }
}

/// 32-bit fingerprint built from the leading bytes of a SHA-256 digest
pub fn fingerprint32(data: &[u8]) -> u32 {
    let digest = Sha256::digest(data);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Fingerprints a JSON value by its textual form
pub fn fingerprint_value(value: &Value) -> u32 {
    match value {
        Value::String(s) => fingerprint32(s.as_bytes()),
        other => fingerprint32(other.to_string().as_bytes()),
    }
}

/// Arithmetic mean and population standard deviation
pub fn mean_and_deviation(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    Some((mean, variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable() {
        // First four bytes of sha256("hello") are 2c f2 4d ba
        assert_eq!(fingerprint32(b"hello"), 0x2cf24dba);
        assert_eq!(fingerprint_value(&json!("hello")), 0x2cf24dba);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = FieldSummary::new();
        for value in [json!("a"), json!("b"), json!("a"), json!(3)] {
            summary.accumulate(&value);
        }

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.distinct(), 3);
        assert!((summary.cardinality() - 0.75).abs() < 1e-12);
        assert!(summary.types().contains(ValueTypes::STRING | ValueTypes::NUMBER));
    }

    #[test]
    fn test_examples_are_bounded_and_unique() {
        let mut summary = FieldSummary::new();
        for value in ["x", "y", "x", "z", "w"] {
            summary.add_example(json!(value), 3);
        }
        assert_eq!(summary.examples(), &[json!("x"), json!("y"), json!("z")]);
    }

    #[test]
    fn test_mean_and_deviation() {
        let (mean, deviation) = mean_and_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(mean, 5.0);
        assert_eq!(deviation, 2.0);
        assert!(mean_and_deviation(&[]).is_none());
    }
}
