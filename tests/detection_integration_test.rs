use std::io::Write;
use std::ops::ControlFlow;

use neuroschema::accumulator::NumberHistogram;
use neuroschema::detector::{resolve, resolve_from};
use neuroschema::{detect_schema, DetectorConfig, InterpretationRegistry, JsonLinesSource, SchemaType, VecDataSource};
use serde_json::{json, Value};

const LETTERS: [&str; 12] = ["A", "B", "C", "D", "E", "G", "H", "J", "K", "L", "M", "N"];

fn letter_samples(count: usize) -> Vec<Value> {
    (0..count).map(|i| json!({"inputLetter": LETTERS[i % LETTERS.len()]})).collect()
}

fn detect(samples: Vec<Value>) -> neuroschema::Schema {
    let registry = InterpretationRegistry::with_defaults();
    let count = samples.len();
    let mut source = VecDataSource::new(samples);
    detect_schema(&registry, DetectorConfig::default(), &mut source, count, |_, _| ControlFlow::Continue(())).unwrap()
}

/// Tests that a small fixed alphabet is detected as a classification field.
#[test]
fn test_fixed_letters_become_classification() {
    let schema = detect(letter_samples(1000));
    let letter = &schema.properties.as_ref().unwrap()["inputLetter"];

    assert_eq!(letter.metadata.interpretation_chain, Some(vec!["string".to_string()]));
    assert_eq!(letter.metadata.total, 1000);
    assert_eq!(letter.metadata.distinct, 12);

    let histogram = letter.metadata.statistics.value_histogram.as_ref().unwrap();
    assert_eq!(histogram.values.len(), 12);
    assert!(histogram.values.iter().all(|bucket| bucket.frequency > 0));
    assert_eq!(histogram.total(), 1000);
    assert!((0.0..=1.0).contains(&histogram.cardinality));

    assert_eq!(letter.configuration.interpretation["mode"], json!("classification"));
    let values = letter.configuration.interpretation["classificationValues"].as_array().unwrap();
    assert_eq!(values.len(), 12);
}

/// Tests that dates are recognized only when they dominate a field.
#[test]
fn test_date_chain_follows_majority() {
    let dates: Vec<Value> = (1..=28).map(|day| json!({"when": format!("2016-02-{:02}", day)})).collect();
    let schema = detect(dates);
    let when = &schema.properties.as_ref().unwrap()["when"];
    assert_eq!(when.metadata.interpretation_chain, Some(vec!["string".to_string(), "date".to_string()]));

    let mut mixed: Vec<Value> = (0..20).map(|i| json!({"when": format!("note number {}", i)})).collect();
    mixed.extend((1..=5).map(|day| json!({"when": format!("2016-02-{:02}", day)})));
    let schema = detect(mixed);
    let when = &schema.properties.as_ref().unwrap()["when"];
    assert_eq!(when.metadata.interpretation_chain, Some(vec!["string".to_string()]));
}

/// Tests detection from a JSON lines file on disk.
#[test]
fn test_detection_from_json_lines_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..50 {
        writeln!(file, "{}", json!({"id": i, "label": if i % 2 == 0 { "even" } else { "odd" }})).unwrap();
    }

    let registry = InterpretationRegistry::with_defaults();
    let mut source = JsonLinesSource::new(file.path());
    let mut progress = Vec::new();
    let schema = detect_schema(&registry, DetectorConfig::default(), &mut source, 20, |done, total| {
        progress.push((done, total));
        ControlFlow::Continue(())
    })
    .unwrap();

    assert_eq!(progress.len(), 20);
    assert_eq!(progress.last(), Some(&(20, 20)));
    let properties = schema.properties.as_ref().unwrap();
    assert_eq!(properties["id"].schema_type, SchemaType::Number);
    assert_eq!(properties["id"].metadata.total, 20);
    assert_eq!(properties["label"].metadata.distinct, 2);
}

/// Tests that a detected schema survives a JSON round trip.
#[test]
fn test_detected_schema_serializes_deterministically() {
    let schema = detect(letter_samples(100));
    let text = schema.to_json_string().unwrap();
    let parsed = neuroschema::Schema::from_json_str(&text).unwrap();
    assert_eq!(parsed.to_json_string().unwrap(), text);
}

/// Tests that resolving an already transformed value adds nothing further.
#[test]
fn test_chain_resolution_is_idempotent() {
    let registry = InterpretationRegistry::with_defaults();
    for value in [json!("2016-02-03"), json!("ff00"), json!("42"), json!("hello"), json!(true)] {
        let first = resolve(&registry, &value).unwrap();
        let last = registry.get(first.last().unwrap()).unwrap();
        let again = resolve_from(&registry, last, &first.value);
        assert!(again.names.is_empty(), "{} continued to {:?}", value, again.names);
        assert_eq!(again.value, first.value);
    }
}

/// Tests that numeric histogram buckets account for every value.
#[test]
fn test_number_histogram_counts_every_value() {
    let values: Vec<f64> = (0..997).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();
    for buckets in [1, 5, 20] {
        let histogram = NumberHistogram::compute(&values, buckets);
        assert_eq!(histogram.total(), values.len());
    }
}
