// Data sources
//
// Detection only needs two things from a source: how many objects it holds
// and a way to visit a sample of them. How the sample is chosen is the
// source's business.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::detector::SchemaDetector;
use crate::interpretation::InterpretationRegistry;
use crate::internal::config::DetectorConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::Schema;

/// Upstream provider of sample objects
pub trait DataSource {
    /// Number of objects available
    fn count(&self) -> Result<usize>;

    /// Visits up to `n` objects, stopping early when the callback breaks
    fn sample(&mut self, n: usize, callback: &mut dyn FnMut(Value) -> ControlFlow<()>) -> Result<()>;
}

/// Objects held in memory, sampled in order
#[derive(Debug, Clone, Default)]
pub struct VecDataSource {
    objects: Vec<Value>,
}

impl VecDataSource {
    pub fn new(objects: Vec<Value>) -> Self {
        Self { objects }
    }
}

impl DataSource for VecDataSource {
    fn count(&self) -> Result<usize> {
        Ok(self.objects.len())
    }

    fn sample(&mut self, n: usize, callback: &mut dyn FnMut(Value) -> ControlFlow<()>) -> Result<()> {
        for object in self.objects.iter().take(n) {
            if callback(object.clone()).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// A file holding one JSON document per line; blank lines are skipped
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn reader(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.path).map_err(|e| {
            Error::DataSourceError(format!("Unable to open {}: {}", self.path.display(), e))
        })?;
        Ok(BufReader::new(file))
    }
}

impl DataSource for JsonLinesSource {
    fn count(&self) -> Result<usize> {
        let mut count = 0;
        for line in self.reader()?.lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn sample(&mut self, n: usize, callback: &mut dyn FnMut(Value) -> ControlFlow<()>) -> Result<()> {
        let mut visited = 0;
        for (number, line) in self.reader()?.lines().enumerate() {
            if visited >= n {
                break;
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let object: Value = serde_json::from_str(&line).map_err(|e| {
                Error::DataSourceError(format!("{}:{}: {}", self.path.display(), number + 1, e))
            })?;
            visited += 1;
            if callback(object).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Detects the schema of up to `n` objects from `source`.
///
/// `progress` receives `(completed, total)` after every object; breaking
/// from it stops sampling and the schema of the objects seen so far is
/// returned.
pub fn detect_schema<S, F>(
    registry: &InterpretationRegistry,
    config: DetectorConfig,
    source: &mut S,
    n: usize,
    mut progress: F,
) -> Result<Schema>
where
    S: DataSource + ?Sized,
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    config.validate()?;
    let total = source.count()?.min(n);
    let mut detector = SchemaDetector::with_config(registry, config);
    let mut failure = None;
    let mut cancelled = false;

    source.sample(n, &mut |object| {
        if let Err(e) = detector.accumulate_object(&object) {
            failure = Some(e);
            return ControlFlow::Break(());
        }
        let flow = progress(detector.objects_accumulated(), total);
        cancelled = flow.is_break();
        flow
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    if cancelled {
        warn!(completed = detector.objects_accumulated(), total, "Detection cancelled");
    }
    info!(objects = detector.objects_accumulated(), "Sampling finished");
    detector.schema()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_vec_source() {
        let registry = InterpretationRegistry::with_defaults();
        let mut source = VecDataSource::new(vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})]);
        let mut reports = Vec::new();
        let schema = detect_schema(&registry, DetectorConfig::default(), &mut source, 2, |done, total| {
            reports.push((done, total));
            ControlFlow::Continue(())
        })
        .unwrap();

        assert_eq!(reports, vec![(1, 2), (2, 2)]);
        assert_eq!(schema.properties.as_ref().unwrap()["a"].metadata.total, 2);
    }

    #[test]
    fn test_cancellation_keeps_partial_result() {
        let registry = InterpretationRegistry::with_defaults();
        let mut source = VecDataSource::new((0..10).map(|i| json!({"i": i})).collect());
        let schema = detect_schema(&registry, DetectorConfig::default(), &mut source, 10, |done, _| {
            if done == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(schema.properties.as_ref().unwrap()["i"].metadata.total, 3);
    }

    #[test]
    fn test_json_lines_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"x": "a"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"x": "b"}}"#).unwrap();

        let mut source = JsonLinesSource::new(file.path());
        assert_eq!(source.count().unwrap(), 2);

        let mut seen = Vec::new();
        source
            .sample(5, &mut |object| {
                seen.push(object);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, vec![json!({"x": "a"}), json!({"x": "b"})]);
    }

    #[test]
    fn test_json_lines_reports_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"x": 1}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let mut source = JsonLinesSource::new(file.path());
        let result = source.sample(5, &mut |_| ControlFlow::Continue(()));
        match result {
            Err(Error::DataSourceError(message)) => assert!(message.contains(":2:")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let source = JsonLinesSource::new("/nonexistent/samples.jsonl");
        assert!(matches!(source.count(), Err(Error::DataSourceError(_))));
    }
}
