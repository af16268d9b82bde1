// Schema detection
//
// The detector walks every sampled object, resolves an interpretation chain
// for each value it meets and feeds the transformed value to the accumulator
// of the chain's last interpretation. Once sampling is over the flat map of
// paths is assembled into a nested schema.
//
// Paths use "." for object descent and ".[]" for array items; the sampled
// object itself lives at the empty path.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::accumulator::{FieldAccumulator, FieldSummary};
use crate::interpretation::InterpretationRegistry;
use crate::internal::config::DetectorConfig;
use crate::internal::error::Result;
use crate::schema::types::{FieldMetadata, Schema, SchemaType};
use crate::schema::utils::{self, join_path, ARRAY_SEGMENT};

pub mod assembly;
pub mod chain;
pub mod source;

pub use self::chain::{resolve, resolve_from, ResolvedChain};
pub use self::source::{detect_schema, DataSource, JsonLinesSource, VecDataSource};

/// Everything recorded for a single path
#[derive(Debug, Default)]
struct FieldState {
    summary: FieldSummary,
    /// Occurrences of every chain seen at the path
    chains: BTreeMap<Vec<&'static str>, usize>,
    /// One accumulator per winning interpretation
    accumulators: BTreeMap<&'static str, Box<dyn FieldAccumulator>>,
}

impl FieldState {
    /// Most frequent chain; ties go to the lexically smallest
    fn canonical_chain(&self) -> Option<&Vec<&'static str>> {
        let mut best: Option<(&Vec<&'static str>, usize)> = None;
        for (chain, count) in &self.chains {
            if best.map_or(true, |(_, top)| *count > top) {
                best = Some((chain, *count));
            }
        }
        best.map(|(chain, _)| chain)
    }
}

/// Accumulates sampled objects and produces their schema
#[derive(Debug)]
pub struct SchemaDetector<'a> {
    registry: &'a InterpretationRegistry,
    config: DetectorConfig,
    fields: BTreeMap<String, FieldState>,
    objects_accumulated: usize,
}

impl<'a> SchemaDetector<'a> {
    /// Creates a detector with the default configuration
    pub fn new(registry: &'a InterpretationRegistry) -> Self {
        Self::with_config(registry, DetectorConfig::default())
    }

    /// Creates a detector with an explicit configuration
    pub fn with_config(registry: &'a InterpretationRegistry, config: DetectorConfig) -> Self {
        Self {
            registry,
            config,
            fields: BTreeMap::new(),
            objects_accumulated: 0,
        }
    }

    /// Number of objects accumulated so far
    pub fn objects_accumulated(&self) -> usize {
        self.objects_accumulated
    }

    /// Paths observed so far, sorted
    pub fn paths(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Folds one sampled object into the accumulated state
    pub fn accumulate_object(&mut self, object: &Value) -> Result<()> {
        self.accumulate_value("", object)?;
        self.objects_accumulated += 1;
        Ok(())
    }

    fn accumulate_value(&mut self, path: &str, value: &Value) -> Result<()> {
        let resolved = chain::resolve(self.registry, value)?;
        let registry = self.registry;
        let config = &self.config;
        let state = self.fields.entry(path.to_string()).or_default();

        *state.chains.entry(resolved.names.clone()).or_default() += 1;
        state.summary.accumulate(value);

        if let Some(last) = resolved.last() {
            let interpretation = registry.get(last)?;
            state
                .accumulators
                .entry(last)
                .or_insert_with(|| interpretation.create_accumulator(config))
                .accumulate_value(&resolved.value);
            if !value.is_array() && !value.is_object() {
                let example = interpretation.transform_example(&resolved.value);
                state.summary.add_example(example, config.max_examples);
            }
        }

        match value {
            Value::Array(items) => {
                let item_path = join_path(path, ARRAY_SEGMENT);
                for item in items {
                    self.accumulate_value(&item_path, item)?;
                }
            }
            Value::Object(fields) => {
                for (name, field) in fields {
                    self.accumulate_value(&join_path(path, name), field)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Schema node for a single path, without children
    fn field_node(&self, path: &str, state: &FieldState) -> Result<Schema> {
        let chain = state.canonical_chain().cloned().unwrap_or_default();
        let main = chain.last().copied();

        let summary = &state.summary;
        let metadata = FieldMetadata {
            variable_name: utils::last_segment(path).to_string(),
            variable_path: path.to_string(),
            types: summary.types(),
            examples: summary.examples().to_vec(),
            interpretation_chain: Some(chain.iter().map(|name| name.to_string()).collect()),
            main_interpretation: main.map(str::to_string),
            distinct: summary.distinct(),
            total: summary.total(),
            cardinality: summary.cardinality(),
            statistics: main
                .and_then(|name| state.accumulators.get(name))
                .map(|accumulator| accumulator.field_statistics())
                .unwrap_or_default(),
        };

        let mut node = Schema::leaf(path, SchemaType::String);
        node.metadata = metadata;
        if let Some(name) = main {
            let interpretation = self.registry.get(name)?;
            interpretation.transform_schema(&mut node);
            node.configuration.interpretation = interpretation.default_configuration(&node, &self.config)?;
        }
        Ok(node)
    }

    /// Assembles the schema of everything accumulated so far
    pub fn schema(&self) -> Result<Schema> {
        let mut nodes = BTreeMap::new();
        let mut leaves = Vec::new();
        for (path, state) in &self.fields {
            let node = self.field_node(path, state)?;
            if !node.metadata.types.has_container() {
                leaves.push(path.as_str());
            }
            debug!(
                path = %path,
                chain = ?node.metadata.interpretation_chain,
                total = node.metadata.total,
                "Detected field"
            );
            nodes.insert(path.clone(), node);
        }

        let mut schema = assembly::assemble("", &leaves, &nodes);
        schema.update_variable_names_and_paths();
        info!(
            objects = self.objects_accumulated,
            paths = self.fields.len(),
            leaves = leaves.len(),
            "Assembled schema"
        );
        Ok(schema)
    }
}
