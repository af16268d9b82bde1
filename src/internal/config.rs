// Configuration for schema detection and architecture compilation
//
// Both structures carry sensible defaults and can be loaded from a JSON
// document. Missing keys fall back to the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::internal::error::{Error, Result};

/// Configuration for schema detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Maximum number of distinct values before a field stops being treated as an enumeration
    pub known_value_enum_cutoff: usize,

    /// Strings at least this long are excluded from value histograms
    pub max_string_length_for_histogram: usize,

    /// Maximum number of examples retained per field
    pub max_examples: usize,

    /// Number of buckets requested from numeric histograms
    pub desired_histogram_buckets: usize,

    /// Value-histogram cardinality above which strings default to sequence mode
    pub sequence_cardinality_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            known_value_enum_cutoff: 250,
            max_string_length_for_histogram: 250,
            max_examples: 10,
            desired_histogram_buckets: 20,
            sequence_cardinality_threshold: 0.6,
        }
    }
}

impl DetectorConfig {
    /// Loads a detector configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.desired_histogram_buckets == 0 {
            return Err(Error::ConfigError(
                "desiredHistogramBuckets must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sequence_cardinality_threshold) {
            return Err(Error::ConfigError(format!(
                "sequenceCardinalityThreshold must lie in [0, 1], got {}",
                self.sequence_cardinality_threshold
            )));
        }
        Ok(())
    }
}

/// Configuration for architecture compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Name used to derive the root module and criterion names
    pub architecture_name: String,

    /// Wrap every graph node in a debugging module
    pub debug_nodes: bool,

    /// Width of the word vectors supplied by the runtime
    pub word_vector_size: usize,

    /// Emit functions moving converted tensors onto the accelerator
    pub localize_tensors: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            architecture_name: "main".to_string(),
            debug_nodes: false,
            word_vector_size: 300,
            localize_tensors: true,
        }
    }
}

impl CompilerConfig {
    /// Loads a compiler configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable
    pub fn validate(&self) -> Result<()> {
        let valid_name = !self.architecture_name.is_empty()
            && self.architecture_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(Error::ConfigError(format!(
                "architectureName must be a non-empty identifier, got '{}'",
                self.architecture_name
            )));
        }
        if self.word_vector_size == 0 {
            return Err(Error::ConfigError("wordVectorSize must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Unable to read {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&text)?)
}
