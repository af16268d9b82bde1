// Batch assembly over tensor values
//
// Reference semantics of the generated prepare and unwind procedures. A
// batch of sequences is padded to the longest sequence with empty fillers
// shaped like one item, and the true lengths travel alongside in a parallel
// vector. Unwinding uses that vector to mask the padding back out.

use crate::internal::error::{Error, Result};
use crate::tensor::TensorSchema;

/// Runtime value laid out according to a `TensorSchema`
#[derive(Debug, Clone, PartialEq)]
pub enum TensorValue {
    /// Rows along the batch dimension, each holding the flattened data
    Tensor(Vec<Vec<f64>>),
    /// Per-sample lengths and one batched value per time step
    Sequence {
        lengths: Vec<usize>,
        items: Vec<TensorValue>,
    },
    /// Property values in property order
    Object(Vec<TensorValue>),
}

impl TensorValue {
    /// Number of samples held by the value
    pub fn batch_size(&self) -> usize {
        match self {
            TensorValue::Tensor(rows) => rows.len(),
            TensorValue::Sequence { lengths, .. } => lengths.len(),
            TensorValue::Object(properties) => properties.first().map_or(0, |p| p.batch_size()),
        }
    }

    /// Single-sample sequence value
    pub fn sequence(items: Vec<TensorValue>) -> Self {
        TensorValue::Sequence {
            lengths: vec![items.len()],
            items,
        }
    }
}

/// Options applied while preparing batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Caps the padded time dimension of sequences
    pub max_sequence_length: Option<usize>,
}

/// Zero filled value of one sample; a nested sequence is empty
pub fn empty_value(schema: &TensorSchema) -> TensorValue {
    match schema {
        TensorSchema::Tensor { tensor_dimensions, .. } => {
            let rows = tensor_dimensions.first().map_or(1, |d| d.size);
            let width: usize = tensor_dimensions.iter().skip(1).map(|d| d.size).product();
            TensorValue::Tensor(vec![vec![0.0; width]; rows])
        }
        TensorSchema::Object { properties, .. } => TensorValue::Object(properties.iter().map(empty_value).collect()),
        TensorSchema::Array { .. } => TensorValue::sequence(Vec::new()),
    }
}

/// Combines single-sample values into one batch
pub fn prepare_batch(schema: &TensorSchema, samples: &[TensorValue], options: &BatchOptions) -> Result<TensorValue> {
    match schema {
        TensorSchema::Tensor { variable_name, .. } => {
            let mut rows = Vec::with_capacity(samples.len());
            for sample in samples {
                match sample {
                    TensorValue::Tensor(sample_rows) => rows.extend(sample_rows.iter().cloned()),
                    _ => return Err(mismatch(variable_name, "tensor")),
                }
            }
            Ok(TensorValue::Tensor(rows))
        }
        TensorSchema::Object { variable_name, properties } => {
            let mut batched = Vec::with_capacity(properties.len());
            for (position, property) in properties.iter().enumerate() {
                let mut column = Vec::with_capacity(samples.len());
                for sample in samples {
                    match sample {
                        TensorValue::Object(values) => {
                            let value = values.get(position).ok_or_else(|| mismatch(variable_name, "object"))?;
                            column.push(value.clone());
                        }
                        _ => return Err(mismatch(variable_name, "object")),
                    }
                }
                batched.push(prepare_batch(property, &column, options)?);
            }
            Ok(TensorValue::Object(batched))
        }
        TensorSchema::Array { variable_name, items } => {
            let mut lengths = Vec::with_capacity(samples.len());
            let mut sequences = Vec::with_capacity(samples.len());
            for sample in samples {
                match sample {
                    TensorValue::Sequence { items: sample_items, .. } => {
                        lengths.push(sample_items.len());
                        sequences.push(sample_items);
                    }
                    _ => return Err(mismatch(variable_name, "sequence")),
                }
            }

            let mut longest = lengths.iter().copied().max().unwrap_or(0);
            if let Some(limit) = options.max_sequence_length {
                longest = longest.min(limit);
            }

            let filler = empty_value(items);
            let mut steps = Vec::with_capacity(longest);
            for n in 0..longest {
                let step: Vec<TensorValue> = sequences
                    .iter()
                    .map(|sequence| sequence.get(n).cloned().unwrap_or_else(|| filler.clone()))
                    .collect();
                steps.push(prepare_batch(items, &step, options)?);
            }

            Ok(TensorValue::Sequence { lengths, items: steps })
        }
    }
}

/// Splits a batch back into single-sample values, dropping sequence padding
pub fn unwind_batch(schema: &TensorSchema, batch: &TensorValue) -> Result<Vec<TensorValue>> {
    match (schema, batch) {
        (TensorSchema::Tensor { .. }, TensorValue::Tensor(rows)) => {
            Ok(rows.iter().map(|row| TensorValue::Tensor(vec![row.clone()])).collect())
        }
        (TensorSchema::Object { properties, .. }, TensorValue::Object(values)) => {
            let mut samples: Vec<Vec<TensorValue>> = vec![Vec::new(); batch.batch_size()];
            for (property, value) in properties.iter().zip(values) {
                for (sample, unwound) in samples.iter_mut().zip(unwind_batch(property, value)?) {
                    sample.push(unwound);
                }
            }
            Ok(samples.into_iter().map(TensorValue::Object).collect())
        }
        (TensorSchema::Array { items, .. }, TensorValue::Sequence { lengths, items: steps }) => {
            let mut outputs: Vec<Vec<TensorValue>> = vec![Vec::new(); lengths.len()];
            for (n, step) in steps.iter().enumerate() {
                let unwound = unwind_batch(items, step)?;
                for (s, item) in unwound.into_iter().enumerate() {
                    if n < lengths.get(s).copied().unwrap_or(0) {
                        outputs[s].push(item);
                    }
                }
            }
            Ok(outputs.into_iter().map(TensorValue::sequence).collect())
        }
        _ => Err(mismatch(schema.variable_name(), "matching")),
    }
}

fn mismatch(name: &str, expected: &str) -> Error {
    Error::SchemaShapeMismatch(format!("Value for '{}' is not a {} value", name, expected))
}
