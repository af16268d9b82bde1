// neuroschema library entry point
//
// Detects the schema of sampled structured data and compiles pairs of
// schemas into neural network architectures for a batch tensor runtime.

pub mod accumulator;
pub mod compiler;
pub mod detector;
pub mod graph;
pub mod internal;
pub mod interpretation;
pub mod schema;
pub mod tensor;

pub use crate::compiler::{ArchitectureCompiler, CompiledArchitecture, StrategyDispatch, TensorStrategy};
pub use crate::detector::{detect_schema, DataSource, JsonLinesSource, SchemaDetector, VecDataSource};
pub use crate::internal::config::{CompilerConfig, DetectorConfig};
pub use crate::internal::error::{Error, Result};
pub use crate::interpretation::{Interpretation, InterpretationRegistry};
pub use crate::schema::{Schema, SchemaType};
pub use crate::tensor::TensorSchema;
