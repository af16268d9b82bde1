// Schema module
//
// This module provides the schema tree shared by detection and compilation:
//
// 1. Schema node types with metadata and configuration
// 2. Native value categories observed in samples
// 3. Filtering and inclusion management
// 4. Variable path helpers

// Re-export public types and functions
pub use self::types::{ComponentConfig, FieldConfiguration, FieldMetadata, Schema, SchemaType};
pub use self::value::{value_kind, ValueKind, ValueTypes};

// Sub-modules
pub mod types;
pub mod value;
pub mod filter;

// Path helpers are shared with the detector and the compiler
pub mod utils;
