// Internal shared components
//
// Error types and the configuration structures shared by detection and
// compilation.

pub mod config;
pub mod error;

pub use self::config::{CompilerConfig, DetectorConfig};
pub use self::error::{Error, Result};
