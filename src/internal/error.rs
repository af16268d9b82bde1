use thiserror::Error;
use std::io; // Import std::io

/// Unified error type for the neuroschema library.
#[derive(Error, Debug)]
pub enum Error {
    /// A strategy or interpretation does not provide a required operation.
    #[error("Unimplemented Capability: {0}")]
    UnimplementedCapability(String),

    /// A configuration value falls outside its declared enumeration.
    #[error("Unrecognized Mode: {0}")]
    UnrecognizedMode(String),

    /// No compiler strategy exists for the observed schema shape.
    #[error("Schema Shape Mismatch: {0}")]
    SchemaShapeMismatch(String),

    /// An output stack could not locate its slice of the shared summary tensor.
    #[error("Missing Named Tensor: {0}")]
    MissingNamedTensor(String),

    /// Error related to malformed schema trees.
    #[error("Schema Error: {0}")]
    SchemaError(String),

    /// Error related to interpretation lookup or registration.
    #[error("Interpretation Error: {0}")]
    InterpretationError(String),

    /// Error related to the layer catalog.
    #[error("Layer Error: {0}")]
    LayerError(String),

    /// Error related to loading or validating configuration.
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Error reported by a data source collaborator.
    #[error("Data Source Error: {0}")]
    DataSourceError(String),

    /// Error related to JSON (de)serialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// Error related to file system access.
    #[error("IO Error: {0}")]
    IoError(String),
}

/// A specialized `Result` type for neuroschema operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
