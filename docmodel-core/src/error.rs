//! Error types and result types for model and persistence operations.
//!
//! Every fallible operation in the workspace returns [`ModelResult<T>`]. Errors raised by a
//! backend are passed through to the caller untouched; the model layer never retries.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with models and their documents.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Serialization/deserialization error when converting to or from BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during database initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An insert did not create exactly one document for the identifier.
    /// The first argument is the document identifier, the second is the collection name.
    #[error("There is already a document with _id {0} in collection {1}")]
    Conflict(String, String),
    /// An update did not modify exactly one document for the identifier.
    /// The first argument is the document identifier, the second is the collection name.
    #[error("No document with _id {0} found in collection {1}")]
    NotFound(String, String),
    /// The schema handed to the model factory could not be compiled.
    #[error("Schema compilation error: {0}")]
    SchemaCompilation(String),
    /// A query referenced a field that the model's schema does not declare.
    /// The first argument is the field path, the second is the collection name.
    #[error("Unknown field {0} for collection {1}")]
    UnknownField(String, String),
    /// The document or update has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying database.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<BsonError> for ModelError {
    fn from(err: BsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
