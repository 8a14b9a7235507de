//! Error types and result types for collection operations.
//!
//! Use [`CollectionResult<T>`] as the return type for fallible operations.
//! Filter evaluation and permission reduction never produce errors: unknown
//! clauses fail closed and denied fields are reported through the reduction
//! result instead.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a permissioned store.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// Serialization/deserialization error when converting between record formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A record with the given ID already exists in the collection.
    /// The first argument is the record ID, the second is the collection name.
    #[error("Record {0} already exists in collection {1}")]
    RecordAlreadyExists(String, String),
    /// The requested record was not found in the collection.
    /// The first argument is the record ID, the second is the collection name.
    #[error("Record not found {0} in collection {1}")]
    RecordNotFound(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A collection with this name is already registered.
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    /// No actor is registered under the given ID.
    #[error("Actor not found: {0}")]
    ActorNotFound(String),
    /// An actor with the given ID is already registered.
    #[error("Actor already exists: {0}")]
    ActorAlreadyExists(String),
    /// The record violates the collection shape or has invalid structure.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// A filter could not be read from its wire form.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

impl From<BsonError> for CollectionError {
    fn from(err: BsonError) -> Self {
        CollectionError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for CollectionError {
    fn from(err: SerdeJsonError) -> Self {
        CollectionError::Serialization(err.to_string())
    }
}
