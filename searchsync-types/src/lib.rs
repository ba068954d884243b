//! Core type definitions for searchsync.
//!
//! This crate defines the plain data shared by the synchronization engine:
//! - Document identifiers (`ObjectId`, `DocumentId`) and sync job ids (UUID v7)
//! - Documents and their canonical, wire-ready normalization
//! - Collection descriptors, search endpoints and index generation names
//!
//! Nothing here performs I/O.

mod collection;
mod document;
mod ids;

pub use collection::{CollectionDescriptor, GenerationName, SearchEndpoint};
pub use document::{Document, FieldValue, ID_FIELD, NormalizedDocument};
pub use ids::{DocumentId, ObjectId, SyncJobId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}
