//! Error types for the synchronization engine.

use crate::generation::SyncStage;
use crate::transport::{HttpRequest, TransportError};
use serde_json::Value;
use thiserror::Error;

/// Result type for engine operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur while talking to the search engine or running a sync.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Permanent transport failure, or a transient one that outlived the
    /// retry budget.
    #[error("search request {request} failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        request: Box<HttpRequest>,
        #[source]
        source: TransportError,
    },

    /// The search engine replied with something that is not JSON.
    #[error("search engine did not send back a valid JSON reply to {request}: {body:?}")]
    InvalidReply {
        request: Box<HttpRequest>,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// The reply parsed but lacked the expected success marker.
    #[error("unexpected {context} reply: {reply}")]
    UnexpectedReply { context: String, reply: Value },

    /// A bulk write came back with an error.
    #[error("bulk write of {documents} document(s) into {generation} was rejected: {reply}")]
    BulkRejected {
        generation: String,
        documents: usize,
        reply: Value,
    },

    /// The document source failed to count or stream.
    #[error("document source error: {0}")]
    Source(String),

    /// A background mutation task ended without reporting.
    #[error("mutation interrupted: {0}")]
    Interrupted(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid collection descriptor or identifier.
    #[error(transparent)]
    Types(#[from] searchsync_types::Error),

    /// A sync job aborted; wraps the first error and the stage it hit.
    #[error("sync aborted during {stage} of {generation}: {source}")]
    Stage {
        stage: SyncStage,
        generation: String,
        #[source]
        source: Box<IndexError>,
    },
}

impl IndexError {
    pub(crate) fn unexpected(context: impl Into<String>, reply: &Value) -> Self {
        Self::UnexpectedReply {
            context: context.into(),
            reply: reply.clone(),
        }
    }

    pub(crate) fn in_stage(self, stage: SyncStage, generation: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            generation: generation.into(),
            source: Box::new(self),
        }
    }

    /// Number of attempts made for the failing request, if a request failed.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Transport { attempts, .. } => Some(*attempts),
            Self::Stage { source, .. } => source.attempts(),
            _ => None,
        }
    }

    /// The sync stage this error aborted, if it came out of a sync job.
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, unwrapping stage context.
    pub fn root(&self) -> &IndexError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if a transient failure kept recurring until the retry
    /// budget ran out.
    pub fn is_transient_exhausted(&self) -> bool {
        matches!(self.root(), Self::Transport { source, .. } if source.is_transient())
    }
}
