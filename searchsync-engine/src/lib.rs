//! Zero-downtime synchronization of a search index with a primary store.
//!
//! # Architecture
//!
//! The engine keeps one search-engine alias per collection type pointing at
//! exactly one physical index generation. A full resync builds a new
//! generation next to the live one and atomically moves the alias over, so
//! readers never observe a missing or half-filled index.
//!
//! ## Components
//!
//! - **Retry executor**: the only network boundary; bounded linear backoff
//!   with jitter for connection resets
//! - **Document exporter**: backpressure-aware stream of normalized documents
//! - **Bulk batcher**: fixed-size bulk writes, pausing the exporter per flush
//! - **Index generation manager**: create, populate, swap, delete stale
//! - **Live indexer**: per-document writes on save/remove through the alias
//!
//! # Example
//!
//! ```no_run
//! use searchsync_engine::{EngineConfig, MemorySource, SearchSync};
//! use searchsync_types::{CollectionDescriptor, Document};
//!
//! # async fn run() -> searchsync_engine::IndexResult<()> {
//! let engine = SearchSync::new(EngineConfig::default());
//! let cats = CollectionDescriptor::for_collection("Cats");
//!
//! let source = MemorySource::with_documents([
//!     Document::with_new_id().with_field("name", "nomnom"),
//! ]);
//!
//! let report = engine.sync(&source, &cats).await?;
//! println!("{} documents now live in {}", report.documents, report.generation);
//! # Ok(())
//! # }
//! ```

mod bulk;
mod config;
mod error;
mod export;
mod generation;
mod live;
mod retry;
mod search;
mod source;
pub mod transport;
pub mod uri;

pub use bulk::{BatchStats, BulkBatcher, encode_batch};
pub use config::{BATCH_SIZE, EngineConfig, RetryPolicy};
pub use error::{IndexError, IndexResult};
pub use export::{DocumentExport, FlowControl};
pub use generation::{IndexGenerationManager, SyncReport, SyncStage, generation_settings};
pub use live::{LiveIndexer, MutationEvent, MutationHooks, MutationTicket};
pub use retry::{ParsedReply, RetryExecutor};
pub use search::{SearchClient, SearchHit, SearchHits};
pub use source::{DocumentSource, DocumentStream, MemorySource};
pub use transport::{
    HttpRequest, Method, RawReply, ReqwestTransport, Transport, TransportError,
    TransportErrorKind,
};

use searchsync_types::CollectionDescriptor;
use std::sync::Arc;

/// Entry point wiring the components over one transport.
pub struct SearchSync {
    executor: RetryExecutor,
    generations: IndexGenerationManager,
    search: SearchClient,
}

impl SearchSync {
    /// Creates an engine talking HTTP through `reqwest`.
    pub fn new(config: EngineConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout()));
        Self::with_transport(transport, config)
    }

    /// Creates an engine over a custom transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let executor = RetryExecutor::new(transport, config.retry);
        Self {
            generations: IndexGenerationManager::new(executor.clone(), config),
            search: SearchClient::new(executor.clone()),
            executor,
        }
    }

    /// Rebuilds the index of `collection` and swaps it in.
    pub async fn sync(
        &self,
        source: &dyn DocumentSource,
        collection: &CollectionDescriptor,
    ) -> IndexResult<SyncReport> {
        self.generations.sync(source, collection).await
    }

    /// A live indexer for `collection`, usable as [`MutationHooks`].
    pub fn live_indexer(&self, collection: CollectionDescriptor) -> LiveIndexer {
        LiveIndexer::new(self.executor.clone(), collection)
    }

    /// The search client.
    pub fn search(&self) -> &SearchClient {
        &self.search
    }

    /// The shared retry executor.
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }
}
