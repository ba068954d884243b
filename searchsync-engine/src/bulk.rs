//! Bulk batcher.
//!
//! Accumulates index commands and flushes them as one newline-delimited
//! bulk write whenever the batch fills up. The producer is paused for the
//! duration of every flush and resumed only once the flush succeeded; a
//! failed flush leaves it paused and aborts the sync.

use crate::error::{IndexError, IndexResult};
use crate::export::FlowControl;
use crate::retry::RetryExecutor;
use crate::transport::HttpRequest;
use crate::uri;
use searchsync_types::{CollectionDescriptor, GenerationName, NormalizedDocument, SearchEndpoint};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Serialize)]
struct BulkCommand<'a> {
    index: BulkTarget<'a>,
}

#[derive(Serialize)]
struct BulkTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    type_name: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

/// Counters of a finished population run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Documents written.
    pub documents: usize,
    /// Bulk requests issued.
    pub flushes: usize,
}

/// Encodes `docs` as a bulk body: one command line and one document line per
/// document, with a trailing newline.
pub fn encode_batch(
    generation: &str,
    type_name: &str,
    docs: &[NormalizedDocument],
) -> IndexResult<String> {
    let mut body = String::new();
    for doc in docs {
        let command = BulkCommand {
            index: BulkTarget {
                index: generation,
                type_name,
                id: doc.id().as_str(),
            },
        };
        body.push_str(&serde_json::to_string(&command)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(doc.body())?);
        body.push('\n');
    }
    Ok(body)
}

/// Batches documents into bulk writes against one generation.
pub struct BulkBatcher {
    executor: RetryExecutor,
    endpoint: SearchEndpoint,
    type_name: String,
    generation: GenerationName,
    batch_size: usize,
    pending: Vec<NormalizedDocument>,
    stats: BatchStats,
}

impl BulkBatcher {
    /// Creates a batcher writing into `generation` of `collection`.
    pub fn new(
        executor: RetryExecutor,
        collection: &CollectionDescriptor,
        generation: GenerationName,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            executor,
            endpoint: collection.endpoint.clone(),
            type_name: collection.type_name.clone(),
            generation,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            stats: BatchStats::default(),
        }
    }

    /// Documents waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Appends a document; flushes synchronously once the batch is full.
    pub async fn offer(
        &mut self,
        doc: NormalizedDocument,
        flow: &dyn FlowControl,
    ) -> IndexResult<()> {
        self.pending.push(doc);
        if self.pending.len() >= self.batch_size {
            flow.pause();
            self.flush().await?;
            flow.resume();
        }
        Ok(())
    }

    /// Flushes the final partial batch, if any, and returns the counters.
    pub async fn finish(mut self) -> IndexResult<BatchStats> {
        if !self.pending.is_empty() {
            self.flush().await?;
        }
        Ok(self.stats)
    }

    async fn flush(&mut self) -> IndexResult<()> {
        let documents = self.pending.len();
        let body = encode_batch(self.generation.as_str(), &self.type_name, &self.pending)?;
        let request = HttpRequest::ndjson(
            uri::bulk_uri(&self.endpoint, self.generation.as_str()),
            body,
        );

        let reply = self.executor.execute(request).await?;
        let rejected = reply.error().is_some()
            || reply.body.get("errors").and_then(Value::as_bool) == Some(true);
        if rejected {
            return Err(IndexError::BulkRejected {
                generation: self.generation.to_string(),
                documents,
                reply: reply.body,
            });
        }

        self.pending.clear();
        self.stats.documents += documents;
        self.stats.flushes += 1;
        debug!(
            "Flushed {} documents into {} (batch {})",
            documents, self.generation, self.stats.flushes
        );
        Ok(())
    }
}
