//! Index generation manager: the reindex-and-swap job.
//!
//! A sync runs five strictly sequential stages:
//!
//! 1. **CreateIndex**: create a fresh, timestamp-named generation
//! 2. **CountSource**: count source documents (zero skips population)
//! 3. **Populate**: stream every document into the generation in bulk
//! 4. **AliasSwap**: move the `type` alias onto the new generation and off
//!    every older one in a single atomic alias update
//! 5. **DeleteStale**: delete the older generations concurrently
//!
//! Queries through the alias keep hitting the previous generation until the
//! swap, and the new one right after it. A failed stage aborts the job and
//! is never resumed; the new generation is then left unaliased.

use crate::bulk::{BatchStats, BulkBatcher};
use crate::config::EngineConfig;
use crate::error::{IndexError, IndexResult};
use crate::export::DocumentExport;
use crate::retry::RetryExecutor;
use crate::source::DocumentSource;
use crate::transport::{HttpRequest, Method};
use crate::uri;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use searchsync_types::{CollectionDescriptor, GenerationName, SyncJobId};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Instrument, debug, info, info_span, warn};

/// Stages of a sync job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStage {
    CreateIndex,
    CountSource,
    Populate,
    AliasSwap,
    DeleteStale,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateIndex => "index creation",
            Self::CountSource => "source count",
            Self::Populate => "population",
            Self::AliasSwap => "alias swap",
            Self::DeleteStale => "stale generation deletion",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Job id used in log lines.
    pub job: SyncJobId,
    /// The generation now behind the alias.
    pub generation: GenerationName,
    /// Documents the source reported at count time.
    pub counted: u64,
    /// Documents written into the generation.
    pub documents: usize,
    /// Bulk writes issued.
    pub batches: usize,
    /// Generations moved off the alias and deleted.
    pub removed_generations: Vec<String>,
}

/// Index creation settings: the default analyzer keeps e-mail addresses and
/// URLs as single tokens and lower-cases everything.
pub fn generation_settings() -> Value {
    json!({
        "settings": {
            "index": {
                "analysis": {
                    "analyzer": {
                        "default": {
                            "type": "custom",
                            "tokenizer": "uax_url_email",
                            "filter": ["lowercase"]
                        }
                    }
                }
            }
        }
    })
}

#[derive(Default)]
struct TypeState {
    lock: Arc<tokio::sync::Mutex<()>>,
    last_generation: Option<DateTime<Utc>>,
}

/// Runs reindex-and-swap jobs.
pub struct IndexGenerationManager {
    executor: RetryExecutor,
    config: EngineConfig,
    types: Mutex<HashMap<String, TypeState>>,
}

impl IndexGenerationManager {
    /// Creates a manager issuing requests through `executor`.
    pub fn new(executor: RetryExecutor, config: EngineConfig) -> Self {
        Self {
            executor,
            config,
            types: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuilds the index of `collection` from `source` and swaps it in.
    ///
    /// Overlapping calls for the same type are serialized when
    /// [`EngineConfig::serialize_syncs`] is set; otherwise the job whose alias
    /// swap lands last wins.
    pub async fn sync(
        &self,
        source: &dyn DocumentSource,
        collection: &CollectionDescriptor,
    ) -> IndexResult<SyncReport> {
        self.config.validate()?;
        collection.validate()?;

        let key = format!("{}/{}", collection.endpoint.domain(), collection.type_name);
        let _guard = if self.config.serialize_syncs {
            Some(self.type_lock(&key).lock_owned().await)
        } else {
            None
        };

        let job = SyncJobId::new();
        let generation = GenerationName::new(collection, self.generation_time(&key));
        let span = info_span!(
            "sync",
            job = %job,
            type_name = %collection.type_name,
            generation = %generation
        );

        self.run(job, source, collection, generation)
            .instrument(span)
            .await
    }

    fn type_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut types = self.types.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&types.entry(key.to_string()).or_default().lock)
    }

    /// Creation time for a new generation, strictly later (at millisecond
    /// resolution) than any generation this manager issued for the type.
    fn generation_time(&self, key: &str) -> DateTime<Utc> {
        let mut types = self.types.lock().unwrap_or_else(PoisonError::into_inner);
        let state = types.entry(key.to_string()).or_default();

        let mut at = Utc::now();
        if let Some(last) = state.last_generation {
            if at.timestamp_millis() <= last.timestamp_millis() {
                at = last + TimeDelta::milliseconds(1);
            }
        }
        state.last_generation = Some(at);
        at
    }

    async fn run(
        &self,
        job: SyncJobId,
        source: &dyn DocumentSource,
        collection: &CollectionDescriptor,
        generation: GenerationName,
    ) -> IndexResult<SyncReport> {
        let fail = |stage: SyncStage| {
            let generation = generation.to_string();
            move |err: IndexError| {
                warn!("Sync failed during {}: {}", stage, err);
                err.in_stage(stage, generation)
            }
        };

        info!("Starting sync of {}", collection.type_name);

        self.create_index(collection, &generation)
            .await
            .map_err(fail(SyncStage::CreateIndex))?;

        let counted = source.count().await.map_err(fail(SyncStage::CountSource))?;

        let stats = if counted == 0 {
            info!("No documents to index, skipping population");
            BatchStats::default()
        } else {
            self.populate(source, collection, &generation)
                .await
                .map_err(fail(SyncStage::Populate))?
        };

        let stale = self
            .swap_alias(collection, &generation)
            .await
            .map_err(fail(SyncStage::AliasSwap))?;

        self.delete_stale(collection, &stale)
            .await
            .map_err(fail(SyncStage::DeleteStale))?;

        info!(
            "Sync complete: {} documents in {} batches, {} stale generations removed",
            stats.documents,
            stats.flushes,
            stale.len()
        );

        Ok(SyncReport {
            job,
            generation,
            counted,
            documents: stats.documents,
            batches: stats.flushes,
            removed_generations: stale,
        })
    }

    async fn create_index(
        &self,
        collection: &CollectionDescriptor,
        generation: &GenerationName,
    ) -> IndexResult<()> {
        let request = HttpRequest::json(
            Method::Put,
            uri::generation_uri(&collection.endpoint, generation.as_str()),
            generation_settings().to_string(),
        );
        let reply = self.executor.execute(request).await?;
        if !reply.is_acknowledged() {
            return Err(IndexError::unexpected("index creation", &reply.body));
        }

        info!("Created generation {}", generation);
        Ok(())
    }

    async fn populate(
        &self,
        source: &dyn DocumentSource,
        collection: &CollectionDescriptor,
        generation: &GenerationName,
    ) -> IndexResult<BatchStats> {
        let mut export = DocumentExport::start(source, self.config.batch_size);
        let mut batcher = BulkBatcher::new(
            self.executor.clone(),
            collection,
            generation.clone(),
            self.config.batch_size,
        );

        while let Some(doc) = export.next().await {
            batcher.offer(doc?, &export).await?;
        }

        batcher.finish().await
    }

    /// Returns the generations moved off the alias.
    async fn swap_alias(
        &self,
        collection: &CollectionDescriptor,
        generation: &GenerationName,
    ) -> IndexResult<Vec<String>> {
        let aliases_uri = uri::aliases_uri(&collection.endpoint);
        let listing = self.executor.execute(HttpRequest::get(&aliases_uri)).await?;
        let indices = listing
            .body
            .as_object()
            .filter(|_| listing.error().is_none())
            .ok_or_else(|| IndexError::unexpected("alias listing", &listing.body))?;

        let alias = collection.type_name.as_str();
        let mut stale: Vec<String> = indices
            .keys()
            .filter(|name| GenerationName::belongs_to(collection, name))
            .filter(|name| name.as_str() != generation.as_str())
            .cloned()
            .collect();
        stale.sort();

        // Only generations that still carry the alias get a remove action.
        let mut actions: Vec<Value> = stale
            .iter()
            .filter(|name| indices[name.as_str()].pointer(&alias_pointer(alias)).is_some())
            .map(|name| json!({ "remove": { "alias": alias, "index": name } }))
            .collect();
        actions.push(json!({ "add": { "alias": alias, "index": generation.as_str() } }));

        debug!("Alias update with {} actions", actions.len());

        let body = json!({ "actions": actions }).to_string();
        let reply = self
            .executor
            .execute(HttpRequest::json(Method::Post, aliases_uri, body))
            .await?;
        if !reply.is_acknowledged() {
            return Err(IndexError::unexpected("alias update", &reply.body));
        }

        info!("Alias {} now points at {}", alias, generation);
        Ok(stale)
    }

    async fn delete_stale(
        &self,
        collection: &CollectionDescriptor,
        stale: &[String],
    ) -> IndexResult<()> {
        let deletions = stale.iter().map(|name| async move {
            let request = HttpRequest::delete(uri::generation_uri(&collection.endpoint, name));
            let reply = self.executor.execute(request).await?;
            if reply.status == 404 {
                warn!("Stale generation {} was already gone", name);
                return Ok(());
            }
            if !reply.is_acknowledged() {
                return Err(IndexError::unexpected(
                    format!("deletion of {name}"),
                    &reply.body,
                ));
            }
            info!("Deleted stale generation {}", name);
            Ok::<(), IndexError>(())
        });

        // Every deletion runs to completion; the first failure is reported.
        join_all(deletions).await.into_iter().collect()
    }
}

fn alias_pointer(alias: &str) -> String {
    format!("/aliases/{}", alias.replace('~', "~0").replace('/', "~1"))
}
