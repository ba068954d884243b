//! The primary-store side of synchronization.
//!
//! A record-mapping layer plugs in by implementing [`DocumentSource`]: a
//! total count plus a lazy, single-pass stream of every document. The stream
//! is pull-based, so the exporter pauses it simply by not polling.

use crate::error::IndexResult;
use crate::live::{MutationHooks, MutationTicket};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use searchsync_types::{Document, DocumentId};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock};

/// A lazy stream over every document of a collection, in storage order.
pub type DocumentStream = BoxStream<'static, IndexResult<Document>>;

/// Read access to one collection of the primary store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Total number of documents.
    async fn count(&self) -> IndexResult<u64>;

    /// Starts a new single-pass read of all documents.
    fn stream(&self) -> DocumentStream;
}

/// An in-memory collection.
///
/// Saves and removals fire the attached [`MutationHooks`], the same way a
/// record-mapping layer fires after-save and after-remove hooks.
///
/// Documents are kept in insertion order. A stream resumes after the last
/// sequence number it yielded, so removals and inserts made while a stream
/// is open never make it skip or repeat a document.
#[derive(Clone, Default)]
pub struct MemorySource {
    store: Arc<RwLock<Store>>,
    hooks: Option<Arc<dyn MutationHooks>>,
}

#[derive(Default)]
struct Store {
    docs: BTreeMap<u64, Document>,
    sequence_of: HashMap<DocumentId, u64>,
    next_sequence: u64,
}

impl Store {
    fn upsert(&mut self, doc: Document) {
        // A replaced document keeps its place in the order.
        let sequence = match self.sequence_of.get(doc.id()) {
            Some(&sequence) => sequence,
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.sequence_of.insert(doc.id().clone(), sequence);
                sequence
            }
        };
        self.docs.insert(sequence, doc);
    }

    fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        let sequence = self.sequence_of.remove(id)?;
        self.docs.remove(&sequence)
    }

    fn next_after(&self, cursor: Option<u64>) -> Option<(u64, Document)> {
        let lower = cursor.map_or(Bound::Unbounded, Bound::Excluded);
        self.docs
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(&sequence, doc)| (sequence, doc.clone()))
    }
}

impl MemorySource {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection pre-filled with `docs`, without firing hooks.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let source = Self::new();
        for doc in docs {
            source.insert_raw(doc);
        }
        source
    }

    /// Attaches mutation hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn MutationHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Inserts or replaces a document without firing hooks, like a write
    /// that bypasses the mapping layer.
    pub fn insert_raw(&self, doc: Document) {
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(doc);
    }

    /// Inserts or replaces a document and fires `after_save`.
    pub fn save(&self, doc: Document) -> Option<MutationTicket> {
        self.insert_raw(doc.clone());
        self.hooks.as_ref().map(|hooks| hooks.after_save(&doc))
    }

    /// Removes a document and fires `after_remove` if it existed.
    pub fn remove(&self, id: &DocumentId) -> Option<MutationTicket> {
        let removed = self
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        self.hooks.as_ref().map(|hooks| hooks.after_remove(&removed))
    }

    /// Returns a copy of a document.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let sequence = store.sequence_of.get(id)?;
        store.docs.get(sequence).cloned()
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .docs
            .len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn count(&self) -> IndexResult<u64> {
        Ok(self.len() as u64)
    }

    fn stream(&self) -> DocumentStream {
        let store = Arc::clone(&self.store);
        stream::unfold(None::<u64>, move |cursor| {
            let store = Arc::clone(&store);
            async move {
                let (sequence, doc) = store
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .next_after(cursor)?;
                Some((Ok(doc), Some(sequence)))
            }
        })
        .boxed()
    }
}
