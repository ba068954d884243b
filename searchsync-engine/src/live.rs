//! Live mutation indexer.
//!
//! Indexes or removes a single document as soon as it is saved or removed in
//! the primary store, independently of any full resync. Requests go through
//! the `type` alias, so they hit whichever generation is live at that moment.
//!
//! Both operations are fire-and-forget: they run on a background task and
//! never fail the caller. The outcome is delivered through the returned
//! [`MutationTicket`], which the caller may await or simply drop.

use crate::error::{IndexError, IndexResult};
use crate::retry::{ParsedReply, RetryExecutor};
use crate::transport::{HttpRequest, Method};
use crate::uri;
use searchsync_types::{CollectionDescriptor, Document, DocumentId};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Outcome of one live mutation.
#[derive(Debug)]
pub enum MutationEvent {
    /// The document was written; carries the search engine reply.
    Indexed { id: DocumentId, reply: Value },
    /// The document was removed; carries the search engine reply.
    Removed { id: DocumentId, reply: Value },
    /// The mutation failed.
    Failed { id: DocumentId, error: IndexError },
}

impl MutationEvent {
    /// The affected document.
    pub fn id(&self) -> &DocumentId {
        match self {
            Self::Indexed { id, .. } | Self::Removed { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    /// Returns true unless the mutation failed.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Handle to the outcome of a background mutation.
#[derive(Debug)]
pub struct MutationTicket {
    id: DocumentId,
    rx: oneshot::Receiver<MutationEvent>,
}

impl MutationTicket {
    /// The affected document.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Waits for the outcome.
    pub async fn wait(self) -> MutationEvent {
        match self.rx.await {
            Ok(event) => event,
            Err(_) => MutationEvent::Failed {
                error: IndexError::Interrupted(format!(
                    "task for document {} ended without reporting",
                    self.id
                )),
                id: self.id,
            },
        }
    }
}

/// Hooks a record-mapping layer fires after a document is persisted or
/// deleted.
pub trait MutationHooks: Send + Sync {
    fn after_save(&self, doc: &Document) -> MutationTicket;
    fn after_remove(&self, doc: &Document) -> MutationTicket;
}

/// Writes single-document changes to the live generation.
#[derive(Clone)]
pub struct LiveIndexer {
    executor: RetryExecutor,
    collection: CollectionDescriptor,
}

impl LiveIndexer {
    /// Creates an indexer for `collection`.
    pub fn new(executor: RetryExecutor, collection: CollectionDescriptor) -> Self {
        Self {
            executor,
            collection,
        }
    }

    /// The collection this indexer writes to.
    pub fn collection(&self) -> &CollectionDescriptor {
        &self.collection
    }

    /// Creates or replaces `doc` in the background.
    ///
    /// The write requires the `type` alias to exist. Before the first sync
    /// it fails with [`MutationEvent::Failed`] rather than letting the
    /// search engine auto-create an index named `type`, which would block
    /// every later alias swap.
    pub fn index_one(&self, doc: &Document) -> MutationTicket {
        let indexer = self.clone();
        let doc = doc.clone();
        self.spawn(doc.id().clone(), async move {
            let id = doc.id().clone();
            match indexer.index_now(&doc).await {
                Ok(reply) => MutationEvent::Indexed {
                    id,
                    reply: reply.body,
                },
                Err(error) => MutationEvent::Failed { id, error },
            }
        })
    }

    /// Removes `doc` in the background.
    pub fn remove_one(&self, doc: &Document) -> MutationTicket {
        let indexer = self.clone();
        let id = doc.id().clone();
        self.spawn(id.clone(), async move {
            match indexer.remove_now(&id).await {
                Ok(reply) => MutationEvent::Removed {
                    id,
                    reply: reply.body,
                },
                Err(error) => MutationEvent::Failed { id, error },
            }
        })
    }

    /// Creates or replaces `doc` and waits for the reply.
    pub async fn index_now(&self, doc: &Document) -> IndexResult<ParsedReply> {
        let body = doc.normalize().to_json()?;
        let request = HttpRequest::json(
            Method::Put,
            uri::indexing_uri(&self.collection, doc.id()),
            body,
        );
        let reply = self.executor.execute(request).await?;
        if reply.is_error() {
            return Err(IndexError::unexpected("document indexing", &reply.body));
        }
        Ok(reply)
    }

    /// Removes the document `id` and waits for the reply. Removing a
    /// document the index never had is not an error.
    pub async fn remove_now(&self, id: &DocumentId) -> IndexResult<ParsedReply> {
        let request = HttpRequest::delete(uri::document_uri(&self.collection, id));
        let reply = self.executor.execute(request).await?;
        if reply.status == 404 && reply.error().is_none() {
            debug!("Document {} was not in the index", id);
            return Ok(reply);
        }
        if reply.is_error() {
            return Err(IndexError::unexpected("document removal", &reply.body));
        }
        Ok(reply)
    }

    fn spawn<F>(&self, id: DocumentId, work: F) -> MutationTicket
    where
        F: Future<Output = MutationEvent> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let event = work.await;
            if let MutationEvent::Failed { id, error } = &event {
                warn!("Live mutation of document {} failed: {}", id, error);
            }
            // The caller may have dropped the ticket.
            let _ = tx.send(event);
        });
        MutationTicket { id, rx }
    }
}

impl MutationHooks for LiveIndexer {
    fn after_save(&self, doc: &Document) -> MutationTicket {
        self.index_one(doc)
    }

    fn after_remove(&self, doc: &Document) -> MutationTicket {
        self.remove_one(doc)
    }
}
