//! Document exporter with backpressure.
//!
//! A producer task pulls documents from the source, normalizes them and
//! pushes them into a bounded channel. The consumer can additionally pause
//! the producer through [`FlowControl`]; while paused the producer stops
//! polling the source altogether. Documents in flight are bounded by the
//! channel capacity plus the one the producer holds, independent of the
//! collection size.

use crate::error::IndexResult;
use crate::source::{DocumentSource, DocumentStream};
use futures::StreamExt;
use searchsync_types::NormalizedDocument;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Pause/resume handshake between a consumer and its producer.
pub trait FlowControl: Send + Sync {
    /// Asks the producer to stop emitting.
    fn pause(&self);
    /// Lets the producer continue.
    fn resume(&self);
}

/// A running export of one collection.
///
/// Single-pass: once drained it cannot be restarted; start a new export for
/// a new sync. Dropping the export stops the producer.
pub struct DocumentExport {
    rx: mpsc::Receiver<IndexResult<NormalizedDocument>>,
    paused: watch::Sender<bool>,
    pulled: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl DocumentExport {
    /// Starts exporting `source` through a channel holding at most
    /// `capacity` documents.
    pub fn start(source: &dyn DocumentSource, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (paused, paused_rx) = watch::channel(false);
        let pulled = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(produce(
            source.stream(),
            tx,
            paused_rx,
            Arc::clone(&pulled),
        ));

        Self {
            rx,
            paused,
            pulled,
            task,
        }
    }

    /// Receives the next normalized document, or `None` at end of stream.
    ///
    /// A source error is delivered once and ends the export.
    pub async fn next(&mut self) -> Option<IndexResult<NormalizedDocument>> {
        self.rx.recv().await
    }

    /// Returns true while the producer is asked to pause.
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Number of documents pulled from the source so far.
    pub fn pulled(&self) -> u64 {
        self.pulled.load(Ordering::Acquire)
    }
}

impl FlowControl for DocumentExport {
    fn pause(&self) {
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        self.paused.send_replace(false);
    }
}

impl Drop for DocumentExport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn produce(
    mut stream: DocumentStream,
    tx: mpsc::Sender<IndexResult<NormalizedDocument>>,
    mut paused: watch::Receiver<bool>,
    pulled: Arc<AtomicU64>,
) {
    loop {
        loop {
            let is_paused = *paused.borrow_and_update();
            if !is_paused {
                break;
            }
            if paused.changed().await.is_err() {
                return;
            }
        }

        let Some(item) = stream.next().await else {
            debug!("Export finished after {} documents", pulled.load(Ordering::Acquire));
            return;
        };
        pulled.fetch_add(1, Ordering::AcqRel);

        let failed = item.is_err();
        let item = item.map(|doc| doc.normalize());
        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}
