//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as the batch processes each document.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a WebSocket, a database record, or a terminal
//! progress bar — without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` because documents are
//! processed concurrently.

use std::sync::Arc;

/// Called by the batch loop as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_document_*` methods may be called concurrently
/// from different tasks; implementations must protect shared mutable state.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is processed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document enters the pipeline.
    fn on_document_start(&self, name: &str, total_documents: usize) {
        let _ = (name, total_documents);
    }

    /// Called when a document was extracted (and written, in batch mode).
    fn on_document_complete(&self, name: &str, total_documents: usize) {
        let _ = (name, total_documents);
    }

    /// Called when a document failed after all retries were exhausted.
    fn on_document_error(&self, name: &str, total_documents: usize, error: &str) {
        let _ = (name, total_documents, error);
    }

    /// Called once after all documents have been attempted (or the batch
    /// aborted early).
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_document_start(&self, _name: &str, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _name: &str, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _name: &str, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_document_start("a.pdf", 3);
        cb.on_document_complete("a.pdf", 3);
        cb.on_document_error("b.pdf", 3, "some error");
        cb.on_batch_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };

        tracker.on_document_start("a.pdf", 2);
        tracker.on_document_complete("a.pdf", 2);
        tracker.on_document_start("b.pdf", 2);
        tracker.on_document_error("b.pdf", 2, "inference timeout");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn BatchProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_document_start("x.png", 10);
    }
}
