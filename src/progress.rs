//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::QaConfigBuilder::progress_callback`] to follow a request
//! as it scans pages. The CLI uses it to drive a spinner; a server could
//! forward the events to a websocket instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docqa::{ExtractionProgressCallback, QaConfig, Strategy};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for PageCounter {
//!     fn on_page_scanned(&self, _s: Strategy, _page: usize, _total: usize, _n: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = QaConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::document::Strategy;
use std::sync::Arc;

/// Called by the pipeline while it answers a question.
///
/// Pages are scanned by a bounded worker pool, so `on_page_scanned` may be
/// called concurrently and out of page order. Every method defaults to a
/// no-op.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the document is loaded.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a strategy begins scanning the document.
    fn on_strategy_start(&self, strategy: Strategy) {
        let _ = strategy;
    }

    /// Called after a page has been scanned by `strategy`.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `candidates`: non-empty answers the capability proposed for the page
    fn on_page_scanned(
        &self,
        strategy: Strategy,
        page_num: usize,
        total_pages: usize,
        candidates: usize,
    ) {
        let _ = (strategy, page_num, total_pages, candidates);
    }

    /// Called once the selection is final.
    fn on_extraction_complete(&self, found: bool) {
        let _ = found;
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        strategies: AtomicUsize,
        pages: AtomicUsize,
        found: AtomicUsize,
    }

    impl ExtractionProgressCallback for Tracking {
        fn on_strategy_start(&self, _strategy: Strategy) {
            self.strategies.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_scanned(&self, _s: Strategy, _p: usize, _t: usize, _c: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, found: bool) {
            if found {
                self.found.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(3);
        cb.on_strategy_start(Strategy::Image);
        cb.on_page_scanned(Strategy::Image, 1, 3, 2);
        cb.on_extraction_complete(false);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = Tracking::default();
        t.on_strategy_start(Strategy::Image);
        t.on_page_scanned(Strategy::Image, 1, 2, 0);
        t.on_page_scanned(Strategy::Image, 2, 2, 1);
        t.on_strategy_start(Strategy::TextWindow);
        t.on_extraction_complete(true);
        assert_eq!(t.strategies.load(Ordering::SeqCst), 2);
        assert_eq!(t.pages.load(Ordering::SeqCst), 2);
        assert_eq!(t.found.load(Ordering::SeqCst), 1);
    }
}
