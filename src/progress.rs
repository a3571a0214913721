//! Progress-callback trait for per-script batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the task pool finishes each script.
//!
//! The pool calls the observer directly as each task settles; there is no
//! channel between the workers and the observer, and nothing the observer
//! does can change a script's outcome.
//!
//! # Example
//!
//! ```rust
//! use gradex_batch::{BatchConfig, BatchProgressCallback, PageHistogram};
//! use std::sync::Arc;
//!
//! let histogram = Arc::new(PageHistogram::new());
//! let config = BatchConfig::builder()
//!     .progress_callback(histogram.clone() as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! // … run the batch, then:
//! eprintln!("{}", histogram.render(40));
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Called by the task pool as it works through a batch.
///
/// Implementations must be `Send + Sync`: scripts finish concurrently and
/// the methods may be called from different threads. All methods have
/// no-op defaults so callers only override what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any script starts.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a worker picks up a script.
    fn on_job_start(&self, label: &str) {
        let _ = label;
    }

    /// Called when a script has been fully processed.
    fn on_job_complete(&self, label: &str, pages: usize) {
        let _ = (label, pages);
    }

    /// Called when a script was skipped because its output already exists.
    fn on_job_skipped(&self, label: &str) {
        let _ = label;
    }

    /// Called when a script failed.
    fn on_job_error(&self, label: &str, error: &str) {
        let _ = (label, error);
    }

    /// Called once after every script has been attempted.
    fn on_batch_complete(&self, total_jobs: usize, failed: usize) {
        let _ = (total_jobs, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// Running histogram of page counts over completed scripts.
///
/// Scripts with an unusual page count are usually mis-scans (a missing
/// back page, a duplicated sheet), so the histogram is the quickest way for
/// an operator to spot them.
#[derive(Debug, Default)]
pub struct PageHistogram {
    counts: Mutex<BTreeMap<usize, usize>>,
}

impl PageHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, pages: usize) {
        let mut counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        *counts.entry(pages).or_insert(0) += 1;
    }

    /// Page count → number of scripts with that count.
    pub fn snapshot(&self) -> BTreeMap<usize, usize> {
        self.counts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of scripts recorded.
    pub fn total(&self) -> usize {
        self.snapshot().values().sum()
    }

    /// Text bar chart, one row per observed page count, bars scaled to
    /// `width` characters.
    pub fn render(&self, width: usize) -> String {
        let counts = self.snapshot();
        let peak = counts.values().copied().max().unwrap_or(0);
        if peak == 0 {
            return "Page count: no completed scripts\n".to_string();
        }

        let mut out = String::from("Page count\n");
        for (pages, n) in &counts {
            let bar = (n * width.max(1)).div_ceil(peak);
            out.push_str(&format!("{pages:>4} │{} {n}\n", "█".repeat(bar)));
        }
        out
    }
}

impl BatchProgressCallback for PageHistogram {
    fn on_job_complete(&self, _label: &str, pages: usize) {
        self.record(pages);
    }
}
