//! # gradex-batch
//!
//! Concurrent batch processing of scanned exam scripts.
//!
//! Point it at a folder of PDFs and it processes each script on its own
//! worker, in one of two modes:
//!
//! * **Overlay**: rasterise every page, composite a marking spread over it
//!   (carrying forward anything a previous pass wrote into the document),
//!   and merge the pages into `<stem>-<spread>.pdf`.
//! * **Export**: write each script's pages as JPEGs in its own folder plus
//!   an XML descriptor for the grading platform, padded with blank pages to
//!   the longest script in the batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input_dir/*.pdf
//!  │
//!  ├─ 1. Scan      list scripts (top level, `.pdf` only), probe page counts
//!  ├─ 2. Jobs      fix every output path up front, reject collisions
//!  ├─ 3. Pool      run jobs on N workers; a failing job never stops the rest
//!  ├─ 4. Engines   probe / extract / rasterise / render / merge, each on the
//!  │               blocking pool under a timeout
//!  └─ 5. Report    per-script status, page histogram, error count
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gradex_batch::{load_rubric, run_overlay, BatchConfig, OverlayOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .input_dir("scans")
//!         .output_dir("marked")
//!         .course_code("MATH10001")
//!         .marker("ABC")
//!         .build()?;
//!     let options = OverlayOptions::new("som/layout.svg", "mark")
//!         .with_rubric(load_rubric(Path::new("parts_and_marks.csv"))?);
//!
//!     let report = run_overlay(&config, &options).await?;
//!     eprintln!("{} done, {} failed", report.stats.done, report.error_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `gradex` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! gradex-batch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod rubric;
pub mod spread;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_export, run_export_sync, run_overlay, run_overlay_sync};
pub use config::{BatchConfig, BatchConfigBuilder, ExportOptions, OverlayOptions, TempFilePolicy};
pub use engine::{
    DocumentMerger, Engines, FormExtractor, OverlayRenderer, PageCounter, PdfiumEngine,
    RasterPattern, Rasterizer,
};
pub use error::{EngineError, GradexError, JobError, Stage};
pub use output::{BatchReport, BatchStats, JobReport, JobStatus};
pub use pool::{JobOutcome, Task, TaskPool, TaskResult};
pub use progress::{BatchProgressCallback, NoopProgressCallback, PageHistogram, ProgressCallback};
pub use rubric::{load_rubric, PaperStructure};
pub use spread::{Comment, PriorState, ScriptMetadata, SpreadContents};
