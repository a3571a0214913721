//! Per-document overlay pipeline.
//!
//! One call to [`run`] takes a single script from its input PDF to a
//! merged, overlaid output document:
//!
//! ```text
//! skip? ──▶ validate ──▶ probe ──▶ prepare ──▶ extract ──▶ rasterise
//!                                                            │
//!                         merge ◀── render page 1..N ◀───────┘
//! ```
//!
//! Every failure is returned as a [`JobError`] for this script only. The
//! one exception is prior-state extraction: a document with no readable
//! annotations is simply treated as unmarked.

use crate::config::OverlayOptions;
use crate::engine::{call_engine, Engines, RasterPattern};
use crate::error::{JobError, Stage};
use crate::pipeline::job::DocumentJob;
use crate::pool::JobOutcome;
use crate::spread::{PageArtifact, PriorState, SpreadContents};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything one overlay task owns.
#[derive(Debug, Clone)]
pub struct OverlayJob {
    pub doc: DocumentJob,
    pub options: OverlayOptions,
    pub engines: Engines,
    pub engine_timeout: Duration,
    /// Shared `<out>/jpg_pages`.
    pub jpg_dir: PathBuf,
    /// Shared `<out>/pdf_pages`.
    pub pdf_dir: PathBuf,
}

impl OverlayJob {
    pub fn output_path(&self) -> PathBuf {
        self.doc.overlay_output_path(&self.options.spread_name)
    }
}

/// Run the overlay pipeline for one script.
pub async fn run(job: OverlayJob) -> Result<JobOutcome, JobError> {
    let name = job.doc.file_name.clone();
    let input = job.doc.input_path();
    let output = job.output_path();
    let timeout = job.engine_timeout;

    // ── Step 1: Idempotency ──────────────────────────────────────────────
    if !job.doc.force_redo && exists(&output).await {
        info!("{}: {} exists, skipping", name, output.display());
        return Ok(JobOutcome::Skipped);
    }

    // ── Step 2: Validate ─────────────────────────────────────────────────
    if !job.doc.has_document_extension() {
        return Err(JobError::Validation {
            path: input,
            reason: "not a PDF".into(),
        });
    }

    // ── Step 3: Probe ────────────────────────────────────────────────────
    let counter = Arc::clone(&job.engines.counter);
    let probe_path = input.clone();
    let pages = call_engine(Stage::Probe, timeout, move || {
        counter.page_count(&probe_path)
    })
    .await?;
    debug!("{}: {} pages", name, pages);

    // ── Step 4: Prepare working directories ──────────────────────────────
    for dir in [&job.jpg_dir, &job.pdf_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| JobError::resource(dir, &e))?;
    }

    // ── Step 5: Prior state ──────────────────────────────────────────────
    let extractor = Arc::clone(&job.engines.extractor);
    let extract_path = input.clone();
    let prior = match call_engine(Stage::Extract, timeout, move || {
        extractor.extract(&extract_path)
    })
    .await
    {
        Ok(prior) => prior,
        Err(e) => {
            warn!("{}: {}; treating as unmarked", name, e);
            PriorState::default()
        }
    };
    if !prior.is_empty() {
        debug!(
            "{}: carrying forward {} comments and {} fields",
            name,
            prior.comments.len(),
            prior.fields.len()
        );
    }

    // ── Step 6: Rasterise ────────────────────────────────────────────────
    let rasters = job.doc.raster_pattern(&job.jpg_dir);
    let produced = rasterize_fresh(&job.engines, timeout, &input, &rasters, pages).await?;

    // ── Step 7: Render each page ─────────────────────────────────────────
    let page_docs = job.doc.page_pattern(&job.pdf_dir);
    let mut rendered = Vec::with_capacity(pages);
    for index in 1..=pages {
        let stage = Stage::Render { page: index };
        let artifact = PageArtifact {
            index,
            raster_path: rasters.path_for(index),
            output_path: page_docs.path_for(index),
        };
        if !produced.contains(&artifact.raster_path) || !exists(&artifact.raster_path).await {
            return Err(JobError::Engine {
                stage,
                detail: format!("raster {} was not produced", artifact.raster_path.display()),
            });
        }

        let contents = SpreadContents::for_page(
            &job.doc.metadata,
            &job.options.layout_path,
            &job.options.spread_name,
            &artifact,
            &prior,
        );
        let renderer = Arc::clone(&job.engines.renderer);
        let rubric = Arc::clone(&job.options.rubric);
        call_engine(stage, timeout, move || renderer.render(&contents, &rubric)).await?;
        rendered.push(artifact.output_path);
    }

    // ── Step 8: Merge ────────────────────────────────────────────────────
    // Merge to a side file and rename so an interrupted merge never leaves
    // something the skip check would accept.
    let partial = output.with_extension("pdf.part");
    let merger = Arc::clone(&job.engines.merger);
    let merge_target = partial.clone();
    call_engine(Stage::Merge, timeout, move || {
        merger.merge(&rendered, &merge_target)
    })
    .await?;
    tokio::fs::rename(&partial, &output)
        .await
        .map_err(|e| JobError::resource(&output, &e))?;

    info!("{}: wrote {} ({} pages)", name, output.display(), pages);
    Ok(JobOutcome::Done { pages })
}

pub(crate) async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Rasterise `input` after removing any images a previous run left under
/// the same names, so a page the rasteriser skips can never be filled by a
/// stale image. Returns the paths the rasteriser reported writing.
pub(crate) async fn rasterize_fresh(
    engines: &Engines,
    timeout: Duration,
    input: &Path,
    pattern: &RasterPattern,
    pages: usize,
) -> Result<HashSet<PathBuf>, JobError> {
    for page in 1..=pages {
        let stale = pattern.path_for(page);
        match tokio::fs::remove_file(&stale).await {
            Ok(()) => debug!("removed stale {}", stale.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(JobError::resource(&stale, &e)),
        }
    }

    let rasterizer = Arc::clone(&engines.rasterizer);
    let raster_input = input.to_path_buf();
    let raster_pattern = pattern.clone();
    let written = call_engine(Stage::Rasterize, timeout, move || {
        rasterizer.rasterize(&raster_input, &raster_pattern)
    })
    .await?;
    Ok(written.into_iter().collect())
}
