//! Batch entry points: scan a folder, run one pipeline per script on the
//! task pool, and report.
//!
//! Both drivers return `Ok(BatchReport)` even when some scripts failed;
//! check [`BatchReport::error_count`] or call [`BatchReport::into_result`].
//! `Err(GradexError)` is reserved for problems that stop the whole batch
//! before any script runs.

use crate::config::{BatchConfig, ExportOptions, OverlayOptions, TempFilePolicy};
use crate::engine::{Engines, PdfiumEngine};
use crate::error::GradexError;
use crate::output::{BatchReport, JobReport};
use crate::pipeline::job::{ensure_unique_outputs, DocumentJob, DOCUMENT_EXTENSION};
use crate::pipeline::scan::{ensure_dir, find_documents, probe_max_pages};
use crate::pipeline::{export, overlay};
use crate::pool::{Task, TaskPool};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Overlay a spread onto every PDF in `config.input_dir`.
///
/// Writes `<output_dir>/<stem>-<spread>.pdf` per script, skipping scripts
/// whose output already exists unless `force_redo` is set.
///
/// # Errors
/// Returns `Err(GradexError)` only for fatal errors:
/// - the input or output directory cannot be created or read
/// - the spread name is not a plain name
/// - two inputs would write the same output
/// - no engines were supplied and pdfium could not be bound
pub async fn run_overlay(
    config: &BatchConfig,
    options: &OverlayOptions,
) -> Result<BatchReport, GradexError> {
    let start = Instant::now();
    options.validate()?;
    info!(
        "Overlay batch: spread '{}' from {} to {}",
        options.spread_name,
        config.input_dir.display(),
        config.output_dir.display()
    );

    let names = prepare(config).await?;
    let engines = resolve_engines(config)?;

    let jobs: Vec<overlay::OverlayJob> = names
        .into_iter()
        .map(|name| overlay::OverlayJob {
            doc: DocumentJob::new(name, config),
            options: options.clone(),
            engines: engines.clone(),
            engine_timeout: config.engine_timeout,
            jpg_dir: config.jpg_pages_dir(),
            pdf_dir: config.pdf_pages_dir(),
        })
        .collect();

    let outputs: Vec<(String, PathBuf)> = jobs
        .iter()
        .map(|j| (j.doc.file_name.clone(), j.output_path()))
        .collect();
    ensure_unique_outputs(outputs.iter().map(|(n, o)| (n.as_str(), o.clone())))?;

    let tasks = jobs
        .into_iter()
        .map(|job| Task::new(job.doc.file_name.clone(), overlay::run(job)))
        .collect();

    let pool = TaskPool::new(config.workers).with_observer(config.progress_callback.clone());
    let results = pool.run(tasks).await;

    cleanup(config).await;
    Ok(finish(outputs, results, pool.workers(), None, start))
}

/// Export every PDF in `config.input_dir` for the grading platform.
///
/// Writes `<output_dir>/<stem>/<stem>_NNNN.jpg` (unless `xml_only`) and
/// `<output_dir>/<stem>.xml` per script. Every descriptor lists as many
/// pages as the longest script in the folder, padding with blank pages.
///
/// # Errors
/// The same fatal errors as [`run_overlay`], apart from the spread check.
pub async fn run_export(
    config: &BatchConfig,
    options: &ExportOptions,
) -> Result<BatchReport, GradexError> {
    let start = Instant::now();
    info!(
        "Export batch: {} to {}{}",
        config.input_dir.display(),
        config.output_dir.display(),
        if options.xml_only { " (xml only)" } else { "" }
    );

    let names = prepare(config).await?;
    let engines = resolve_engines(config)?;
    let max_pages =
        probe_max_pages(&config.input_dir, &names, &engines, config.engine_timeout).await;

    let options = Arc::new(options.clone());
    let jobs: Vec<export::ExportJob> = names
        .into_iter()
        .map(|name| export::ExportJob {
            doc: DocumentJob::new(name, config),
            options: Arc::clone(&options),
            engines: engines.clone(),
            engine_timeout: config.engine_timeout,
            max_pages,
        })
        .collect();

    let outputs: Vec<(String, PathBuf)> = jobs
        .iter()
        .map(|j| (j.doc.file_name.clone(), j.output_path()))
        .collect();
    ensure_unique_outputs(outputs.iter().map(|(n, o)| (n.as_str(), o.clone())))?;

    let tasks = jobs
        .into_iter()
        .map(|job| Task::new(job.doc.file_name.clone(), export::run(job)))
        .collect();

    let pool = TaskPool::new(config.workers).with_observer(config.progress_callback.clone());
    let results = pool.run(tasks).await;

    cleanup(config).await;
    Ok(finish(outputs, results, pool.workers(), Some(max_pages), start))
}

/// Synchronous wrapper around [`run_overlay`].
///
/// Creates a temporary tokio runtime internally. Engine calls that timed
/// out are abandoned when it shuts down, so this returns as soon as the
/// batch does.
pub fn run_overlay_sync(
    config: &BatchConfig,
    options: &OverlayOptions,
) -> Result<BatchReport, GradexError> {
    let rt = runtime()?;
    let result = rt.block_on(run_overlay(config, options));
    rt.shutdown_background();
    result
}

/// Synchronous wrapper around [`run_export`].
pub fn run_export_sync(
    config: &BatchConfig,
    options: &ExportOptions,
) -> Result<BatchReport, GradexError> {
    let rt = runtime()?;
    let result = rt.block_on(run_export(config, options));
    rt.shutdown_background();
    result
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn runtime() -> Result<tokio::runtime::Runtime, GradexError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| GradexError::Internal(format!("Failed to create tokio runtime: {}", e)))
}

/// Create both top-level directories and list the scripts.
async fn prepare(config: &BatchConfig) -> Result<Vec<String>, GradexError> {
    ensure_dir(&config.input_dir).await?;
    ensure_dir(&config.output_dir).await?;
    find_documents(&config.input_dir, DOCUMENT_EXTENSION).await
}

/// Caller-supplied engines win; otherwise locate pdfium and check it binds.
fn resolve_engines(config: &BatchConfig) -> Result<Engines, GradexError> {
    if let Some(ref engines) = config.engines {
        return Ok(engines.clone());
    }
    let engine = PdfiumEngine::bind(config.dpi, config.max_rendered_pixels)?;
    Ok(Engines::from_backend(Arc::new(engine)))
}

/// Remove intermediates when the policy says so. Never fails the batch.
async fn cleanup(config: &BatchConfig) {
    if config.temp_files != TempFilePolicy::Discard {
        return;
    }
    for dir in [config.jpg_pages_dir(), config.pdf_pages_dir()] {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!("Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
        }
    }
}

fn finish(
    outputs: Vec<(String, PathBuf)>,
    results: Vec<crate::pool::TaskResult>,
    workers: usize,
    max_pages: Option<usize>,
    start: Instant,
) -> BatchReport {
    let jobs: Vec<JobReport> = outputs
        .into_iter()
        .zip(results)
        .map(|((input, output), result)| JobReport::from_task(input, output, result))
        .collect();

    let report = BatchReport::new(jobs, workers, max_pages, start.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {} done, {} skipped, {} failed, {} pages, {}ms",
        report.stats.done,
        report.stats.skipped,
        report.stats.failed,
        report.stats.total_pages,
        report.stats.total_duration_ms
    );
    report
}
