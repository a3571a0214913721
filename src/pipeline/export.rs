//! Per-document export pipeline: page images plus an XML descriptor in the
//! layout the grading platform imports.
//!
//! ```text
//! <out>/<stem>/<stem>_0001.jpg …   (omitted with xml_only)
//! <out>/<stem>.xml
//! ```

use crate::config::ExportOptions;
use crate::engine::{call_engine, Engines};
use crate::error::{JobError, Stage};
use crate::pipeline::descriptor::CandidateScript;
use crate::pipeline::job::DocumentJob;
use crate::pipeline::overlay::{exists, rasterize_fresh};
use crate::pool::JobOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Everything one export task owns.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub doc: DocumentJob,
    pub options: Arc<ExportOptions>,
    pub engines: Engines,
    pub engine_timeout: Duration,
    /// Longest script in the batch; shorter ones are padded to it.
    pub max_pages: usize,
}

impl ExportJob {
    pub fn output_path(&self) -> PathBuf {
        self.doc.descriptor_path()
    }
}

/// Run the export pipeline for one script.
pub async fn run(job: ExportJob) -> Result<JobOutcome, JobError> {
    let name = job.doc.file_name.clone();
    let input = job.doc.input_path();
    let descriptor_path = job.output_path();
    let timeout = job.engine_timeout;

    if !job.doc.force_redo && exists(&descriptor_path).await {
        info!("{}: {} exists, skipping", name, descriptor_path.display());
        return Ok(JobOutcome::Skipped);
    }

    if !job.doc.has_document_extension() {
        return Err(JobError::Validation {
            path: input,
            reason: "not a PDF".into(),
        });
    }

    let counter = Arc::clone(&job.engines.counter);
    let probe_path = input.clone();
    let pages = call_engine(Stage::Probe, timeout, move || {
        counter.page_count(&probe_path)
    })
    .await?;

    // Validate the candidate before writing any images for it.
    let descriptor = CandidateScript::build(
        &job.doc.metadata.course_code,
        &job.doc.metadata.candidate,
        &job.doc.stem,
        pages,
        job.max_pages,
        &job.options,
    )?;

    if job.options.xml_only {
        debug!("{}: xml only, not rasterising", name);
    } else {
        let image_dir = job.doc.export_image_dir();
        tokio::fs::create_dir_all(&image_dir)
            .await
            .map_err(|e| JobError::resource(&image_dir, &e))?;

        let pattern = job.doc.raster_pattern(&image_dir);
        let produced = rasterize_fresh(&job.engines, timeout, &input, &pattern, pages).await?;
        if let Some(page) = (1..=pages).find(|p| !produced.contains(&pattern.path_for(*p))) {
            return Err(JobError::Engine {
                stage: Stage::Rasterize,
                detail: format!("page {page} was not produced"),
            });
        }
    }

    let xml = descriptor.to_xml()?;
    write_atomic(&descriptor_path, xml.as_bytes()).await?;

    info!(
        "{}: wrote {} ({} pages, padded to {})",
        name,
        descriptor_path.display(),
        pages,
        pages.max(job.max_pages)
    );
    Ok(JobOutcome::Done { pages })
}

/// Write to a temp file, then rename into place.
async fn write_atomic(path: &std::path::Path, contents: &[u8]) -> Result<(), JobError> {
    let tmp_path = path.with_extension("xml.tmp");
    let export_error = |e: std::io::Error| JobError::Engine {
        stage: Stage::Export,
        detail: format!("{}: {}", path.display(), e),
    };

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(export_error)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(export_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::engine::recording::RecordingEngine;

    #[tokio::test]
    async fn non_pdf_input_fails_validation_without_engine_calls() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig::builder()
            .input_dir(dir.path().join("in"))
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let job = ExportJob {
            doc: DocumentJob::new("a.tiff", &config),
            options: Arc::new(ExportOptions::default()),
            engines: Engines::from_backend(engine.clone()),
            engine_timeout: Duration::from_secs(5),
            max_pages: 3,
        };
        let descriptor = job.output_path();

        let err = run(job).await.unwrap_err();

        assert!(matches!(err, JobError::Validation { .. }));
        assert_eq!(engine.calls(), 0);
        assert!(!descriptor.exists());
    }

    #[tokio::test]
    async fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("B1.xml");
        std::fs::write(&path, b"old").unwrap();

        write_atomic(&path, b"new").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert!(!dir.path().join("B1.xml.tmp").exists());
    }

    #[tokio::test]
    async fn atomic_write_into_missing_dir_is_an_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_atomic(&dir.path().join("gone").join("B1.xml"), b"x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::Engine {
                stage: Stage::Export,
                ..
            }
        ));
    }
}
