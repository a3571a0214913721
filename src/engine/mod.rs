//! Contracts for the external engines the pipeline drives.
//!
//! The batch engine never rasterises, lays out or merges anything itself.
//! It calls out to five collaborators, each behind its own trait so a caller
//! can swap one (say, a Ghostscript rasteriser) without touching the others:
//!
//! | Trait               | Input                         | Output                  |
//! |---------------------|-------------------------------|-------------------------|
//! | [`PageCounter`]     | document path                 | page count              |
//! | [`Rasterizer`]      | document path + naming scheme | one image per page      |
//! | [`FormExtractor`]   | document path                 | comments + saved fields |
//! | [`OverlayRenderer`] | render context + rubric       | one-page document       |
//! | [`DocumentMerger`]  | ordered page documents        | one output document     |
//!
//! All engine calls are blocking. [`call_engine`] moves them onto tokio's
//! blocking pool and bounds them with a timeout, turning both failures and
//! hangs into a [`JobError`] for the one job that made the call.

pub mod pdfium;

use crate::error::{EngineError, JobError, Stage};
use crate::rubric::PaperStructure;
use crate::spread::{PriorState, SpreadContents};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use self::pdfium::PdfiumEngine;

/// Reports how many pages a document has.
pub trait PageCounter: Send + Sync {
    fn page_count(&self, document: &Path) -> Result<usize, EngineError>;
}

/// Writes one image per page of a document.
pub trait Rasterizer: Send + Sync {
    /// Returns the written image paths in page order.
    fn rasterize(&self, document: &Path, pattern: &RasterPattern)
        -> Result<Vec<PathBuf>, EngineError>;
}

/// Reads back what a previous marking pass stored in a document.
pub trait FormExtractor: Send + Sync {
    fn extract(&self, document: &Path) -> Result<PriorState, EngineError>;
}

/// Produces one output page from a raster and a layout.
pub trait OverlayRenderer: Send + Sync {
    /// Writes `contents.page_output_path`.
    fn render(
        &self,
        contents: &SpreadContents,
        rubric: &[PaperStructure],
    ) -> Result<(), EngineError>;
}

/// Concatenates page documents into one.
pub trait DocumentMerger: Send + Sync {
    fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<(), EngineError>;
}

/// Sequential page naming: `<dir>/<stem>_0001.<ext>`, `<stem>_0002.<ext>`, …
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPattern {
    pub dir: PathBuf,
    pub stem: String,
    pub extension: String,
}

impl RasterPattern {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            extension: extension.to_string(),
        }
    }

    /// Path for a 1-indexed page.
    pub fn path_for(&self, page: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{:04}.{}", self.stem, page, self.extension))
    }
}

/// The full set of collaborators one batch runs against.
#[derive(Clone)]
pub struct Engines {
    pub counter: Arc<dyn PageCounter>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub extractor: Arc<dyn FormExtractor>,
    pub renderer: Arc<dyn OverlayRenderer>,
    pub merger: Arc<dyn DocumentMerger>,
}

impl Engines {
    /// Use one backend for every role.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: PageCounter + Rasterizer + FormExtractor + OverlayRenderer + DocumentMerger + 'static,
    {
        Self {
            counter: backend.clone(),
            rasterizer: backend.clone(),
            extractor: backend.clone(),
            renderer: backend.clone(),
            merger: backend,
        }
    }
}

impl fmt::Debug for Engines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engines").finish_non_exhaustive()
    }
}

/// Run a blocking engine call for `stage` with a timeout.
///
/// On timeout the blocking thread is left to finish on its own; its result
/// is discarded and the job is reported as failed.
pub async fn call_engine<T, F>(stage: Stage, timeout: Duration, call: F) -> Result<T, JobError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(timeout, handle).await {
        Err(_) => {
            debug!("{} exceeded {}ms", stage, timeout.as_millis());
            Err(JobError::Timeout {
                stage,
                millis: timeout.as_millis() as u64,
            })
        }
        Ok(Err(join)) => Err(JobError::Internal(format!("{stage} task panicked: {join}"))),
        Ok(Ok(Err(e))) => Err(JobError::Engine {
            stage,
            detail: e.to_string(),
        }),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}
