//! Error types for the gradex-batch library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`GradexError`] is **fatal**: the batch cannot proceed at all (the input
//!   or output directory is unusable, the rubric is malformed, two jobs
//!   would overwrite each other). Returned as `Err(GradexError)` from the
//!   top-level `run_*` functions.
//!
//! * [`JobError`] is **per job**: one script failed (not a PDF, an engine
//!   crashed or hung) but every other script in the batch is unaffected.
//!   Stored inside [`crate::pool::TaskResult`] so the operator gets one line
//!   per failed script and a final error count.
//!
//! * [`EngineError`] is what an external collaborator (rasteriser, renderer,
//!   merger, extractor) reports. The pipeline wraps it into
//!   [`JobError::Engine`] together with the stage that was running.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the gradex-batch library.
#[derive(Debug, Error)]
pub enum GradexError {
    /// A top-level directory could not be created or read.
    #[error("Directory '{path}' is not usable: {source}\nCheck that the parent exists and is writable.")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rubric CSV exists but could not be parsed.
    #[error("Rubric '{path}' could not be read: {detail}\nExpected a CSV with 'part' and 'marks' columns.")]
    RubricUnreadable { path: PathBuf, detail: String },

    /// Two input files map to the same output document.
    #[error("Inputs '{first}' and '{second}' would both write '{output}'")]
    DuplicateOutput {
        first: String,
        second: String,
        output: PathBuf,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    /// Some jobs in the batch failed.
    ///
    /// Returned by [`crate::output::BatchReport::into_result`] when the
    /// caller wants to treat any job failure as an error.
    #[error("{failed}/{total} scripts failed during the batch")]
    PartialFailure { failed: usize, total: usize },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The pipeline stage that was running when a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Probe,
    Extract,
    Rasterize,
    /// Overlay rendering of one page (1-indexed).
    Render {
        page: usize,
    },
    Merge,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Probe => f.write_str("page-count probe"),
            Stage::Extract => f.write_str("prior-state extraction"),
            Stage::Rasterize => f.write_str("rasterisation"),
            Stage::Render { page } => write!(f, "overlay render of page {page}"),
            Stage::Merge => f.write_str("merge"),
            Stage::Export => f.write_str("export descriptor"),
        }
    }
}

/// A non-fatal error for a single script.
///
/// The batch continues; the driver counts these to decide the exit status.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum JobError {
    /// The input is not something this pipeline accepts.
    #[error("{path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    /// A job-local directory or file could not be created or written.
    #[error("{path}: {detail}")]
    Resource { path: PathBuf, detail: String },

    /// An external engine reported failure.
    #[error("{stage} failed: {detail}")]
    Engine { stage: Stage, detail: String },

    /// An external engine did not return within the configured timeout.
    #[error("{stage} timed out after {millis}ms")]
    Timeout { stage: Stage, millis: u64 },

    /// The task panicked or was cancelled by the runtime.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    pub(crate) fn resource(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        JobError::Resource {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}

/// Failure reported by an external engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not read or write a file.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be opened.
    #[error("could not load '{path}': {detail}")]
    Load { path: PathBuf, detail: String },

    /// Anything else the engine wants to report.
    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = GradexError::PartialFailure {
            failed: 2,
            total: 40,
        };
        assert!(e.to_string().contains("2/40"), "got: {e}");
    }

    #[test]
    fn engine_error_names_stage_and_page() {
        let e = JobError::Engine {
            stage: Stage::Render { page: 3 },
            detail: "layout has no spread 'mark'".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("spread 'mark'"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = JobError::Timeout {
            stage: Stage::Rasterize,
            millis: 1500,
        };
        assert_eq!(e.to_string(), "rasterisation timed out after 1500ms");
    }

    #[test]
    fn job_error_serialises_with_stage() {
        let e = JobError::Engine {
            stage: Stage::Merge,
            detail: "disk full".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("merge"), "got: {json}");
    }

    #[test]
    fn duplicate_output_names_both_inputs() {
        let e = GradexError::DuplicateOutput {
            first: "a_PDF.pdf".into(),
            second: "a.PDF".into(),
            output: PathBuf::from("out/a_PDF-mark.pdf"),
        };
        let msg = e.to_string();
        assert!(msg.contains("a_PDF.pdf") && msg.contains("a.PDF"));
    }
}
