//! Document jobs: the immutable description of one script's work.
//!
//! A job is created once per discovered input file, before anything is
//! dispatched, and then moved into the task that runs it. Every path a job
//! will touch is a pure function of its file name and the batch settings.

use crate::config::BatchConfig;
use crate::engine::RasterPattern;
use crate::error::GradexError;
use crate::spread::ScriptMetadata;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Extension of the documents the pipelines accept.
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// One script to process.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    /// File name inside `input_dir`.
    pub file_name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Collision-free base name for every file this job writes.
    pub stem: String,
    /// Owned copy of the batch metadata with `candidate` filled in.
    pub metadata: ScriptMetadata,
    pub force_redo: bool,
}

impl DocumentJob {
    pub fn new(file_name: impl Into<String>, config: &BatchConfig) -> Self {
        let file_name = file_name.into();
        let mut metadata = config.metadata.clone();
        metadata.candidate = candidate_name(&file_name);

        Self {
            stem: output_stem(&file_name),
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            metadata,
            force_redo: config.force_redo,
            file_name,
        }
    }

    pub fn input_path(&self) -> PathBuf {
        self.input_dir.join(&self.file_name)
    }

    /// `<out>/<stem>-<spread>.pdf`
    pub fn overlay_output_path(&self, spread_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.{}", self.stem, spread_name, DOCUMENT_EXTENSION))
    }

    /// `<out>/<stem>.xml`
    pub fn descriptor_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.xml", self.stem))
    }

    /// `<out>/<stem>/`, the per-script image folder of an export.
    pub fn export_image_dir(&self) -> PathBuf {
        self.output_dir.join(&self.stem)
    }

    /// `<dir>/<stem>_%04d.jpg`
    pub fn raster_pattern(&self, dir: &Path) -> RasterPattern {
        RasterPattern::new(dir, &self.stem, "jpg")
    }

    /// `<dir>/<stem>_%04d.pdf`
    pub fn page_pattern(&self, dir: &Path) -> RasterPattern {
        RasterPattern::new(dir, &self.stem, DOCUMENT_EXTENSION)
    }

    /// Case-insensitive, unlike the directory scan.
    pub fn has_document_extension(&self) -> bool {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(DOCUMENT_EXTENSION))
            .unwrap_or(false)
    }
}

/// File name without its extension.
pub fn candidate_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// Base name for everything a job writes.
///
/// `a.pdf` → `a`, but `a.PDF` → `a_PDF`, so inputs that differ only in the
/// extension never write the same files.
pub fn output_stem(file_name: &str) -> String {
    let stem = candidate_name(file_name);
    match Path::new(file_name).extension() {
        Some(ext) if ext == DOCUMENT_EXTENSION => stem,
        Some(ext) => format!("{}_{}", stem, ext.to_string_lossy()),
        None => stem,
    }
}

/// Reject a job list in which two jobs would write the same output.
pub fn ensure_unique_outputs<'a>(
    outputs: impl IntoIterator<Item = (&'a str, PathBuf)>,
) -> Result<(), GradexError> {
    let mut seen: HashMap<PathBuf, &str> = HashMap::new();
    for (name, output) in outputs {
        if let Some(first) = seen.insert(output.clone(), name) {
            return Err(GradexError::DuplicateOutput {
                first: first.to_string(),
                second: name.to_string(),
                output,
            });
        }
    }
    Ok(())
}
