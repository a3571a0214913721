//! Configuration types for a batch run.
//!
//! Everything a batch needs is passed in explicitly through [`BatchConfig`]
//! and one of the mode-specific option structs ([`OverlayOptions`],
//! [`ExportOptions`]). Nothing is read from process-wide state once the
//! batch has started, so two batches with different settings can run in the
//! same process.

use crate::engine::Engines;
use crate::error::GradexError;
use crate::progress::ProgressCallback;
use crate::rubric::PaperStructure;
use crate::spread::ScriptMetadata;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default candidate pattern: one letter followed by the digits used for
/// the scan script id, e.g. `B123456`.
pub const DEFAULT_CANDIDATE_PATTERN: &str = r"^[A-Za-z](\d+)$";

static DEFAULT_CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_CANDIDATE_PATTERN).unwrap());

/// Configuration shared by the overlay and export batches.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use gradex_batch::{BatchConfig, TempFilePolicy};
///
/// let config = BatchConfig::builder()
///     .input_dir("scans")
///     .output_dir("marked")
///     .course_code("MATH10001")
///     .temp_files(TempFilePolicy::Discard)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Folder containing the scripts. Created if missing. Default: `input_dir`.
    pub input_dir: PathBuf,

    /// Folder receiving outputs and intermediates. Created if missing.
    /// Default: `output_dir`.
    pub output_dir: PathBuf,

    /// Course code, exam diet and marker. `candidate` is filled per job.
    pub metadata: ScriptMetadata,

    /// Reprocess scripts whose output already exists. Default: false.
    pub force_redo: bool,

    /// What to do with intermediate rasters and page documents. Default: keep.
    pub temp_files: TempFilePolicy,

    /// Number of scripts processed at once. Default: host parallelism.
    pub workers: usize,

    /// Upper bound on any single engine call. Default: 300 s.
    ///
    /// A hung rasteriser or renderer fails its own script instead of
    /// stalling a worker for the rest of the batch.
    pub engine_timeout: Duration,

    /// Rasterisation DPI (72–600). Default: 200.
    pub dpi: u32,

    /// Cap on either dimension of a rendered raster, in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Pre-constructed engines. Takes precedence over the pdfium backend.
    pub engines: Option<Engines>,

    /// Observer for per-script progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input_dir"),
            output_dir: PathBuf::from("output_dir"),
            metadata: ScriptMetadata {
                course_code: "MATH00000".into(),
                exam_diet: "April 2020".into(),
                marker: String::new(),
                candidate: String::new(),
            },
            force_redo: false,
            temp_files: TempFilePolicy::default(),
            workers: default_workers(),
            engine_timeout: Duration::from_secs(300),
            dpi: 200,
            max_rendered_pixels: 4000,
            engines: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("metadata", &self.metadata)
            .field("force_redo", &self.force_redo)
            .field("temp_files", &self.temp_files)
            .field("workers", &self.workers)
            .field("engine_timeout", &self.engine_timeout)
            .field("dpi", &self.dpi)
            .field("engines", &self.engines.as_ref().map(|_| "<custom>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn jpg_pages_dir(&self) -> PathBuf {
        self.output_dir.join("jpg_pages")
    }

    pub(crate) fn pdf_pages_dir(&self) -> PathBuf {
        self.output_dir.join("pdf_pages")
    }
}

/// Host parallelism, or 1 when it cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn course_code(mut self, code: impl Into<String>) -> Self {
        self.config.metadata.course_code = code.into();
        self
    }

    pub fn exam_diet(mut self, diet: impl Into<String>) -> Self {
        self.config.metadata.exam_diet = diet.into();
        self
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.config.metadata.marker = marker.into();
        self
    }

    pub fn force_redo(mut self, v: bool) -> Self {
        self.config.force_redo = v;
        self
    }

    pub fn temp_files(mut self, policy: TempFilePolicy) -> Self {
        self.config.temp_files = policy;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn engine_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine_timeout = timeout;
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout = Duration::from_secs(secs);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn engines(mut self, engines: Engines) -> Self {
        self.config.engines = Some(engines);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, GradexError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(GradexError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.engine_timeout.is_zero() {
            return Err(GradexError::InvalidConfig(
                "Engine timeout must be greater than zero".into(),
            ));
        }
        if c.input_dir == c.output_dir {
            return Err(GradexError::InvalidConfig(format!(
                "Input and output directories must differ (both '{}')",
                c.input_dir.display()
            )));
        }
        Ok(self.config)
    }
}

// ── Mode-specific options ────────────────────────────────────────────────

/// What happens to intermediate rasters and page documents after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempFilePolicy {
    /// Leave `jpg_pages/` and `pdf_pages/` in the output folder. (default)
    #[default]
    Keep,
    /// Remove them once every script has finished.
    Discard,
}

/// Settings for the overlay batch.
#[derive(Debug, Clone)]
pub struct OverlayOptions {
    /// Layout template describing the spreads. Default: `som/layout.svg`.
    pub layout_path: PathBuf,
    /// Spread to apply, e.g. `mark`, `check`, `scrutiny`. Default: `mark`.
    pub spread_name: String,
    /// Question parts and marks, shared read-only by every job.
    pub rubric: Arc<Vec<PaperStructure>>,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            layout_path: PathBuf::from("som/layout.svg"),
            spread_name: "mark".into(),
            rubric: Arc::new(Vec::new()),
        }
    }
}

impl OverlayOptions {
    pub fn new(layout_path: impl Into<PathBuf>, spread_name: impl Into<String>) -> Self {
        Self {
            layout_path: layout_path.into(),
            spread_name: spread_name.into(),
            ..Self::default()
        }
    }

    pub fn with_rubric(mut self, rubric: Vec<PaperStructure>) -> Self {
        self.rubric = Arc::new(rubric);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), GradexError> {
        let name = self.spread_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(GradexError::InvalidConfig(format!(
                "Spread name '{}' must be non-empty and contain no path separators",
                self.spread_name
            )));
        }
        Ok(())
    }
}

/// Settings for the grading-platform export batch.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Write descriptors only; skip rasterisation. Default: false.
    pub xml_only: bool,
    /// `ScanDate` on every descriptor (dd/mm/YYYY). Default: today.
    pub scan_date: String,
    /// `ScannedCentreNum`. Default: `UoESoM`.
    pub centre: String,
    /// `ScanBatchID`. Default: `SID0`.
    pub scan_batch_id: String,
    /// Extracts the candidate digits from a file stem; group 1 is used.
    pub candidate_pattern: Regex,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            xml_only: false,
            scan_date: chrono::Local::now().format("%d/%m/%Y").to_string(),
            centre: "UoESoM".into(),
            scan_batch_id: "SID0".into(),
            candidate_pattern: DEFAULT_CANDIDATE_RE.clone(),
        }
    }
}

impl ExportOptions {
    /// Replace the candidate pattern. It must have at least one capture group.
    pub fn with_candidate_pattern(mut self, pattern: &str) -> Result<Self, GradexError> {
        let re = Regex::new(pattern)
            .map_err(|e| GradexError::InvalidConfig(format!("Candidate pattern: {e}")))?;
        if re.captures_len() < 2 {
            return Err(GradexError::InvalidConfig(format!(
                "Candidate pattern '{pattern}' needs a capture group for the script digits"
            )));
        }
        self.candidate_pattern = re;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_cli() {
        let c = BatchConfig::default();
        assert_eq!(c.input_dir, PathBuf::from("input_dir"));
        assert_eq!(c.output_dir, PathBuf::from("output_dir"));
        assert_eq!(c.temp_files, TempFilePolicy::Keep);
        assert!(c.workers >= 1);
        assert!(!c.force_redo);
    }

    #[test]
    fn builder_clamps_and_sets() {
        let c = BatchConfig::builder()
            .workers(0)
            .dpi(20)
            .course_code("PHYS20002")
            .marker("XYZ")
            .build()
            .unwrap();
        assert_eq!(c.workers, 1);
        assert_eq!(c.dpi, 72);
        assert_eq!(c.metadata.course_code, "PHYS20002");
        assert_eq!(c.metadata.marker, "XYZ");
    }

    #[test]
    fn same_input_and_output_is_rejected() {
        let err = BatchConfig::builder()
            .input_dir("scripts")
            .output_dir("scripts")
            .build()
            .unwrap_err();
        assert!(matches!(err, GradexError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = BatchConfig::builder()
            .engine_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, GradexError::InvalidConfig(_)));
    }

    #[test]
    fn spread_name_must_be_a_plain_name() {
        assert!(OverlayOptions::new("layout.svg", "mark").validate().is_ok());
        assert!(OverlayOptions::new("layout.svg", "").validate().is_err());
        assert!(OverlayOptions::new("layout.svg", "../x").validate().is_err());
    }

    #[test]
    fn candidate_pattern_needs_a_group() {
        assert!(ExportOptions::default()
            .with_candidate_pattern(r"^S\d+$")
            .is_err());
        let opts = ExportOptions::default()
            .with_candidate_pattern(r"^S(\d{7})$")
            .unwrap();
        assert!(opts.candidate_pattern.is_match("S1234567"));
    }

    #[test]
    fn default_scan_date_is_day_month_year() {
        let d = ExportOptions::default().scan_date;
        let parts: Vec<&str> = d.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 4);
    }
}
