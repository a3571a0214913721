//! Rubric loading: the question parts and mark allocations of a paper.
//!
//! The rubric is only ever handed through to the overlay renderer, which
//! decides how to lay it out. A missing file yields an empty rubric and a
//! warning, since plenty of papers are marked without a per-part breakdown.

use crate::error::GradexError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// One question part and the marks available for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperStructure {
    #[serde(alias = "Part", alias = "PART")]
    pub part: String,
    #[serde(alias = "Marks", alias = "MARKS")]
    pub marks: f64,
}

/// Load the rubric CSV at `path`.
///
/// Returns an empty rubric when the file does not exist.
pub fn load_rubric(path: &Path) -> Result<Vec<PaperStructure>, GradexError> {
    if !path.exists() {
        warn!(
            "Rubric '{}' not found; continuing without parts and marks",
            path.display()
        );
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| GradexError::RubricUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let parts = reader
        .deserialize::<PaperStructure>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GradexError::RubricUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    debug!("Loaded {} rubric parts from {}", parts.len(), path.display());
    Ok(parts)
}

/// Total marks available across all parts.
pub fn total_marks(parts: &[PaperStructure]) -> f64 {
    parts.iter().map(|p| p.marks).sum()
}
