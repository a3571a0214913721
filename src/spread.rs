//! Render contexts handed to the overlay renderer, one per page.
//!
//! A [`SpreadContents`] is always built fresh from an owned copy of the
//! job's [`ScriptMetadata`]; nothing in it is shared with another page or
//! another job, so concurrent jobs can never see each other's fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Facts about a script that are the same on every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub course_code: String,
    pub exam_diet: String,
    pub marker: String,
    pub candidate: String,
}

/// A free-text annotation found in an input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// 1-indexed page the annotation sits on.
    pub page: usize,
    pub text: String,
}

/// What a previous marking pass left behind in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorState {
    pub comments: Vec<Comment>,
    /// Saved form field name → value.
    pub fields: BTreeMap<String, String>,
}

impl PriorState {
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty() && self.fields.is_empty()
    }
}

/// Everything the overlay renderer needs to produce one output page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadContents {
    pub metadata: ScriptMetadata,
    pub layout_path: PathBuf,
    pub spread_name: String,
    /// Raster of the source page to composite under the overlay.
    pub previous_image_path: PathBuf,
    /// Where the one-page output document goes.
    pub page_output_path: PathBuf,
    /// 1-indexed.
    pub page_index: usize,
    pub comments: Vec<Comment>,
    /// Previously-saved field values. Only ever populated on page 1.
    pub prefills: BTreeMap<String, String>,
}

/// Per-page inputs to [`SpreadContents::for_page`].
#[derive(Debug, Clone)]
pub struct PageArtifact {
    pub index: usize,
    pub raster_path: PathBuf,
    pub output_path: PathBuf,
}

impl SpreadContents {
    /// Build the context for one page of a job.
    pub fn for_page(
        metadata: &ScriptMetadata,
        layout_path: &Path,
        spread_name: &str,
        artifact: &PageArtifact,
        prior: &PriorState,
    ) -> Self {
        let prefills = if artifact.index == 1 {
            prior.fields.clone()
        } else {
            BTreeMap::new()
        };

        Self {
            metadata: metadata.clone(),
            layout_path: layout_path.to_path_buf(),
            spread_name: spread_name.to_string(),
            previous_image_path: artifact.raster_path.clone(),
            page_output_path: artifact.output_path.clone(),
            page_index: artifact.index,
            comments: prior.comments.clone(),
            prefills,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> PriorState {
        let mut fields = BTreeMap::new();
        fields.insert("q1-mark".to_string(), "7".to_string());
        PriorState {
            comments: vec![Comment {
                page: 2,
                text: "see over".into(),
            }],
            fields,
        }
    }

    fn artifact(index: usize) -> PageArtifact {
        PageArtifact {
            index,
            raster_path: PathBuf::from(format!("jpg_pages/s_{index:04}.jpg")),
            output_path: PathBuf::from(format!("pdf_pages/s_{index:04}.pdf")),
        }
    }

    #[test]
    fn prefills_only_on_first_page() {
        let meta = ScriptMetadata::default();
        let layout = PathBuf::from("layout.svg");
        let prior = prior();

        let first = SpreadContents::for_page(&meta, &layout, "mark", &artifact(1), &prior);
        let second = SpreadContents::for_page(&meta, &layout, "mark", &artifact(2), &prior);

        assert_eq!(first.prefills.get("q1-mark").map(String::as_str), Some("7"));
        assert!(second.prefills.is_empty());
        // Comments go to every page.
        assert_eq!(second.comments.len(), 1);
    }

    #[test]
    fn contexts_do_not_alias_metadata() {
        let meta = ScriptMetadata {
            candidate: "B123456".into(),
            ..Default::default()
        };
        let layout = PathBuf::from("layout.svg");
        let mut ctx = SpreadContents::for_page(
            &meta,
            &layout,
            "check",
            &artifact(1),
            &PriorState::default(),
        );
        ctx.metadata.candidate.push_str("-edited");
        ctx.prefills.insert("x".into(), "y".into());

        assert_eq!(meta.candidate, "B123456");
    }
}
