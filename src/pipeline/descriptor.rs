//! Export descriptor: the XML file the grading platform ingests next to
//! each script's page images.
//!
//! The element order is fixed by the platform's importer, so the struct
//! field order below is significant.

use crate::config::ExportOptions;
use crate::error::JobError;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Image path used for every padding page.
pub const BLANK_PAGE_IMAGE: &str = "blankpage.jpg";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename = "CandidateScript", rename_all = "PascalCase")]
pub struct CandidateScript {
    pub question_paper_barcode: String,
    pub candidate_name: String,
    #[serde(rename = "UCI")]
    pub uci: String,
    #[serde(rename = "ScanBatchID")]
    pub scan_batch_id: String,
    #[serde(rename = "ScanScriptID")]
    pub scan_script_id: String,
    pub scan_date: String,
    pub atypical_status: String,
    #[serde(rename = "RescanRequestID")]
    pub rescan_request_id: String,
    pub scanned_centre_candidate_no: String,
    pub scanned_centre_num: String,
    pub additional_information: String,
    pub images: Images,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Images {
    #[serde(rename = "Image")]
    pub image: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub page_no: usize,
    pub image_type: String,
    pub image_path: String,
}

impl Image {
    fn page(page_no: usize, stem: &str) -> Self {
        Self {
            page_no,
            image_type: "jpeg".into(),
            image_path: format!("{stem}\\{stem}_{page_no:04}.jpg"),
        }
    }

    fn blank(page_no: usize) -> Self {
        Self {
            page_no,
            image_type: "jpeg".into(),
            image_path: BLANK_PAGE_IMAGE.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.image_path == BLANK_PAGE_IMAGE
    }
}

/// `ScanScriptID` for a candidate: `1` followed by the digits captured by
/// the first group of `pattern`.
pub fn scan_script_id(pattern: &Regex, candidate: &str) -> Option<String> {
    let digits = pattern.captures(candidate)?.get(1)?.as_str();
    Some(format!("1{digits}"))
}

impl CandidateScript {
    /// Describe one script of `pages` real pages, padded with blank pages
    /// up to `max_pages`.
    pub fn build(
        course_code: &str,
        candidate: &str,
        stem: &str,
        pages: usize,
        max_pages: usize,
        options: &ExportOptions,
    ) -> Result<Self, JobError> {
        let scan_script_id = scan_script_id(&options.candidate_pattern, candidate).ok_or_else(
            || JobError::Validation {
                path: PathBuf::from(candidate),
                reason: format!(
                    "candidate '{}' does not match '{}'",
                    candidate,
                    options.candidate_pattern.as_str()
                ),
            },
        )?;

        let total = pages.max(max_pages);
        let image = (1..=total)
            .map(|n| {
                if n <= pages {
                    Image::page(n, stem)
                } else {
                    Image::blank(n)
                }
            })
            .collect();

        Ok(Self {
            question_paper_barcode: course_code.to_string(),
            candidate_name: candidate.to_string(),
            uci: candidate.to_string(),
            scan_batch_id: options.scan_batch_id.clone(),
            scan_script_id,
            scan_date: options.scan_date.clone(),
            atypical_status: "Normal".into(),
            rescan_request_id: String::new(),
            scanned_centre_candidate_no: candidate.to_string(),
            scanned_centre_num: options.centre.clone(),
            additional_information: String::new(),
            images: Images { image },
        })
    }

    /// Serialise with an XML declaration and four-space indentation.
    pub fn to_xml(&self) -> Result<String, JobError> {
        let mut body = String::new();
        let mut ser = quick_xml::se::Serializer::new(&mut body);
        ser.indent(' ', 4);
        self.serialize(ser)
            .map_err(|e| JobError::Internal(format!("descriptor serialisation: {e}")))?;

        Ok(format!("{XML_DECLARATION}\n{body}\n"))
    }
}
