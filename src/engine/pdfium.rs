//! Default engine backend built on pdfium.
//!
//! One [`PdfiumEngine`] plays every role in [`super::Engines`]: it counts
//! pages, rasterises them to JPEG, reads annotations and saved form fields,
//! renders a one-page overlay document and appends page documents into the
//! final script.
//!
//! The overlay it renders is plain: the page raster scaled to
//! A4 width with a header strip carrying the script's metadata (and, on the
//! first page, the rubric and any carried-forward field values). The layout
//! template is recorded but not interpreted.
//!
//! Carried-forward field values are printed in the first page's header as
//! plain text. No AcroForm fields are written, so [`FormExtractor::extract`]
//! on a merged output finds the annotations but no saved fields.
//!
//! pdfium is not async-safe. The engine only holds the resolved library
//! path, and every method binds its own `Pdfium` on the `spawn_blocking`
//! thread that [`super::call_engine`] runs it on.

use super::{DocumentMerger, FormExtractor, OverlayRenderer, PageCounter, RasterPattern, Rasterizer};
use crate::error::{EngineError, GradexError};
use crate::rubric::{total_marks, PaperStructure};
use crate::spread::{Comment, PriorState, SpreadContents};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A4 width in points; every overlay page is scaled to it.
const PAGE_WIDTH_PT: f32 = 595.0;
const HEADER_LINE_PT: f32 = 12.0;
const HEADER_FONT_PT: f32 = 9.0;
const HEADER_MARGIN_PT: f32 = 10.0;

/// pdfium-backed implementation of all five engine contracts.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    library: PathBuf,
    dpi: u32,
    max_rendered_pixels: u32,
}

impl PdfiumEngine {
    /// Locate pdfium (downloading it on first use) and check that it binds.
    pub fn bind(dpi: u32, max_rendered_pixels: u32) -> Result<Self, GradexError> {
        let library = pdfium_auto::ensure_pdfium_library(None)
            .map_err(|e| GradexError::PdfiumBindingFailed(e.to_string()))?;
        pdfium_auto::bind_pdfium_from_path(&library)
            .map_err(|e| GradexError::PdfiumBindingFailed(e.to_string()))?;
        Ok(Self {
            library,
            dpi,
            max_rendered_pixels,
        })
    }

    /// A fresh binding for the calling thread.
    fn pdfium(&self) -> Result<Pdfium, EngineError> {
        pdfium_auto::bind_pdfium_from_path(&self.library)
            .map_err(|e| EngineError::Failed(format!("pdfium: {e}")))
    }
}

fn load<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, EngineError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

impl PageCounter for PdfiumEngine {
    fn page_count(&self, document: &Path) -> Result<usize, EngineError> {
        let pdfium = self.pdfium()?;
        let doc = load(&pdfium, document)?;
        Ok(doc.pages().len() as usize)
    }
}

impl Rasterizer for PdfiumEngine {
    fn rasterize(
        &self,
        document: &Path,
        pattern: &RasterPattern,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let pdfium = self.pdfium()?;
        let doc = load(&pdfium, document)?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut written = Vec::new();
        for (idx, page) in doc.pages().iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| EngineError::Failed(format!("page {page_num}: {:?}", e)))?;

            let raster = bitmap.as_image();
            let path = pattern.path_for(page_num);
            raster
                .to_rgb8()
                .save_with_format(&path, image::ImageFormat::Jpeg)
                .map_err(|e| EngineError::Failed(format!("{}: {e}", path.display())))?;

            debug!(
                "Rasterised page {} → {}x{} px",
                page_num,
                raster.width(),
                raster.height()
            );
            written.push(path);
        }

        Ok(written)
    }
}

impl FormExtractor for PdfiumEngine {
    fn extract(&self, document: &Path) -> Result<PriorState, EngineError> {
        let pdfium = self.pdfium()?;
        let doc = load(&pdfium, document)?;
        let mut prior = PriorState::default();

        for (idx, page) in doc.pages().iter().enumerate() {
            for annotation in page.annotations().iter() {
                if let Some(text) = annotation.contents() {
                    if !text.trim().is_empty() {
                        prior.comments.push(Comment {
                            page: idx + 1,
                            text,
                        });
                    }
                }
            }
        }

        if let Some(form) = doc.form() {
            for (name, value) in form.field_values(doc.pages()) {
                if let Some(value) = value {
                    prior.fields.insert(name, value);
                }
            }
        }

        Ok(prior)
    }
}

impl OverlayRenderer for PdfiumEngine {
    fn render(
        &self,
        contents: &SpreadContents,
        rubric: &[PaperStructure],
    ) -> Result<(), EngineError> {
        let raster = image::open(&contents.previous_image_path).map_err(|e| {
            EngineError::Failed(format!("{}: {e}", contents.previous_image_path.display()))
        })?;

        let lines = header_lines(contents, rubric);
        let scale = PAGE_WIDTH_PT / raster.width().max(1) as f32;
        let image_height = raster.height() as f32 * scale;
        let header_height = HEADER_MARGIN_PT * 2.0 + HEADER_LINE_PT * lines.len() as f32;
        let fail = |e: PdfiumError| EngineError::Failed(format!("{:?}", e));

        let pdfium = self.pdfium()?;
        let mut doc = pdfium.create_new_pdf().map_err(fail)?;
        let font = doc.fonts_mut().helvetica();

        {
            let mut page = doc
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::Custom(
                    PdfPoints::new(PAGE_WIDTH_PT),
                    PdfPoints::new(image_height + header_height),
                ))
                .map_err(fail)?;

            page.objects_mut()
                .create_image_object(
                    PdfPoints::ZERO,
                    PdfPoints::ZERO,
                    &raster,
                    Some(PdfPoints::new(PAGE_WIDTH_PT)),
                    Some(PdfPoints::new(image_height)),
                )
                .map_err(fail)?;

            let top = image_height + header_height - HEADER_MARGIN_PT;
            for (i, line) in lines.iter().enumerate() {
                page.objects_mut()
                    .create_text_object(
                        PdfPoints::new(HEADER_MARGIN_PT),
                        PdfPoints::new(top - HEADER_LINE_PT * (i + 1) as f32),
                        line,
                        font,
                        PdfPoints::new(HEADER_FONT_PT),
                    )
                    .map_err(fail)?;
            }
        }

        doc.save_to_file(&contents.page_output_path).map_err(fail)?;
        debug!(
            "Rendered {} page {} → {}",
            contents.spread_name,
            contents.page_index,
            contents.page_output_path.display()
        );
        Ok(())
    }
}

impl DocumentMerger for PdfiumEngine {
    fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        let fail = |e: PdfiumError| EngineError::Failed(format!("{:?}", e));
        let pdfium = self.pdfium()?;
        let mut merged = pdfium.create_new_pdf().map_err(fail)?;

        for path in pages {
            let page_doc = load(&pdfium, path)?;
            merged.pages_mut().append(&page_doc).map_err(fail)?;
        }

        merged.save_to_file(output).map_err(fail)
    }
}

/// Header text for one overlay page.
fn header_lines(contents: &SpreadContents, rubric: &[PaperStructure]) -> Vec<String> {
    let meta = &contents.metadata;
    let mut lines = vec![
        format!("{}  {}", meta.course_code, meta.exam_diet),
        format!("Candidate: {}    Marker: {}", meta.candidate, meta.marker),
        format!("{} / page {}", contents.spread_name, contents.page_index),
    ];

    if contents.page_index == 1 {
        if !rubric.is_empty() {
            let parts: Vec<String> = rubric
                .iter()
                .map(|p| format!("{} ({})", p.part, p.marks))
                .collect();
            lines.push(format!(
                "Parts: {}  Total: {}",
                parts.join(", "),
                total_marks(rubric)
            ));
        }
        if !contents.prefills.is_empty() {
            let fields: Vec<String> = contents
                .prefills
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            lines.push(format!("Carried forward: {}", fields.join("; ")));
        }
    }

    lines
}
