//! Fake engines for integration tests.
//!
//! Input "PDFs" are JSON [`FakeDoc`]s. The fake renderer writes each page as
//! JSON and the fake merger writes a new `FakeDoc`, so a merged output can
//! be fed straight back in as the input of another pass. Nothing written
//! contains an absolute path, so outputs from different temp dirs compare
//! byte for byte.

#![allow(dead_code)]

use gradex_batch::{
    BatchConfig, BatchConfigBuilder, Comment, DocumentMerger, EngineError, Engines,
    FormExtractor, OverlayRenderer, PageCounter, PaperStructure, PriorState, RasterPattern,
    Rasterizer, SpreadContents,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FakeDoc {
    pub pages: usize,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Stage that reports failure: `probe`, `extract` or `rasterize`.
    /// Render failures are keyed on the file name instead (`…failN.pdf`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_at: Option<String>,
    /// Stage that blocks for two seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hang_at: Option<String>,
    /// Page the rasteriser silently leaves out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_raster: Option<usize>,
    /// Pages of a merged output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rendered: Vec<RenderedPage>,
}

impl FakeDoc {
    pub fn pages(pages: usize) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, stage: &str) -> Self {
        self.fail_at = Some(stage.to_string());
        self
    }

    pub fn hanging_at(mut self, stage: &str) -> Self {
        self.hang_at = Some(stage.to_string());
        self
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

/// What the fake renderer writes for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPage {
    pub page: usize,
    pub candidate: String,
    pub course: String,
    pub marker: String,
    pub spread: String,
    /// Contents of the raster the page was built from.
    pub raster: String,
    pub prefills: BTreeMap<String, String>,
    pub comments: usize,
    pub rubric_parts: usize,
}

#[derive(Default)]
pub struct FakeEngine {
    pub contexts: Mutex<Vec<SpreadContents>>,
    pub render_calls: AtomicUsize,
    pub rasterize_calls: AtomicUsize,
    active: AtomicUsize,
    pub peak_active: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn engines(self: &Arc<Self>) -> Engines {
        Engines::from_backend(Arc::clone(self))
    }

    pub fn contexts_for(&self, candidate: &str) -> Vec<SpreadContents> {
        let mut found: Vec<SpreadContents> = self
            .contexts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.metadata.candidate == candidate)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.page_index);
        found
    }

    fn load(path: &Path) -> Result<FakeDoc, EngineError> {
        let bytes = std::fs::read(path).map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::Load {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn load_for(path: &Path, stage: &str) -> Result<FakeDoc, EngineError> {
        let doc = Self::load(path)?;
        if doc.hang_at.as_deref() == Some(stage) {
            std::thread::sleep(Duration::from_secs(2));
        }
        if doc.fail_at.as_deref() == Some(stage) {
            return Err(EngineError::Failed(format!("injected {stage} failure")));
        }
        Ok(doc)
    }

    fn write_rasters(document: &Path, pattern: &RasterPattern) -> Result<Vec<PathBuf>, EngineError> {
        let doc = Self::load_for(document, "rasterize")?;
        // Give overlapping jobs a chance to overlap.
        std::thread::sleep(Duration::from_millis(5));
        let mut written = Vec::new();
        for page in 1..=doc.pages {
            if doc.drop_raster == Some(page) {
                continue;
            }
            let path = pattern.path_for(page);
            Self::write(&path, format!("{} page {}", pattern.stem, page).as_bytes())?;
            written.push(path);
        }
        Ok(written)
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
        std::fs::write(path, bytes).map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl PageCounter for FakeEngine {
    fn page_count(&self, document: &Path) -> Result<usize, EngineError> {
        Ok(Self::load_for(document, "probe")?.pages)
    }
}

impl Rasterizer for FakeEngine {
    fn rasterize(
        &self,
        document: &Path,
        pattern: &RasterPattern,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        self.rasterize_calls.fetch_add(1, Ordering::SeqCst);

        let result = Self::write_rasters(document, pattern);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FormExtractor for FakeEngine {
    fn extract(&self, document: &Path) -> Result<PriorState, EngineError> {
        let doc = Self::load_for(document, "extract")?;
        Ok(PriorState {
            comments: doc.comments,
            fields: doc.fields,
        })
    }
}

impl OverlayRenderer for FakeEngine {
    fn render(
        &self,
        contents: &SpreadContents,
        rubric: &[PaperStructure],
    ) -> Result<(), EngineError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(contents.clone());

        // The renderer never sees the input document, so render failures
        // are keyed on the candidate name.
        if contents
            .metadata
            .candidate
            .ends_with(&format!("fail{}", contents.page_index))
        {
            return Err(EngineError::Failed(format!(
                "layout broken on page {}",
                contents.page_index
            )));
        }

        let raster = std::fs::read_to_string(&contents.previous_image_path).map_err(|e| {
            EngineError::Io {
                path: contents.previous_image_path.clone(),
                source: e,
            }
        })?;
        let page = RenderedPage {
            page: contents.page_index,
            candidate: contents.metadata.candidate.clone(),
            course: contents.metadata.course_code.clone(),
            marker: contents.metadata.marker.clone(),
            spread: contents.spread_name.clone(),
            raster,
            prefills: contents.prefills.clone(),
            comments: contents.comments.len(),
            rubric_parts: rubric.len(),
        };
        let bytes = serde_json::to_vec_pretty(&page)
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        Self::write(&contents.page_output_path, &bytes)
    }
}

impl DocumentMerger for FakeEngine {
    fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        let mut rendered = Vec::with_capacity(pages.len());
        for path in pages {
            let bytes = std::fs::read(path).map_err(|e| EngineError::Io {
                path: path.clone(),
                source: e,
            })?;
            let page: RenderedPage = serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::Load {
                    path: path.clone(),
                    detail: e.to_string(),
                }
            })?;
            rendered.push(page);
        }

        // Saved fields: whatever page 1 was pre-filled with, plus the
        // candidate box of the spread that was just applied.
        let mut fields = BTreeMap::new();
        if let Some(first) = rendered.first() {
            fields.extend(first.prefills.clone());
            fields.insert(format!("{}.candidate", first.spread), first.candidate.clone());
        }
        let merged = FakeDoc {
            pages: rendered.len(),
            fields,
            rendered,
            ..FakeDoc::default()
        };
        let bytes = serde_json::to_vec_pretty(&merged)
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        Self::write(output, &bytes)
    }
}

// ── Fixture helpers ──────────────────────────────────────────────────────

pub fn write_doc(dir: &Path, name: &str, doc: &FakeDoc) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), serde_json::to_vec_pretty(doc).unwrap()).unwrap();
}

pub fn read_doc(path: &Path) -> FakeDoc {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Builder wired to `engine` with a short timeout.
pub fn builder(input: &Path, output: &Path, engine: &Arc<FakeEngine>) -> BatchConfigBuilder {
    BatchConfig::builder()
        .input_dir(input)
        .output_dir(output)
        .course_code("MATH10001")
        .marker("ABC")
        .engine_timeout(Duration::from_secs(10))
        .engines(engine.engines())
}

/// Every file under `root` (relative path → bytes).
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
