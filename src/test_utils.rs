//! Scripted in-memory document engine for tests
//!
//! The engine is moved onto the render worker thread, so tests steer it
//! through a cloned [`ScriptHandle`]: inject open/render failures, hold
//! renders at the raster stage, and read back the call log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flume::{Receiver, Sender};

use crate::pdf::{
    CancelToken, DocumentEngine, DocumentSource, EngineDocument, EngineError, EnginePage,
    LinkAnnotation, LinkDestination, PageRect, PageSize, RasterSurface, RequestId, TextContent,
    TextItem, Viewport, check_page_index,
};

/// How long a held render waits for a permit before giving up
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Page description for the scripted engine
#[derive(Clone, Debug)]
pub struct ScriptedPage {
    pub size: PageSize,
    pub text: Vec<TextItem>,
    pub links: Vec<LinkAnnotation>,
}

impl ScriptedPage {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: PageSize::new(width, height),
            text: Vec::new(),
            links: Vec::new(),
        }
    }

    /// US Letter, 612x792 points
    #[must_use]
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// Add a line of text one inch from the top-left corner, below any
    /// existing lines
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        let top = 72.0 + self.text.len() as f32 * 14.0;
        self.text.push(TextItem {
            text: text.to_string(),
            bounds: PageRect::new(72.0, top, 72.0 + 6.0 * text.len() as f32, top + 12.0),
            font_size: 12.0,
        });
        self
    }

    #[must_use]
    pub fn with_link_to_page(mut self, page: usize) -> Self {
        self.links.push(LinkAnnotation {
            bounds: PageRect::new(72.0, 200.0, 172.0, 212.0),
            dest: LinkDestination::Internal { page },
        });
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: &str) -> Self {
        self.links.push(LinkAnnotation {
            bounds: PageRect::new(72.0, 220.0, 172.0, 232.0),
            dest: LinkDestination::External {
                uri: uri.to_string(),
            },
        });
        self
    }
}

#[derive(Default)]
struct ScriptState {
    calls: Vec<String>,
    fail_open: bool,
    failing_renders: usize,
    gate: Option<Receiver<()>>,
    cancel_during_rasterize: bool,
    attached_cancel: Option<(CancelToken, RequestId)>,
}

/// Test-side handle controlling a [`ScriptedEngine`]
#[derive(Clone, Default)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    /// Engine calls so far, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make every subsequent open fail
    pub fn fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Make the next `count` rasterize calls fail
    pub fn fail_renders(&self, count: usize) {
        self.lock().failing_renders = count;
    }

    /// Block rasterization until the returned gate hands out a permit
    #[must_use]
    pub fn hold_renders(&self) -> RenderGate {
        let (tx, rx) = flume::unbounded();
        self.lock().gate = Some(rx);
        RenderGate { tx }
    }

    /// Cancel the attached request while it is rasterizing
    pub fn cancel_during_rasterize(&self, enabled: bool) {
        self.lock().cancel_during_rasterize = enabled;
    }

    pub fn attach_cancel(&self, token: CancelToken, id: RequestId) {
        self.lock().attached_cancel = Some((token, id));
    }
}

/// Permits for held renders
pub struct RenderGate {
    tx: Sender<()>,
}

impl RenderGate {
    /// Let one held render continue
    pub fn release_one(&self) {
        let _ = self.tx.send(());
    }

    /// Let `count` held renders continue
    pub fn release(&self, count: usize) {
        for _ in 0..count {
            self.release_one();
        }
    }
}

/// Document engine serving scripted pages for any source
pub struct ScriptedEngine {
    fallback: Option<Vec<ScriptedPage>>,
    documents: HashMap<String, Vec<ScriptedPage>>,
    script: ScriptHandle,
}

impl ScriptedEngine {
    /// Engine that opens every source as a document with these pages
    #[must_use]
    pub fn with_pages(pages: Vec<ScriptedPage>) -> Self {
        Self {
            fallback: Some(pages),
            documents: HashMap::new(),
            script: ScriptHandle::default(),
        }
    }

    /// Engine with `count` letter-sized pages, each carrying a line of text
    #[must_use]
    pub fn with_page_count(count: usize) -> Self {
        Self::with_pages(
            (1..=count)
                .map(|n| ScriptedPage::letter().with_text(&format!("Page {n}")))
                .collect(),
        )
    }

    /// Engine that only knows explicitly registered sources
    #[must_use]
    pub fn empty() -> Self {
        Self {
            fallback: None,
            documents: HashMap::new(),
            script: ScriptHandle::default(),
        }
    }

    /// Register pages served for the source with this label
    #[must_use]
    pub fn with_document(mut self, label: &str, pages: Vec<ScriptedPage>) -> Self {
        self.documents.insert(label.to_string(), pages);
        self
    }

    #[must_use]
    pub fn script(&self) -> ScriptHandle {
        self.script.clone()
    }

    /// Path source with the given label
    #[must_use]
    pub fn source(label: &str) -> DocumentSource {
        DocumentSource::from_path(label)
    }
}

impl DocumentEngine for ScriptedEngine {
    fn open(&mut self, source: &DocumentSource) -> Result<Box<dyn EngineDocument>, EngineError> {
        let label = source.label();
        self.script.record(format!("open {label}"));

        if self.script.lock().fail_open {
            return Err(EngineError::Load {
                source_label: label,
                detail: "scripted open failure".into(),
            });
        }

        let pages = self
            .documents
            .get(&label)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| EngineError::Load {
                source_label: label.clone(),
                detail: "unknown scripted source".into(),
            })?;

        Ok(Box::new(ScriptedDocument {
            pages,
            script: self.script.clone(),
        }))
    }
}

struct ScriptedDocument {
    pages: Vec<ScriptedPage>,
    script: ScriptHandle,
}

impl EngineDocument for ScriptedDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<Box<dyn EnginePage + '_>, EngineError> {
        check_page_index(index, self.pages.len())?;
        self.script.record(format!("page {index}"));
        Ok(Box::new(ScriptedPageRef {
            index,
            page: &self.pages[index - 1],
            script: &self.script,
        }))
    }
}

struct ScriptedPageRef<'a> {
    index: usize,
    page: &'a ScriptedPage,
    script: &'a ScriptHandle,
}

impl EnginePage for ScriptedPageRef<'_> {
    fn size(&self) -> PageSize {
        self.page.size
    }

    fn rasterize(
        &self,
        surface: &mut RasterSurface,
        _viewport: &Viewport,
    ) -> Result<(), EngineError> {
        self.script.record(format!("rasterize {}", self.index));

        let gate = self.script.lock().gate.clone();
        if let Some(gate) = gate {
            if gate.recv_timeout(GATE_TIMEOUT).is_err() {
                return Err(EngineError::Render("render gate timed out".into()));
            }
        }

        {
            let mut state = self.script.lock();
            if state.cancel_during_rasterize {
                if let Some((token, id)) = &state.attached_cancel {
                    token.cancel(*id);
                }
            }
            if state.failing_renders > 0 {
                state.failing_renders -= 1;
                return Err(EngineError::Render(format!(
                    "scripted failure on page {}",
                    self.index
                )));
            }
        }

        surface.pixels.fill(self.index as u8);
        Ok(())
    }

    fn extract_text(&self) -> Result<TextContent, EngineError> {
        self.script.record(format!("text {}", self.index));
        Ok(TextContent {
            items: self.page.text.clone(),
        })
    }

    fn extract_annotations(&self) -> Result<Vec<LinkAnnotation>, EngineError> {
        self.script.record(format!("annotations {}", self.index));
        Ok(self.page.links.clone())
    }
}
