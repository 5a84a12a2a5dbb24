//! Document engine seam
//!
//! The viewer never parses or rasterizes PDF data itself. It sequences calls
//! to an engine that opens a source, hands out pages, and answers geometry,
//! raster, text and link queries. The mupdf adapter lives in
//! `mupdf_engine`; tests use the scripted engine from `test_utils`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::types::{PageRect, PageSize, RasterSurface, Viewport};

/// Where a document comes from
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// File on disk (or a remote reference the host already resolved to a file)
    Path(PathBuf),
    /// In-memory document content, e.g. from the upload collaborator
    Bytes {
        name: Option<String>,
        data: Arc<Vec<u8>>,
    },
}

impl DocumentSource {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn from_bytes(name: Option<String>, data: Vec<u8>) -> Self {
        Self::Bytes {
            name,
            data: Arc::new(data),
        }
    }

    /// Human readable label used in logs and as the download file name
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { name: Some(name), .. } => name.clone(),
            Self::Bytes { name: None, data } => format!("<{} bytes>", data.len()),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes { name, data } => f
                .debug_struct("Bytes")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Errors reported by a document engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to open document {source_label}: {detail}")]
    Load {
        source_label: String,
        detail: String,
    },

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("rasterization failed: {0}")]
    Render(String),

    #[error("text extraction failed: {0}")]
    Text(String),

    #[error("annotation extraction failed: {0}")]
    Annotations(String),
}

/// One run of text in page points
#[derive(Clone, Debug, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub bounds: PageRect,
    pub font_size: f32,
}

/// Text content of a page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextContent {
    pub items: Vec<TextItem>,
}

/// Destination of a link annotation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkDestination {
    /// Page of the same document (1-based)
    Internal { page: usize },
    /// External URI
    External { uri: String },
}

/// Link annotation in page points
#[derive(Clone, Debug, PartialEq)]
pub struct LinkAnnotation {
    pub bounds: PageRect,
    pub dest: LinkDestination,
}

/// Opens documents. Moved onto the render worker thread, so it must be `Send`.
pub trait DocumentEngine: Send + 'static {
    fn open(&mut self, source: &DocumentSource) -> Result<Box<dyn EngineDocument>, EngineError>;
}

/// An opened document. Only ever touched from the worker thread.
pub trait EngineDocument {
    fn page_count(&self) -> usize;

    /// Fetch a page by 1-based index
    fn page(&self, index: usize) -> Result<Box<dyn EnginePage + '_>, EngineError>;
}

/// A fetched page
pub trait EnginePage {
    /// Unscaled page size in points
    fn size(&self) -> PageSize;

    /// Page viewport at `scale`
    fn intrinsic_viewport(&self, scale: f32) -> Viewport {
        Viewport::for_page(self.size(), scale)
    }

    /// Draw the page into `surface`, which is already sized to `viewport`
    fn rasterize(&self, surface: &mut RasterSurface, viewport: &Viewport)
    -> Result<(), EngineError>;

    fn extract_text(&self) -> Result<TextContent, EngineError>;

    fn extract_annotations(&self) -> Result<Vec<LinkAnnotation>, EngineError>;
}

/// Validate a 1-based index against the page count
pub fn check_page_index(index: usize, page_count: usize) -> Result<(), EngineError> {
    if index == 0 || index > page_count {
        Err(EngineError::PageOutOfRange {
            page: index,
            page_count,
        })
    } else {
        Ok(())
    }
}
