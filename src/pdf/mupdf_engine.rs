//! mupdf-backed document engine

use mupdf::text_page::TextBlockType;
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap, TextPageFlags};

use super::engine::{
    DocumentEngine, DocumentSource, EngineDocument, EngineError, EnginePage, LinkAnnotation,
    LinkDestination, TextContent, TextItem, check_page_index,
};
use super::types::{PageRect, PageSize, RasterSurface, Viewport};

const PDF_MIME: &str = "application/pdf";

/// Opens documents with mupdf. Holds no state; documents live on the
/// worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfEngine;

impl MupdfEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DocumentEngine for MupdfEngine {
    fn open(&mut self, source: &DocumentSource) -> Result<Box<dyn EngineDocument>, EngineError> {
        let load_error = |e: mupdf::error::Error| EngineError::Load {
            source_label: source.label(),
            detail: e.to_string(),
        };

        let doc = match source {
            DocumentSource::Path(path) => Document::open(path.to_string_lossy().as_ref()),
            DocumentSource::Bytes { data, .. } => Document::from_bytes(data.as_slice(), PDF_MIME),
        }
        .map_err(load_error)?;

        let page_count = doc.page_count().map_err(load_error)?;
        Ok(Box::new(MupdfDocument {
            doc,
            page_count: usize::try_from(page_count).unwrap_or(0),
        }))
    }
}

struct MupdfDocument {
    doc: Document,
    page_count: usize,
}

impl EngineDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, index: usize) -> Result<Box<dyn EnginePage + '_>, EngineError> {
        check_page_index(index, self.page_count)?;
        let page = self
            .doc
            .load_page((index - 1) as i32)
            .map_err(|e| EngineError::Render(format!("load page {index}: {e}")))?;
        let bounds = page
            .bounds()
            .map_err(|e| EngineError::Render(format!("page {index} bounds: {e}")))?;
        Ok(Box::new(MupdfPage {
            page,
            origin: (bounds.x0, bounds.y0),
            size: PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0),
        }))
    }
}

struct MupdfPage {
    page: Page,
    /// Top-left of the page box; text and link coordinates are shifted by it
    origin: (f32, f32),
    size: PageSize,
}

impl MupdfPage {
    fn to_page_rect(&self, rect: mupdf::Rect) -> PageRect {
        let (ox, oy) = self.origin;
        PageRect::new(rect.x0 - ox, rect.y0 - oy, rect.x1 - ox, rect.y1 - oy)
    }
}

impl EnginePage for MupdfPage {
    fn size(&self) -> PageSize {
        self.size
    }

    fn rasterize(
        &self,
        surface: &mut RasterSurface,
        viewport: &Viewport,
    ) -> Result<(), EngineError> {
        let transform = Matrix::new_scale(viewport.scale, viewport.scale);
        let pixmap = self
            .page
            .to_pixmap(&transform, &Colorspace::device_rgb(), false, false)
            .map_err(|e| EngineError::Render(e.to_string()))?;
        let rgb = pixmap_to_rgb(&pixmap)?;
        blit_rgb(surface, pixmap.width(), pixmap.height(), rgb);
        Ok(())
    }

    fn extract_text(&self) -> Result<TextContent, EngineError> {
        let text_page = self
            .page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| EngineError::Text(e.to_string()))?;

        let mut items = Vec::new();
        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            for line in block.lines() {
                let mut text = String::new();
                let mut font_size: f32 = 0.0;
                for ch in line.chars() {
                    if let Some(c) = ch.char() {
                        text.push(c);
                    }
                    let size = ch.size();
                    if size.is_finite() {
                        font_size = font_size.max(size);
                    }
                }
                if text.is_empty() {
                    continue;
                }
                let bounds = self.to_page_rect(line.bounds());
                if font_size <= 0.0 {
                    font_size = (bounds.y1 - bounds.y0).abs();
                }
                items.push(TextItem {
                    text,
                    bounds,
                    font_size,
                });
            }
        }
        Ok(TextContent { items })
    }

    fn extract_annotations(&self) -> Result<Vec<LinkAnnotation>, EngineError> {
        let links = self
            .page
            .links()
            .map_err(|e| EngineError::Annotations(e.to_string()))?;

        Ok(links
            .filter_map(|link| {
                if link.bounds.is_empty() {
                    return None;
                }
                let dest = if let Some(dest) = link.dest {
                    // mupdf destinations are 0-based
                    LinkDestination::Internal {
                        page: dest.loc.page_number as usize + 1,
                    }
                } else if !link.uri.is_empty() {
                    LinkDestination::External {
                        uri: link.uri.clone(),
                    }
                } else {
                    return None;
                };
                Some(LinkAnnotation {
                    bounds: self.to_page_rect(link.bounds),
                    dest,
                })
            })
            .collect())
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, EngineError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::Render(format!(
            "unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(EngineError::Render("pixmap buffer size mismatch".into()));
    }

    let mut out = Vec::with_capacity(width * height * RasterSurface::BYTES_PER_PIXEL);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }
    Ok(out)
}

/// Copy packed RGB rows into the surface. mupdf may round the pixmap one
/// pixel off the viewport size; the overlapping area is copied and the rest
/// stays white.
fn blit_rgb(surface: &mut RasterSurface, width: u32, height: u32, rgb: Vec<u8>) {
    if width == surface.width && height == surface.height {
        surface.fill_from_rgb(width, height, rgb);
        return;
    }
    let bpp = RasterSurface::BYTES_PER_PIXEL;
    let copy_w = width.min(surface.width) as usize * bpp;
    let copy_h = height.min(surface.height) as usize;
    let src_stride = width as usize * bpp;
    let dst_stride = surface.width as usize * bpp;
    for y in 0..copy_h {
        let src = &rgb[y * src_stride..y * src_stride + copy_w];
        surface.pixels[y * dst_stride..y * dst_stride + copy_w].copy_from_slice(src);
    }
}
