//! Core types for PDF page rendering

use serde::Serialize;

/// Intrinsic (unscaled) page size in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Page pixel dimensions at a given scale factor.
///
/// Raster, text and annotation layers of one render pass all share the same
/// viewport value, so glyph boxes and link regions line up with the image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    /// Viewport of a page of the given intrinsic size at `scale`
    #[must_use]
    pub fn for_page(page: PageSize, scale: f32) -> Self {
        Self {
            width: page.width * scale,
            height: page.height * scale,
            scale,
        }
    }

    /// Width over height
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            f32::INFINITY
        }
    }

    /// Raster surface size in whole pixels
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(0.0) as u32,
            self.height.round().max(0.0) as u32,
        )
    }

    /// Map a rectangle in page points to pixel coordinates
    #[must_use]
    pub fn to_pixels(&self, rect: PageRect) -> PixelRect {
        let x0 = rect.x0.min(rect.x1) * self.scale;
        let y0 = rect.y0.min(rect.y1) * self.scale;
        let x1 = rect.x0.max(rect.x1) * self.scale;
        let y1 = rect.y0.max(rect.y1) * self.scale;
        PixelRect {
            x: x0.max(0.0),
            y: y0.max(0.0),
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }
}

/// Rectangle in page points, top-left origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageRect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x0 == self.x1 || self.y0 == self.y1
    }
}

/// Absolutely positioned rectangle in viewport pixels
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Client size of the element that hosts the viewer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContainerSize {
    pub client_width: u32,
    pub client_height: u32,
}

impl ContainerSize {
    #[must_use]
    pub const fn new(client_width: u32, client_height: u32) -> Self {
        Self {
            client_width,
            client_height,
        }
    }
}

/// Pixel buffer the page is rasterized into.
///
/// RGB, 3 bytes per pixel, rows packed without padding.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RasterSurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterSurface {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Blank (white) surface sized to exactly the viewport's pixel dimensions
    #[must_use]
    pub fn sized_for(viewport: &Viewport) -> Self {
        let (width, height) = viewport.pixel_size();
        Self {
            width,
            height,
            pixels: vec![0xFF; width as usize * height as usize * Self::BYTES_PER_PIXEL],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Replace the surface contents with packed RGB rows of the same size
    pub fn fill_from_rgb(&mut self, width: u32, height: u32, rgb: Vec<u8>) -> bool {
        if width != self.width
            || height != self.height
            || rgb.len() != width as usize * height as usize * Self::BYTES_PER_PIXEL
        {
            return false;
        }
        self.pixels = rgb;
        true
    }
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels_len", &self.pixels.len())
            .finish()
    }
}

/// Selectable text element of the text layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextSpan {
    pub text: String,
    pub rect: PixelRect,
    /// Font size in pixels at the viewport scale
    pub font_size: f32,
}

/// What a clicked annotation region does
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkAction {
    /// Jump to a page of the same document (1-based)
    GoToPage { page: usize },
    /// Open an external URI in the given window context
    OpenUri { uri: String, target: String },
}

/// Clickable region of the annotation layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationRegion {
    pub rect: PixelRect,
    pub action: LinkAction,
}

/// The single overlay container shared by the text and annotation layers.
///
/// Both layers are positioned in the same pixel space; splitting them into
/// separate containers would let them drift apart.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OverlayLayer {
    pub width: f32,
    pub height: f32,
    pub text: Vec<TextSpan>,
    pub annotations: Vec<AnnotationRegion>,
}

impl OverlayLayer {
    /// Drop all layer content and resize to the viewport
    pub fn clear(&mut self, viewport: &Viewport) {
        self.width = viewport.width;
        self.height = viewport.height;
        self.text.clear();
        self.annotations.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.annotations.is_empty()
    }
}

/// Complete result of one render pass
#[derive(Clone)]
pub struct RenderedPage {
    /// Page number (1-based)
    pub page: usize,
    /// Scale factor the layers were produced at
    pub scale: f32,
    pub viewport: Viewport,
    pub raster: RasterSurface,
    pub overlay: OverlayLayer,
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("viewport", &self.viewport)
            .field("raster", &self.raster)
            .field("text_spans", &self.overlay.text.len())
            .field("annotations", &self.overlay.annotations.len())
            .finish_non_exhaustive()
    }
}

/// The three visual surfaces handed to the host for presentation
#[derive(Clone, Debug, Default)]
pub struct Surfaces {
    /// Page shown by the surfaces, if any render completed yet
    pub page: Option<usize>,
    pub raster: RasterSurface,
    pub overlay: OverlayLayer,
}

impl Surfaces {
    /// Swap in the layers of a finished render
    pub fn present(&mut self, rendered: RenderedPage) {
        self.page = Some(rendered.page);
        self.raster = rendered.raster;
        self.overlay = rendered.overlay;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_scales_intrinsic_size() {
        let vp = Viewport::for_page(PageSize::new(612.0, 792.0), 1.5);
        assert_eq!(vp.width, 918.0);
        assert_eq!(vp.height, 1188.0);
        assert_eq!(vp.pixel_size(), (918, 1188));
    }

    #[test]
    fn to_pixels_normalizes_flipped_rects() {
        let vp = Viewport::for_page(PageSize::new(100.0, 100.0), 2.0);
        let px = vp.to_pixels(PageRect::new(30.0, 40.0, 10.0, 20.0));
        assert_eq!(
            px,
            PixelRect {
                x: 20.0,
                y: 40.0,
                width: 40.0,
                height: 40.0
            }
        );
    }

    #[test]
    fn raster_surface_matches_viewport_pixels() {
        let vp = Viewport::for_page(PageSize::new(10.0, 4.0), 1.0);
        let surface = RasterSurface::sized_for(&vp);
        assert_eq!((surface.width, surface.height), (10, 4));
        assert_eq!(surface.pixels.len(), 10 * 4 * 3);
    }

    #[test]
    fn fill_from_rgb_rejects_mismatched_buffers() {
        let vp = Viewport::for_page(PageSize::new(2.0, 2.0), 1.0);
        let mut surface = RasterSurface::sized_for(&vp);
        assert!(!surface.fill_from_rgb(3, 2, vec![0; 18]));
        assert!(surface.fill_from_rgb(2, 2, vec![0; 12]));
        assert!(surface.pixels.iter().all(|&b| b == 0));
    }

    #[test]
    fn overlay_clear_resizes_and_empties() {
        let mut overlay = OverlayLayer::default();
        overlay.text.push(TextSpan {
            text: "stale".into(),
            rect: PixelRect {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            font_size: 12.0,
        });
        overlay.clear(&Viewport::for_page(PageSize::new(50.0, 70.0), 2.0));
        assert!(overlay.is_empty());
        assert_eq!((overlay.width, overlay.height), (100.0, 140.0));
    }
}
