//! Staged page render
//!
//! Runs fetch → scale → raster → text layer → annotation layer for one page.
//! Every stage uses the viewport resolved in the scale stage, and the text and
//! annotation layers are written into one overlay. The cancellation token is
//! checked before each stage; an aborted render returns no layers at all, so
//! the host never sees a half-written overlay.

use super::engine::{EngineDocument, LinkAnnotation, TextContent};
use super::link_service::LinkService;
use super::request::{CancelToken, RenderFault, RenderParams, RenderStage, RequestId};
use super::scale::resolve_scale;
use super::types::{OverlayLayer, RasterSurface, RenderedPage, TextSpan, Viewport};

/// Result of a render attempt that did not fail
#[derive(Debug)]
pub enum RenderOutcome {
    Rendered(RenderedPage),
    Cancelled(RenderStage),
}

macro_rules! checkpoint {
    ($cancel:expr, $id:expr, $stage:expr) => {
        if $cancel.is_cancelled($id) {
            log::debug!("Render {:?} superseded before {:?}", $id, $stage);
            return Ok(RenderOutcome::Cancelled($stage));
        }
    };
}

/// Render a single page
pub fn render_page(
    doc: &dyn EngineDocument,
    id: RequestId,
    params: &RenderParams,
    cancel: &CancelToken,
) -> Result<RenderOutcome, RenderFault> {
    checkpoint!(cancel, id, RenderStage::FetchPage);
    let page = doc.page(params.page)?;

    checkpoint!(cancel, id, RenderStage::ResolveScale);
    let previous = page.intrinsic_viewport(params.previous_scale);
    let resolution = resolve_scale(&previous, params.container, params.mode);
    let viewport = page.intrinsic_viewport(resolution.scale);
    log::trace!(
        "Page {} scale {:.4} -> {:.4} ({:?}), viewport {}x{}",
        params.page,
        params.previous_scale,
        resolution.scale,
        resolution.axis,
        viewport.width,
        viewport.height
    );
    let mut raster = RasterSurface::sized_for(&viewport);

    checkpoint!(cancel, id, RenderStage::Rasterize);
    page.rasterize(&mut raster, &viewport)?;

    checkpoint!(cancel, id, RenderStage::TextLayer);
    let text = page.extract_text()?;
    let mut overlay = OverlayLayer::default();
    overlay.clear(&viewport);
    render_text_layer(&mut overlay, &text, &viewport);

    checkpoint!(cancel, id, RenderStage::AnnotationLayer);
    let link_service = LinkService::new(params.link_target, doc.page_count());
    let links = page.extract_annotations()?;
    render_annotation_layer(&mut overlay, &links, &viewport, &link_service);

    Ok(RenderOutcome::Rendered(RenderedPage {
        page: params.page,
        scale: resolution.scale,
        viewport,
        raster,
        overlay,
    }))
}

/// Position text runs over the raster in viewport pixels
pub fn render_text_layer(overlay: &mut OverlayLayer, text: &TextContent, viewport: &Viewport) {
    overlay.text.extend(
        text.items
            .iter()
            .filter(|item| !item.text.trim().is_empty())
            .map(|item| TextSpan {
                text: item.text.clone(),
                rect: viewport.to_pixels(item.bounds),
                font_size: item.font_size * viewport.scale,
            }),
    );
}

/// Add link regions to the overlay that already holds the text layer
pub fn render_annotation_layer(
    overlay: &mut OverlayLayer,
    links: &[LinkAnnotation],
    viewport: &Viewport,
    link_service: &LinkService,
) {
    overlay
        .annotations
        .extend(links.iter().filter_map(|link| link_service.resolve(link, viewport)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::engine::DocumentEngine;
    use crate::pdf::link_service::ExternalLinkTarget;
    use crate::pdf::scale::DisplayMode;
    use crate::pdf::types::{ContainerSize, LinkAction};
    use crate::test_utils::{ScriptedEngine, ScriptedPage};

    fn params(page: usize, container: (u32, u32)) -> RenderParams {
        RenderParams {
            page,
            previous_scale: 1.0,
            container: ContainerSize::new(container.0, container.1),
            mode: DisplayMode::Normal,
            link_target: ExternalLinkTarget::Blank,
        }
    }

    fn open(engine: &mut ScriptedEngine) -> Box<dyn EngineDocument> {
        engine
            .open(&ScriptedEngine::source("doc.pdf"))
            .expect("scripted document opens")
    }

    #[test]
    fn stages_run_in_order_with_one_viewport() {
        let mut engine = ScriptedEngine::with_pages(vec![
            ScriptedPage::letter().with_text("Hello").with_link_to_page(2),
            ScriptedPage::letter(),
        ]);
        let script = engine.script();
        let doc = open(&mut engine);

        let outcome = render_page(
            doc.as_ref(),
            RequestId::new(1),
            &params(1, (1224, 900)),
            &CancelToken::new(),
        )
        .expect("render succeeds");
        let RenderOutcome::Rendered(page) = outcome else {
            panic!("expected rendered page");
        };

        assert_eq!(
            script.calls(),
            vec!["open doc.pdf", "page 1", "rasterize 1", "text 1", "annotations 1"]
        );
        assert!((page.scale - 2.0).abs() < 1e-6);
        assert_eq!((page.raster.width, page.raster.height), (1224, 1584));
        assert_eq!(page.overlay.width, page.viewport.width);
        assert_eq!(page.overlay.text.len(), 1);
        assert_eq!(page.overlay.annotations.len(), 1);
        assert_eq!(page.overlay.annotations[0].action, LinkAction::GoToPage { page: 2 });
        // Text and annotations share the scaled coordinate space
        assert_eq!(page.overlay.text[0].rect.x, 72.0 * 2.0);
    }

    #[test]
    fn cancelled_before_start_touches_nothing() {
        let mut engine = ScriptedEngine::with_pages(vec![ScriptedPage::letter()]);
        let script = engine.script();
        let doc = open(&mut engine);
        let cancel = CancelToken::new();
        cancel.cancel(RequestId::new(3));

        let outcome = render_page(doc.as_ref(), RequestId::new(3), &params(1, (612, 792)), &cancel)
            .expect("cancel is not a fault");
        assert!(matches!(outcome, RenderOutcome::Cancelled(RenderStage::FetchPage)));
        assert_eq!(script.calls(), vec!["open doc.pdf"]);
    }

    #[test]
    fn cancellation_mid_render_stops_at_next_stage() {
        let mut engine = ScriptedEngine::with_pages(vec![ScriptedPage::letter()]);
        let script = engine.script();
        script.cancel_during_rasterize(true);
        let doc = open(&mut engine);
        let cancel = CancelToken::new();
        script.attach_cancel(cancel.clone(), RequestId::new(1));

        let outcome = render_page(doc.as_ref(), RequestId::new(1), &params(1, (612, 792)), &cancel)
            .expect("cancel is not a fault");
        assert!(matches!(outcome, RenderOutcome::Cancelled(RenderStage::TextLayer)));
        assert!(!script.calls().iter().any(|c| c.starts_with("text")));
    }

    #[test]
    fn stage_failure_propagates() {
        let mut engine = ScriptedEngine::with_pages(vec![ScriptedPage::letter()]);
        let script = engine.script();
        script.fail_renders(1);
        let doc = open(&mut engine);

        let result = render_page(
            doc.as_ref(),
            RequestId::new(1),
            &params(1, (612, 792)),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(RenderFault::Engine(_))));
    }

    #[test]
    fn out_of_range_page_is_a_fault() {
        let mut engine = ScriptedEngine::with_pages(vec![ScriptedPage::letter()]);
        let doc = open(&mut engine);
        let result = render_page(
            doc.as_ref(),
            RequestId::new(1),
            &params(2, (612, 792)),
            &CancelToken::new(),
        );
        assert!(result.is_err());
    }
}
