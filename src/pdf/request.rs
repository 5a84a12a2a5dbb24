//! Render request and response types

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::engine::{DocumentSource, EngineError};
use super::link_service::ExternalLinkTarget;
use super::scale::DisplayMode;
use super::types::{ContainerSize, RenderedPage};

/// Unique identifier for worker requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Shared cancellation watermark.
///
/// Every request with an id at or below the watermark is cancelled. Ids grow
/// monotonically, so cancelling the newest in-flight request also covers
/// anything older.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled_through: Arc<AtomicU64>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, id: RequestId) {
        self.cancelled_through.fetch_max(id.0, Ordering::AcqRel);
    }

    #[must_use]
    pub fn is_cancelled(&self, id: RequestId) -> bool {
        id.0 <= self.cancelled_through.load(Ordering::Acquire)
    }
}

/// Parameters for rendering a page
#[derive(Clone, Debug)]
pub struct RenderParams {
    /// Page to render (1-based)
    pub page: usize,
    /// Last known scale, the base for the next fit
    pub previous_scale: f32,
    /// Container the page must fit
    pub container: ContainerSize,
    pub mode: DisplayMode,
    pub link_target: ExternalLinkTarget,
}

/// Request sent to the render worker
#[derive(Debug)]
pub enum RenderRequest {
    /// Open a new source, replacing the current document
    Open { id: RequestId, source: DocumentSource },

    /// Render one page through all layer stages
    Page { id: RequestId, params: RenderParams },

    /// Shutdown the worker
    Shutdown,
}

/// Render stage, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStage {
    FetchPage,
    ResolveScale,
    Rasterize,
    TextLayer,
    AnnotationLayer,
}

/// Errors from the render worker
#[derive(Debug, thiserror::Error)]
pub enum RenderFault {
    #[error("PDF engine: {0}")]
    Engine(#[from] EngineError),

    #[error("no document is loaded")]
    NoDocument,
}

/// Fault classes the recovery state machine distinguishes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Open or initial render failed; terminal for that source
    SourceLoadFailure,
    /// Fault in an already loaded session; retried
    RuntimeRenderFault,
    /// Retries exhausted
    FatalDisplayFault,
}

/// Response from the render worker
#[derive(Debug)]
pub enum RenderResponse {
    /// Document opened
    Opened { id: RequestId, page_count: usize },

    /// Document could not be opened
    OpenFailed { id: RequestId, error: RenderFault },

    /// All layers of a page rendered
    Page { id: RequestId, page: Box<RenderedPage> },

    /// Render aborted between stages because it was superseded
    Cancelled { id: RequestId, stage: RenderStage },

    /// Render failed in some stage
    Error { id: RequestId, error: RenderFault },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Opened { id, .. }
            | Self::OpenFailed { id, .. }
            | Self::Page { id, .. }
            | Self::Cancelled { id, .. }
            | Self::Error { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_covers_older_ids() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled(RequestId::new(1)));

        token.cancel(RequestId::new(5));
        assert!(token.is_cancelled(RequestId::new(3)));
        assert!(token.is_cancelled(RequestId::new(5)));
        assert!(!token.is_cancelled(RequestId::new(6)));

        // Watermark never moves backwards
        token.cancel(RequestId::new(2));
        assert!(token.is_cancelled(RequestId::new(4)));
    }

    #[test]
    fn clones_share_the_watermark() {
        let token = CancelToken::new();
        let worker_side = token.clone();
        token.cancel(RequestId::new(7));
        assert!(worker_side.is_cancelled(RequestId::new(7)));
    }
}
