//! PDF page viewing pipeline

mod engine;
mod link_service;
#[cfg(feature = "pdf")]
mod mupdf_engine;
mod renderer;
mod request;
mod scale;
mod service;
mod state;
mod throttle;
mod types;
mod worker;

pub use engine::{
    DocumentEngine, DocumentSource, EngineDocument, EngineError, EnginePage, LinkAnnotation,
    LinkDestination, TextContent, TextItem, check_page_index,
};
pub use link_service::{ExternalLinkTarget, LinkService};
#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfEngine;
pub use renderer::{RenderOutcome, render_annotation_layer, render_page, render_text_layer};
pub use request::{
    CancelToken, FaultKind, RenderFault, RenderParams, RenderRequest, RenderResponse, RenderStage,
    RequestId,
};
pub use scale::{
    DisplayMode, FIXED_POINT_EPSILON_PX, FULLSCREEN_HEIGHT_FIT_MAX_ASPECT, FitAxis, MIN_SCALE,
    ScaleResolution, clamp_initial_scale, resolve_scale,
};
pub use service::{
    FATAL_ERROR_MESSAGE, LOAD_FAILURE_MESSAGE, LOADING_MESSAGE, NavigationControls,
    SessionConfig, SessionEvent, SourceMode, UPLOAD_LABEL, ViewerControls, ViewerDisplay,
    ViewerSession,
};
pub use state::{
    Command, Direction, Effect, LoadState, MAX_RELOAD_COUNT_ON_ERROR, OpenPurpose,
    ViewerState, clamp_page,
};
pub use throttle::{DEFAULT_RESIZE_THROTTLE, Throttle};
pub use types::*;
pub use worker::{WorkerConfig, render_worker, spawn_worker};
