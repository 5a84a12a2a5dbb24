//! Viewer session - drives the state machine against the render worker
//!
//! The session is the single owner of all viewer state. It turns state
//! machine effects into worker requests, and worker responses back into
//! commands. Responses whose id is not the one currently in flight belong to
//! a superseded request or an older source and are dropped.

use std::collections::VecDeque;
use std::io;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};

use super::engine::{DocumentEngine, DocumentSource};
use super::link_service::ExternalLinkTarget;
use super::request::{
    CancelToken, FaultKind, RenderParams, RenderRequest, RenderResponse, RenderStage, RequestId,
};
use super::scale::{DisplayMode, clamp_initial_scale};
use super::state::{Command, Direction, Effect, LoadState, MAX_RELOAD_COUNT_ON_ERROR, ViewerState};
use super::throttle::{DEFAULT_RESIZE_THROTTLE, Throttle};
use super::types::{ContainerSize, RenderedPage, Surfaces};
use super::worker::{WorkerConfig, spawn_worker};
use crate::host::{Host, UploadError, UploadPolicy, UploadedFile};

pub const LOADING_MESSAGE: &str = "Loading document...";
pub const LOAD_FAILURE_MESSAGE: &str = "Failed to load the PDF file";
pub const FATAL_ERROR_MESSAGE: &str = "An error occurred while viewing the document";
pub const UPLOAD_LABEL: &str = "Select a PDF document";

/// Session construction parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub initial_scale: f32,
    pub max_reload_attempts: u32,
    pub resize_throttle: Duration,
    pub link_target: ExternalLinkTarget,
    pub upload: UploadPolicy,
    pub worker: WorkerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1.0,
            max_reload_attempts: MAX_RELOAD_COUNT_ON_ERROR,
            resize_throttle: DEFAULT_RESIZE_THROTTLE,
            link_target: ExternalLinkTarget::default(),
            upload: UploadPolicy::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Where the document comes from
#[derive(Debug, Clone)]
pub enum SourceMode {
    /// Load this source on mount
    Fixed(DocumentSource),
    /// Wait for the upload collaborator to supply a file
    Upload,
}

/// Notable things that happened since the last poll
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentLoaded { page_count: usize },
    PagePresented { page: usize, scale: f32 },
    RenderSuperseded { stage: RenderStage },
    LoadFailed { error: String },
    Retrying { attempt: u32, error: String },
    Fatal { error: String },
}

impl SessionEvent {
    /// Fault class of the event, if it reports one
    #[must_use]
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::LoadFailed { .. } => Some(FaultKind::SourceLoadFailure),
            Self::Retrying { .. } => Some(FaultKind::RuntimeRenderFault),
            Self::Fatal { .. } => Some(FaultKind::FatalDisplayFault),
            _ => None,
        }
    }
}

/// What the viewer area should show, highest priority first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerDisplay {
    FatalError { message: &'static str },
    LoadFailure { message: &'static str },
    UploadPrompt {
        label: &'static str,
        error: Option<String>,
    },
    Loading { message: &'static str },
    Document,
}

/// Page navigation arrows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationControls {
    pub enabled: bool,
}

/// Control bar model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerControls {
    /// Present only for documents with more than one page
    pub navigation: Option<NavigationControls>,
    pub page_label: Option<String>,
    pub show_fullscreen: bool,
    pub fullscreen_active: bool,
    pub download: Option<DocumentSource>,
}

/// One viewer instance bound to a render worker
pub struct ViewerSession {
    state: ViewerState,
    mode: SourceMode,
    source: Option<DocumentSource>,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    cancel: CancelToken,
    next_request_id: u64,
    open_in_flight: Option<RequestId>,
    render_in_flight: Option<RequestId>,
    completed: Option<RenderedPage>,
    surfaces: Surfaces,
    container: ContainerSize,
    throttle: Throttle,
    link_target: ExternalLinkTarget,
    upload_policy: UploadPolicy,
    host: Host,
    last_error: Option<String>,
    events: Vec<SessionEvent>,
    _worker: JoinHandle<()>,
}

impl ViewerSession {
    /// Create a session and start its render worker
    pub fn new<E: DocumentEngine>(
        engine: E,
        mode: SourceMode,
        config: SessionConfig,
        host: Host,
    ) -> io::Result<Self> {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let cancel = CancelToken::new();

        let worker = spawn_worker(
            engine,
            &config.worker,
            request_rx,
            response_tx,
            cancel.clone(),
        )?;

        let initial_scale = clamp_initial_scale(config.initial_scale);
        Ok(Self {
            state: ViewerState::new(initial_scale, config.max_reload_attempts),
            mode,
            source: None,
            request_tx,
            response_rx,
            cancel,
            next_request_id: 1,
            open_in_flight: None,
            render_in_flight: None,
            completed: None,
            surfaces: Surfaces::default(),
            container: ContainerSize::default(),
            throttle: Throttle::new(config.resize_throttle),
            link_target: config.link_target,
            upload_policy: config.upload,
            host,
            last_error: None,
            events: Vec::new(),
            _worker: worker,
        })
    }

    /// Attach to a container. In fixed mode this starts loading the source.
    pub fn mount(&mut self, container: ContainerSize) {
        self.container = container;
        if let SourceMode::Fixed(source) = &self.mode {
            let source = source.clone();
            self.load_source(source);
        }
    }

    /// Replace the document. Resets page, scale and fault recovery.
    pub fn load_source(&mut self, source: DocumentSource) {
        log::info!("Loading {}", source.label());
        if let SourceMode::Fixed(fixed) = &mut self.mode {
            *fixed = source.clone();
        }
        self.source = Some(source);
        self.apply_command(Command::LoadSource);
    }

    /// Load a file handed over by the upload collaborator
    pub fn upload(&mut self, file: UploadedFile) -> Result<(), UploadError> {
        if !matches!(self.mode, SourceMode::Upload) {
            return Err(UploadError::NotAccepting);
        }
        if let Err(e) = self.upload_policy.validate(&file) {
            log::warn!("Rejected upload {:?}: {e}", file.name);
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        self.load_source(file.into_source());
        Ok(())
    }

    /// Move one page. Ignored while a render is in flight.
    pub fn switch_page(&mut self, direction: Direction) {
        self.apply_command(Command::SwitchPage(direction));
    }

    /// Render the current page at the current container size
    pub fn render_page(&mut self) {
        self.apply_command(Command::RequestRender);
    }

    /// Container changed size; re-fits through the resize throttle
    pub fn resize(&mut self, container: ContainerSize, now: Instant) {
        self.container = container;
        if self.throttle.hit(now) {
            self.render_page();
        }
    }

    /// Fire a deferred resize render once its throttle window has passed
    pub fn tick(&mut self, now: Instant) {
        if self.throttle.poll(now) {
            self.render_page();
        }
    }

    /// Toggle fullscreen on the container and schedule a re-fit
    pub fn toggle_fullscreen(&mut self, now: Instant) -> bool {
        let active = self.host.fullscreen.toggle();
        log::debug!("Fullscreen {}", if active { "on" } else { "off" });
        if self.throttle.hit(now) {
            self.render_page();
        }
        active
    }

    /// Report a fault caught by the host while displaying the document
    pub fn report_fault(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("Runtime fault reported: {detail}");
        self.last_error = Some(detail);
        self.apply_command(Command::RuntimeFault);
    }

    /// Process all worker responses that have arrived
    pub fn poll_responses(&mut self) -> Vec<SessionEvent> {
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
        }
        std::mem::take(&mut self.events)
    }

    /// Block until something happens, a throttled render becomes due, or
    /// `timeout` passes
    pub fn wait_for_event(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        if self.events.is_empty() {
            let now = Instant::now();
            let mut wake = now + timeout;
            if let Some(due) = self.throttle.pending_deadline() {
                wake = wake.min(due);
            }
            match self.response_rx.recv_timeout(wake.saturating_duration_since(now)) {
                Ok(response) => self.handle_response(response),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.worker_lost(),
            }
            self.tick(Instant::now());
        }
        self.poll_responses()
    }

    /// Pump events until nothing is in flight or `timeout` passes
    pub fn run_until_idle(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll_responses();
        while self.is_busy() {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("Session still busy after {timeout:?}");
                break;
            }
            events.extend(self.wait_for_event(deadline - now));
        }
        events
    }

    /// Whether an open or render is in flight, or a throttled render is due
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.open_in_flight.is_some()
            || self.render_in_flight.is_some()
            || self.throttle.pending_deadline().is_some()
    }

    /// Current page (1-based)
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.state.current_page()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count()
    }

    #[must_use]
    pub fn is_navigation_blocked(&self) -> bool {
        self.state.is_navigation_blocked()
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.state.scale()
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.state.load_state()
    }

    #[must_use]
    pub fn reload_attempts(&self) -> u32 {
        self.state.reload_attempts()
    }

    /// Source the download control points at
    #[must_use]
    pub fn download_source(&self) -> Option<&DocumentSource> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn surfaces(&self) -> &Surfaces {
        &self.surfaces
    }

    #[must_use]
    pub fn container(&self) -> ContainerSize {
        self.container
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn display(&self) -> ViewerDisplay {
        if self.state.is_fatal() {
            return ViewerDisplay::FatalError {
                message: FATAL_ERROR_MESSAGE,
            };
        }
        let upload_mode = matches!(self.mode, SourceMode::Upload);
        match self.state.load_state() {
            LoadState::Error { .. } if !upload_mode => ViewerDisplay::LoadFailure {
                message: LOAD_FAILURE_MESSAGE,
            },
            LoadState::Error { .. } | LoadState::Empty if upload_mode => {
                ViewerDisplay::UploadPrompt {
                    label: UPLOAD_LABEL,
                    error: self.last_error.clone(),
                }
            }
            LoadState::Loaded => ViewerDisplay::Document,
            _ => ViewerDisplay::Loading {
                message: LOADING_MESSAGE,
            },
        }
    }

    #[must_use]
    pub fn controls(&self) -> ViewerControls {
        let loaded = self.state.is_loaded() && !self.state.is_fatal();
        let page_count = self.state.page_count();
        ViewerControls {
            navigation: (loaded && page_count > 1).then(|| NavigationControls {
                enabled: !self.state.is_navigation_blocked(),
            }),
            page_label: (loaded && page_count > 0)
                .then(|| format!("Page {} of {}", self.state.current_page(), page_count)),
            show_fullscreen: self.host.fullscreen.is_supported() && !self.host.device.is_mobile(),
            fullscreen_active: self.host.fullscreen.is_active(),
            download: self.source.clone(),
        }
    }

    /// Ask the worker to exit
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(RenderRequest::Shutdown);
    }

    fn apply_command(&mut self, cmd: Command) {
        let mut queue = VecDeque::from([cmd]);
        while let Some(cmd) = queue.pop_front() {
            log::trace!("Apply {cmd:?}");
            let effects = self.state.apply(cmd);
            for effect in effects {
                if let Some(followup) = self.execute_effect(effect) {
                    queue.push_back(followup);
                }
            }
        }
    }

    /// Carry out one effect. A failure to reach the worker comes back as a
    /// command for the state machine.
    fn execute_effect(&mut self, effect: Effect) -> Option<Command> {
        match effect {
            Effect::ResetSession => {
                self.cancel_outstanding();
                self.open_in_flight = None;
                self.render_in_flight = None;
                self.completed = None;
                self.surfaces.reset();
                self.throttle.cancel();
                self.last_error = None;
                None
            }

            Effect::OpenDocument(purpose) => {
                if let Some(id) = self.render_in_flight.take() {
                    self.cancel.cancel(id);
                }
                let Some(source) = self.source.clone() else {
                    log::error!("Open requested without a source");
                    return Some(Command::DocumentFailed);
                };
                let id = self.next_id();
                log::debug!("Open {} ({purpose:?}) as {id:?}", source.label());
                if self.request_tx.send(RenderRequest::Open { id, source }).is_err() {
                    self.last_error = Some("render worker is not running".into());
                    return Some(Command::DocumentFailed);
                }
                self.open_in_flight = Some(id);
                None
            }

            Effect::DispatchRender => {
                let id = self.next_id();
                let params = self.render_params();
                log::debug!("Render page {} as {id:?}", params.page);
                if self.request_tx.send(RenderRequest::Page { id, params }).is_err() {
                    self.last_error = Some("render worker is not running".into());
                    return Some(Command::RenderFailed);
                }
                self.render_in_flight = Some(id);
                None
            }

            Effect::CancelInFlight => {
                if let Some(id) = self.render_in_flight {
                    log::debug!("Superseding render {id:?}");
                    self.cancel.cancel(id);
                }
                None
            }

            Effect::PresentPage => {
                if let Some(page) = self.completed.take() {
                    self.events.push(SessionEvent::PagePresented {
                        page: page.page,
                        scale: page.scale,
                    });
                    self.surfaces.present(page);
                }
                None
            }

            Effect::ShowLoadFailure => {
                let error = self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| LOAD_FAILURE_MESSAGE.to_string());
                log::warn!("Load failed: {error}");
                self.events.push(SessionEvent::LoadFailed { error });
                None
            }

            Effect::Retry { attempt } => {
                let error = self.last_error.clone().unwrap_or_default();
                log::info!("Recovering from render fault, attempt {attempt}: {error}");
                self.events.push(SessionEvent::Retrying { attempt, error });
                None
            }

            Effect::ShowFatalError => {
                let error = self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| FATAL_ERROR_MESSAGE.to_string());
                log::error!("Giving up after {} reloads: {error}", self.state.reload_attempts());
                self.events.push(SessionEvent::Fatal { error });
                None
            }
        }
    }

    fn handle_response(&mut self, response: RenderResponse) {
        let id = response.id();
        match response {
            RenderResponse::Opened { page_count, .. } if self.open_in_flight == Some(id) => {
                self.open_in_flight = None;
                self.events.push(SessionEvent::DocumentLoaded { page_count });
                self.apply_command(Command::DocumentOpened { page_count });
            }

            RenderResponse::OpenFailed { error, .. } if self.open_in_flight == Some(id) => {
                self.open_in_flight = None;
                self.last_error = Some(error.to_string());
                self.apply_command(Command::DocumentFailed);
            }

            RenderResponse::Page { page, .. } if self.render_in_flight == Some(id) => {
                self.render_in_flight = None;
                let scale = page.scale;
                self.completed = Some(*page);
                self.apply_command(Command::RenderCompleted { scale });
            }

            RenderResponse::Cancelled { stage, .. } if self.render_in_flight == Some(id) => {
                self.render_in_flight = None;
                self.events.push(SessionEvent::RenderSuperseded { stage });
                self.apply_command(Command::RenderCancelled);
            }

            RenderResponse::Error { error, .. } if self.render_in_flight == Some(id) => {
                self.render_in_flight = None;
                log::warn!("Render {id:?} failed: {error}");
                self.last_error = Some(error.to_string());
                self.apply_command(Command::RenderFailed);
            }

            stale => {
                log::trace!("Discarding stale response {stale:?}");
            }
        }
    }

    /// The worker hung up; whatever was in flight will never be answered
    fn worker_lost(&mut self) {
        log::error!("Render worker is gone");
        self.last_error = Some("render worker is not running".into());
        if self.open_in_flight.take().is_some() {
            self.apply_command(Command::DocumentFailed);
        }
        if self.render_in_flight.take().is_some() {
            self.apply_command(Command::RenderFailed);
        }
    }

    fn render_params(&self) -> RenderParams {
        RenderParams {
            page: self.state.current_page(),
            previous_scale: self.state.scale(),
            container: self.container,
            mode: DisplayMode::from_fullscreen(self.host.fullscreen.is_active()),
            link_target: self.link_target,
        }
    }

    /// Cancel every request issued so far
    fn cancel_outstanding(&self) {
        if self.next_request_id > 1 {
            self.cancel.cancel(RequestId::new(self.next_request_id - 1));
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.cancel_outstanding();
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HeadlessFullscreen, StaticDevice};
    use crate::test_utils::ScriptedEngine;

    const WAIT: Duration = Duration::from_secs(5);

    fn session(engine: ScriptedEngine, mode: SourceMode, host: Host) -> ViewerSession {
        ViewerSession::new(engine, mode, SessionConfig::default(), host).expect("worker starts")
    }

    #[test]
    fn fixed_mode_loads_on_mount() {
        let mut viewer = session(
            ScriptedEngine::with_page_count(3),
            SourceMode::Fixed(ScriptedEngine::source("doc.pdf")),
            Host::headless(),
        );
        assert_eq!(viewer.display(), ViewerDisplay::Loading { message: LOADING_MESSAGE });

        viewer.mount(ContainerSize::new(612, 792));
        assert_eq!(viewer.display(), ViewerDisplay::Loading { message: LOADING_MESSAGE });
        let events = viewer.run_until_idle(WAIT);

        assert!(events.contains(&SessionEvent::DocumentLoaded { page_count: 3 }));
        assert_eq!(viewer.display(), ViewerDisplay::Document);
        assert_eq!(viewer.surfaces().page, Some(1));
    }

    #[test]
    fn controls_follow_page_count_and_device() {
        let mut viewer = session(
            ScriptedEngine::with_page_count(2),
            SourceMode::Fixed(ScriptedEngine::source("doc.pdf")),
            Host::new(
                Box::new(HeadlessFullscreen::default()),
                Box::new(StaticDevice { mobile: true }),
            ),
        );
        assert_eq!(viewer.controls().navigation, None);
        viewer.mount(ContainerSize::new(612, 792));
        let _ = viewer.run_until_idle(WAIT);

        let controls = viewer.controls();
        assert_eq!(controls.navigation, Some(NavigationControls { enabled: true }));
        assert_eq!(controls.page_label.as_deref(), Some("Page 1 of 2"));
        assert!(!controls.show_fullscreen);
        assert_eq!(controls.download, Some(ScriptedEngine::source("doc.pdf")));
    }

    #[test]
    fn single_page_document_has_no_navigation() {
        let mut viewer = session(
            ScriptedEngine::with_page_count(1),
            SourceMode::Fixed(ScriptedEngine::source("doc.pdf")),
            Host::new(
                Box::new(HeadlessFullscreen::new(false)),
                Box::new(StaticDevice::default()),
            ),
        );
        viewer.mount(ContainerSize::new(612, 792));
        let _ = viewer.run_until_idle(WAIT);
        let controls = viewer.controls();
        assert_eq!(controls.navigation, None);
        assert_eq!(controls.page_label.as_deref(), Some("Page 1 of 1"));
        assert!(!controls.show_fullscreen);
    }

    #[test]
    fn upload_rejected_in_fixed_mode() {
        let mut viewer = session(
            ScriptedEngine::with_page_count(1),
            SourceMode::Fixed(ScriptedEngine::source("doc.pdf")),
            Host::headless(),
        );
        let file = UploadedFile::new(None, b"%PDF-1.4".to_vec());
        assert_eq!(viewer.upload(file), Err(UploadError::NotAccepting));
    }

    #[test]
    fn event_fault_kinds() {
        assert_eq!(
            SessionEvent::LoadFailed { error: String::new() }.fault_kind(),
            Some(FaultKind::SourceLoadFailure)
        );
        assert_eq!(
            SessionEvent::Fatal { error: String::new() }.fault_kind(),
            Some(FaultKind::FatalDisplayFault)
        );
        assert_eq!(
            SessionEvent::DocumentLoaded { page_count: 1 }.fault_kind(),
            None
        );
    }
}
