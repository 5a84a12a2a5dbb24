//! Viewer state machine
//!
//! Pure bookkeeping for one viewer session: document load outcome, current
//! page, the single-flight render guard with its one-slot pending request,
//! and bounded recovery from runtime faults. Commands mutate the state and
//! return the effects the session must carry out; nothing here talks to the
//! worker directly.

/// Automatic recovery attempts before the fatal error is shown
pub const MAX_RELOAD_COUNT_ON_ERROR: u32 = 2;

/// Document load outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    /// No source supplied yet (upload mode before the first upload)
    Empty,
    Loading,
    Loaded,
    /// Open or initial render failed. Runtime fault attempts are reported
    /// alongside; a load failure itself never consumes them.
    Error { reload_attempts: u32 },
}

/// Single-flight render guard
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum RenderState {
    #[default]
    Idle,
    Rendering,
}

/// Navigation direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Why a document open was issued
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenPurpose {
    /// New source: start at page 1
    Initial,
    /// Fault recovery: reopen the same source and stay on the current page
    Reload,
}

/// Commands that modify viewer state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A new source was supplied (mount, source change, upload)
    LoadSource,
    /// The worker opened the document
    DocumentOpened { page_count: usize },
    /// The worker could not open the document
    DocumentFailed,
    /// Render the current page (explicit call, resize, fullscreen change)
    RequestRender,
    /// Move one page forward or back
    SwitchPage(Direction),
    /// The in-flight render finished with the given scale
    RenderCompleted { scale: f32 },
    /// The in-flight render was aborted because it was superseded
    RenderCancelled,
    /// The in-flight render failed
    RenderFailed,
    /// Fault reported by the host's fault boundary
    RuntimeFault,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Drop surfaces and cancel anything in flight for the old source
    ResetSession,
    /// Open the current source
    OpenDocument(OpenPurpose),
    /// Send a render of the current page to the worker
    DispatchRender,
    /// Ask the worker to abort the in-flight render at its next stage
    CancelInFlight,
    /// Swap the finished render's layers into the surfaces
    PresentPage,
    /// Load failure became visible
    ShowLoadFailure,
    /// A recovery attempt was started
    Retry { attempt: u32 },
    /// Retries are exhausted
    ShowFatalError,
}

/// State for one viewer session
#[derive(Clone, Debug)]
pub struct ViewerState {
    load: LoadState,
    render: RenderState,
    navigation_blocked: bool,
    pending_render: bool,
    current_page: usize,
    page_count: usize,
    scale: f32,
    initial_scale: f32,
    /// Set until the first render of a freshly opened source succeeds
    initial_render: bool,
    opening: Option<OpenPurpose>,
    reload_attempts: u32,
    max_reload_attempts: u32,
    fatal: bool,
}

impl ViewerState {
    #[must_use]
    pub fn new(initial_scale: f32, max_reload_attempts: u32) -> Self {
        Self {
            load: LoadState::Empty,
            render: RenderState::Idle,
            navigation_blocked: false,
            pending_render: false,
            current_page: 1,
            page_count: 0,
            scale: initial_scale,
            initial_scale,
            initial_render: false,
            opening: None,
            reload_attempts: 0,
            max_reload_attempts,
            fatal: false,
        }
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.load
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.render == RenderState::Rendering
    }

    #[must_use]
    pub fn is_navigation_blocked(&self) -> bool {
        self.navigation_blocked
    }

    #[must_use]
    pub fn has_pending_render(&self) -> bool {
        self.pending_render
    }

    /// Current page (1-based)
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Last resolved scale, the base for the next fit
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn reload_attempts(&self) -> u32 {
        self.reload_attempts
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.load == LoadState::Loaded
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::LoadSource => {
                self.load = LoadState::Loading;
                self.current_page = 1;
                self.page_count = 0;
                self.render = RenderState::Idle;
                self.navigation_blocked = false;
                self.pending_render = false;
                self.scale = self.initial_scale;
                self.initial_render = false;
                self.opening = Some(OpenPurpose::Initial);
                self.reload_attempts = 0;
                self.fatal = false;
                vec![
                    Effect::ResetSession,
                    Effect::OpenDocument(OpenPurpose::Initial),
                ]
            }

            Command::DocumentOpened { page_count } => {
                let Some(purpose) = self.opening.take() else {
                    return vec![];
                };
                self.load = LoadState::Loaded;
                self.page_count = page_count;
                match purpose {
                    OpenPurpose::Initial => {
                        self.current_page = 1;
                        self.initial_render = true;
                    }
                    OpenPurpose::Reload => {
                        self.current_page = clamp_page(self.current_page, page_count);
                    }
                }
                self.request_render()
            }

            Command::DocumentFailed => {
                let Some(purpose) = self.opening.take() else {
                    return vec![];
                };
                match purpose {
                    OpenPurpose::Initial => self.fail_load(),
                    OpenPurpose::Reload => self.runtime_fault(),
                }
            }

            Command::RequestRender => self.request_render(),

            Command::SwitchPage(direction) => self.switch_page(direction),

            Command::RenderCompleted { scale } => {
                if !self.is_rendering() {
                    return vec![];
                }
                self.scale = scale;
                self.initial_render = false;
                self.render = RenderState::Idle;
                let mut effects = vec![Effect::PresentPage];
                effects.extend(self.finish_render());
                effects
            }

            Command::RenderCancelled => {
                if !self.is_rendering() {
                    return vec![];
                }
                self.render = RenderState::Idle;
                self.finish_render()
            }

            Command::RenderFailed => {
                if !self.is_rendering() {
                    return vec![];
                }
                self.render = RenderState::Idle;
                self.navigation_blocked = false;
                self.pending_render = false;
                if self.initial_render {
                    self.initial_render = false;
                    self.fail_load()
                } else {
                    self.runtime_fault()
                }
            }

            Command::RuntimeFault => {
                // Faults only count against a loaded session. While loading
                // or after a load failure the source itself is the problem;
                // the session has already logged the report.
                if self.load != LoadState::Loaded {
                    return vec![];
                }
                self.runtime_fault()
            }
        }
    }

    fn request_render(&mut self) -> Vec<Effect> {
        if self.fatal || self.load != LoadState::Loaded || self.page_count == 0 {
            return vec![];
        }
        if self.is_rendering() {
            // Latest wins: one pending slot, the running render is cut short
            let already_pending = self.pending_render;
            self.pending_render = true;
            return if already_pending {
                vec![]
            } else {
                vec![Effect::CancelInFlight]
            };
        }
        self.start_render()
    }

    fn start_render(&mut self) -> Vec<Effect> {
        self.render = RenderState::Rendering;
        self.navigation_blocked = true;
        vec![Effect::DispatchRender]
    }

    fn finish_render(&mut self) -> Vec<Effect> {
        if std::mem::take(&mut self.pending_render) {
            self.start_render()
        } else {
            self.navigation_blocked = false;
            vec![]
        }
    }

    fn switch_page(&mut self, direction: Direction) -> Vec<Effect> {
        if self.navigation_blocked || self.fatal || self.load != LoadState::Loaded {
            return vec![];
        }
        let proposed = match direction {
            Direction::Next => self.current_page.saturating_add(1),
            Direction::Previous => self.current_page.saturating_sub(1),
        };
        let clamped = clamp_page(proposed, self.page_count);
        if clamped == self.current_page {
            return vec![];
        }
        self.current_page = clamped;
        self.start_render()
    }

    fn fail_load(&mut self) -> Vec<Effect> {
        self.load = LoadState::Error {
            reload_attempts: self.reload_attempts,
        };
        vec![Effect::ShowLoadFailure]
    }

    fn runtime_fault(&mut self) -> Vec<Effect> {
        if self.fatal {
            return vec![];
        }
        // Once a loaded document has faulted, later render failures are
        // recovery failures, never load failures
        self.initial_render = false;
        if self.reload_attempts < self.max_reload_attempts {
            self.reload_attempts += 1;
            self.render = RenderState::Idle;
            self.navigation_blocked = false;
            self.pending_render = false;
            self.opening = Some(OpenPurpose::Reload);
            vec![
                Effect::Retry {
                    attempt: self.reload_attempts,
                },
                Effect::OpenDocument(OpenPurpose::Reload),
            ]
        } else {
            self.fatal = true;
            self.render = RenderState::Idle;
            self.navigation_blocked = false;
            self.pending_render = false;
            self.opening = None;
            vec![Effect::ShowFatalError]
        }
    }
}

/// Clamp a proposed page into `[1, page_count]`; page 1 when the document is empty
#[must_use]
pub fn clamp_page(page: usize, page_count: usize) -> usize {
    page.clamp(1, page_count.max(1))
}
