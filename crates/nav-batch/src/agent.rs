use nav_grid::Vec2;

/// Completion callback: receives the smoothed world-space path, empty on failure.
pub type PathCallback = Box<dyn FnOnce(Vec<Vec2>) + Send + 'static>;

/// Where an agent's latest request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// No live request. The last delivered path (if any) is kept.
    Idle,
    /// Waiting in the pending queue.
    Requested,
    /// Dispatched in a batch that has not been harvested yet.
    Processing,
}

/// Per-agent bookkeeping owned by the scheduler.
pub struct AgentPathState {
    pub last_request_id: u64,
    pub last_request_time: f64,
    pub phase: AgentPhase,
    pub current_path: Vec<Vec2>,
    pub(crate) callback: Option<PathCallback>,
}

impl AgentPathState {
    pub(crate) fn new(now: f64) -> Self {
        Self {
            last_request_id: 0,
            last_request_time: now,
            phase: AgentPhase::Idle,
            current_path: Vec::new(),
            callback: None,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.phase != AgentPhase::Idle
    }

    /// `true` when `request_id` is this agent's live request.
    pub(crate) fn awaits(&self, request_id: u64) -> bool {
        self.is_processing() && self.last_request_id == request_id
    }

    /// Close out the live request, returning its callback paired with `path`.
    pub(crate) fn complete(&mut self, path: Vec<Vec2>) -> Option<Delivery> {
        self.phase = AgentPhase::Idle;
        self.current_path = path.clone();
        self.callback.take().map(|callback| Delivery { callback, path })
    }

    /// Give up on the live request without solving it. The last delivered path is kept.
    pub(crate) fn abandon(&mut self) -> Option<Delivery> {
        self.phase = AgentPhase::Idle;
        self.callback.take().map(|callback| Delivery {
            callback,
            path: Vec::new(),
        })
    }
}

impl core::fmt::Debug for AgentPathState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AgentPathState")
            .field("last_request_id", &self.last_request_id)
            .field("last_request_time", &self.last_request_time)
            .field("phase", &self.phase)
            .field("current_path", &self.current_path.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// A callback ready to run on the coordinating thread.
pub(crate) struct Delivery {
    callback: PathCallback,
    path: Vec<Vec2>,
}

impl Delivery {
    pub(crate) fn is_failure(&self) -> bool {
        self.path.is_empty()
    }

    pub(crate) fn run(self) {
        (self.callback)(self.path);
    }
}
