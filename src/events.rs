use tokio::sync::broadcast;

/// Progress notifications for whatever is presenting the agent.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    Thinking,
    PlanReady { steps: Vec<String> },
    StepStarted { number: usize, description: String },
    Attempt { step: String, attempt: u32, max: u32 },
    Thought { text: String },
    ActionDispatched { description: String },
    ActionFailed { description: String, message: String },
    BranchExplored { node: String, depth: usize },
    BranchFailed { node: String, message: String },
    ElementFound { node: String },
    HumanNeeded { favour: String },
    StepComplete { number: usize },
    TaskComplete,
    TaskError { message: String },
}

/// Cheap handle for publishing [`AgentEvent`]s.
///
/// Sends are fire-and-forget: a missing or lagging subscriber never affects
/// the caller.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    tx: Option<broadcast::Sender<AgentEvent>>,
}

impl Progress {
    pub fn new(tx: broadcast::Sender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
