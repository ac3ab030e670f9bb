use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agents::messages::ControlMessage;
use crate::orchestrator::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub control: mpsc::Sender<ControlMessage>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, control: mpsc::Sender<ControlMessage>) -> Self {
        Self {
            orchestrator,
            control,
        }
    }
}
