//! State shared by all handlers

use crate::memory::{MemoryBackend, MemoryStore};
use crate::orchestrator::InteractionOrchestrator;
use std::sync::Arc;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<InteractionOrchestrator>,
    /// Where `POST /memory/backup` writes its copy
    pub backup: Arc<dyn MemoryBackend>,
}

impl AppState {
    pub fn new(orchestrator: Arc<InteractionOrchestrator>, backup: Arc<dyn MemoryBackend>) -> Self {
        Self {
            orchestrator,
            backup,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        self.orchestrator.store()
    }
}
