use std::time::Duration;

use super::context::*;

/// Externally visible result of a completed run.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub completion_token: String,
    pub email: String,
    pub full_name: String,
    pub transitions: Vec<StageTransition>,
    pub duration: Duration,
}

impl WorkflowOutcome {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "✓ Registered '{}' <{}> in {}ms ({} transitions)",
            self.full_name,
            self.email,
            self.duration.as_millis(),
            self.transitions.len()
        )
    }

    pub fn stage_path(&self) -> Vec<String> {
        self.transitions
            .iter()
            .map(|t| format!("{} -> {}", t.from, t.to))
            .collect()
    }
}
