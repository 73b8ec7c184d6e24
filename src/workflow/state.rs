//! Instance Status
//!
//! The observable state of a workflow instance. Serialises to the shape
//! external callers expect, e.g. `{"status": "errored", "error": "..."}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::execution::engine::RunOutcome;

/// Status of a workflow instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Paused,
    Completed,
    Errored { error: String },
    Terminated { error: String },
}

impl InstanceStatus {
    /// Returns true for `completed`, `errored` and `terminated`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Errored { .. } | Self::Terminated { .. }
        )
    }

    /// Short name of the status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Errored { .. } => "errored",
            Self::Terminated { .. } => "terminated",
        }
    }

    /// Error message for failed states.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Errored { error } | Self::Terminated { error } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error() {
            Some(error) => write!(f, "{} ({})", self.name(), error),
            None => write!(f, "{}", self.name()),
        }
    }
}

impl From<RunOutcome> for InstanceStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => Self::Completed,
            RunOutcome::Terminated(error) => Self::Terminated { error },
            RunOutcome::Errored(error) => Self::Errored { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(!InstanceStatus::Running.is_terminal());
        assert!(!InstanceStatus::Paused.is_terminal());
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Errored { error: "x".into() }.is_terminal());
        assert!(InstanceStatus::Terminated { error: "x".into() }.is_terminal());
    }

    #[test]
    fn test_status_json_shape() {
        assert_eq!(
            serde_json::to_value(InstanceStatus::Completed).unwrap(),
            json!({ "status": "completed" })
        );
        assert_eq!(
            serde_json::to_value(InstanceStatus::Errored {
                error: "Value cannot be 0".into()
            })
            .unwrap(),
            json!({ "status": "errored", "error": "Value cannot be 0" })
        );
    }

    #[test]
    fn test_status_roundtrip_from_json() {
        let status: InstanceStatus =
            serde_json::from_value(json!({ "status": "terminated", "error": "Workflow terminated" }))
                .unwrap();
        assert_eq!(status.error(), Some("Workflow terminated"));
        assert_eq!(status.name(), "terminated");
    }

    #[test]
    fn test_from_outcome() {
        assert_eq!(
            InstanceStatus::from(RunOutcome::Completed),
            InstanceStatus::Completed
        );
        assert_eq!(
            InstanceStatus::from(RunOutcome::Errored("boom".into())).to_string(),
            "errored (boom)"
        );
    }
}
