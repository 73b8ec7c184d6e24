//! Step and workflow error types.

use std::fmt;

use thiserror::Error;

/// Error type returned by step tasks and middleware hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the step API and by workflow bodies.
#[derive(Debug, Error)]
pub enum StepError {
    /// Programmer error (empty label, duplicate wait). Never retried.
    #[error("{0}")]
    Validation(String),

    /// The instance was terminated from outside.
    #[error("Workflow terminated")]
    Terminated,

    /// A step failed within its retry budget; the body must be run again.
    #[error("{0}")]
    Retry(RetrySignal),

    /// A task asked to fail without consuming retry budget.
    #[error("{0}")]
    NonRetryable(NonRetryableError),

    /// An event wait timed out.
    #[error("Timeout waiting for event '{event_type}' after {timeout}")]
    Timeout { event_type: String, timeout: String },

    /// A delivered event payload did not have the expected shape.
    #[error("Invalid payload for event '{event_type}': {source}")]
    Payload {
        event_type: String,
        source: serde_json::Error,
    },

    /// Any other task failure, carried unchanged.
    #[error("{0}")]
    Failed(BoxError),
}

impl StepError {
    /// Builds a generic failure from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }

    /// Classifies an error returned by a task.
    pub(crate) fn from_task(error: BoxError) -> Self {
        let error = match error.downcast::<StepError>() {
            Ok(step_error) => return *step_error,
            Err(error) => error,
        };
        match error.downcast::<NonRetryableError>() {
            Ok(non_retryable) => Self::NonRetryable(*non_retryable),
            Err(error) => Self::Failed(error),
        }
    }

    /// Returns true if this failure may consume retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Error a task returns to fail immediately, regardless of retry limits.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NonRetryableError {
    message: String,
    name: Option<String>,
}

impl NonRetryableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
        }
    }

    /// Attaches a caller-defined error name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Signal that a step failed inside its retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySignal {
    /// Label of the failing step
    pub label: String,
    /// Attempt ordinal that failed (0 for the first run)
    pub attempt: u32,
}

impl fmt::Display for RetrySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step '{}' failed on attempt {} and will be retried",
            self.label, self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_task_detects_non_retryable() {
        let error: BoxError = Box::new(NonRetryableError::new("stop now").with_name("the-name"));
        match StepError::from_task(error) {
            StepError::NonRetryable(e) => {
                assert_eq!(e.to_string(), "stop now");
                assert_eq!(e.name(), Some("the-name"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_from_task_keeps_generic_error() {
        let error: BoxError = "boom".into();
        let step_error = StepError::from_task(error);
        assert!(step_error.is_retryable());
        assert_eq!(step_error.to_string(), "boom");
    }

    #[test]
    fn test_from_task_unwraps_step_error() {
        let error: BoxError = Box::new(StepError::Terminated);
        assert!(matches!(StepError::from_task(error), StepError::Terminated));
    }

    #[test]
    fn test_only_generic_failures_are_retryable() {
        assert!(!StepError::Terminated.is_retryable());
        assert!(!StepError::Validation("x".into()).is_retryable());
        assert!(!StepError::NonRetryable(NonRetryableError::new("x")).is_retryable());
        assert!(StepError::failed("x").is_retryable());
    }

    #[test]
    fn test_timeout_message_names_event() {
        let error = StepError::Timeout {
            event_type: "weather".to_string(),
            timeout: "10 seconds".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Timeout waiting for event 'weather' after 10 seconds"
        );
    }

    #[test]
    fn test_retry_signal_display() {
        let signal = RetrySignal {
            label: "calculate square".to_string(),
            attempt: 2,
        };
        assert!(signal.to_string().contains("calculate square"));
        assert!(signal.to_string().contains("attempt 2"));
    }
}
