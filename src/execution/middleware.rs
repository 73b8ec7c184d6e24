//! Step Middleware
//!
//! Hooks layered around every step attempt. The executor runs `before_task`
//! hooks in chain order before the task, and `after_task` hooks in reverse
//! order once the task has returned a value.
//!
//! - [`PauseOnGate`]: parks the step while the instance is paused
//! - [`ThrowFirstTime`]: fault injection for replay/idempotency tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::debug;

use super::error::StepError;
use super::gate::SuspensionGate;
use crate::workflow::config::StepConfig;

/// A hook around step execution.
#[async_trait]
pub trait StepMiddleware: Send + Sync {
    /// Runs before the task. An error here counts as a failed attempt.
    async fn before_task(&self, _label: &str, _config: &StepConfig) -> Result<(), StepError> {
        Ok(())
    }

    /// Runs after the task succeeded. An error here counts as a failed attempt.
    async fn after_task(&self, _label: &str, _config: &StepConfig) -> Result<(), StepError> {
        Ok(())
    }

    /// Called once when the owning instance is terminated.
    fn workflow_terminated(&self) {}
}

/// Waits on the instance's step gate before each task.
pub struct PauseOnGate {
    gate: Arc<SuspensionGate>,
}

impl PauseOnGate {
    pub fn new(gate: Arc<SuspensionGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl StepMiddleware for PauseOnGate {
    async fn before_task(&self, label: &str, _config: &StepConfig) -> Result<(), StepError> {
        if !self.gate.is_active() {
            debug!("Step '{}' waiting for resume", label);
        }
        self.gate.wait_if_armed().await;
        Ok(())
    }

    fn workflow_terminated(&self) {
        self.gate.disarm();
    }
}

/// Fails each step label the first time it completes.
///
/// Labels containing "pause" are exempt so that self-pausing steps do not
/// pause twice.
#[derive(Default)]
pub struct ThrowFirstTime {
    seen_labels: Mutex<HashSet<String>>,
}

impl ThrowFirstTime {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepMiddleware for ThrowFirstTime {
    async fn after_task(&self, label: &str, _config: &StepConfig) -> Result<(), StepError> {
        let first_time = self
            .seen_labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(label.to_string());

        if label.contains("pause") || !first_time {
            return Ok(());
        }

        Err(StepError::failed(format!(
            "First time seeing step label \"{}\". Simulate error.",
            label
        )))
    }
}
