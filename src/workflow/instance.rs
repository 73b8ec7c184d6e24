//! Workflow Instance
//!
//! One execution of a workflow body and its control surface. Every method is
//! safe to call at any time, from any task, including before the body has
//! reached its first step and after it has finished. Terminal states are
//! final: control calls on a finished instance are no-ops.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use super::state::InstanceStatus;
use crate::execution::engine::RunOutcome;
use crate::execution::events::EventError;
use crate::execution::gate::SuspensionGate;
use crate::execution::step::WorkflowStep;
use crate::monitoring::ExecutionTimeline;

/// A running or finished workflow execution.
pub struct Instance {
    id: String,
    created_at: DateTime<Utc>,
    status: Mutex<InstanceStatus>,
    step_gate: Arc<SuspensionGate>,
    finished: SuspensionGate,
    step: WorkflowStep,
}

impl Instance {
    pub(crate) fn new(id: String, step_gate: Arc<SuspensionGate>, step: WorkflowStep) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            status: Mutex::new(InstanceStatus::Running),
            step_gate,
            finished: SuspensionGate::new(true),
            step,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Pauses the instance. The step in flight finishes; the next one waits.
    pub fn pause(&self) {
        let mut status = self.lock_status();
        if status.is_terminal() {
            debug!("Instance '{}' already finished; pause ignored", self.id);
            return;
        }
        *status = InstanceStatus::Paused;
        self.step_gate.arm();
        info!("Instance '{}' paused", self.id);
    }

    /// Resumes a paused instance. Does nothing otherwise.
    pub fn resume(&self) {
        let mut status = self.lock_status();
        if *status != InstanceStatus::Paused {
            debug!("Instance '{}' is {}; resume ignored", self.id, status.name());
            return;
        }
        *status = InstanceStatus::Running;
        self.step_gate.disarm();
        info!("Instance '{}' resumed", self.id);
    }

    /// Terminates the instance at its next step boundary or event wait.
    pub fn terminate(&self) {
        {
            let mut status = self.lock_status();
            if status.is_terminal() {
                debug!("Instance '{}' already finished; terminate ignored", self.id);
                return;
            }
            *status = InstanceStatus::Terminated {
                error: "Workflow terminated".to_string(),
            };
        }

        self.step.executor().workflow_terminated();
        self.step.events().terminate();
        self.step_gate.disarm();
        info!("Instance '{}' terminated", self.id);
    }

    /// Current status snapshot.
    pub fn status(&self) -> InstanceStatus {
        self.lock_status().clone()
    }

    /// Waits until the instance reaches a terminal status. Never fails;
    /// inspect [`status`](Self::status) afterwards.
    pub async fn done(&self) {
        self.finished.wait_if_armed().await;
    }

    /// Delivers an event to the body's pending wait for `event_type`.
    pub fn send_event<T: Serialize>(&self, event_type: &str, payload: &T) -> Result<(), EventError> {
        let payload = serde_json::to_value(payload).map_err(|source| EventError::Serialize {
            event_type: event_type.to_string(),
            source,
        })?;
        self.step.events().send(event_type, payload)
    }

    /// Times out the body's wait for `event_type`.
    pub fn trigger_timeout(&self, event_type: &str) {
        info!("Instance '{}': timeout triggered for '{}'", self.id, event_type);
        self.step.events().trigger_timeout(event_type);
    }

    /// Event types the body is currently waiting for.
    pub fn pending_events(&self) -> Vec<String> {
        self.step.events().pending()
    }

    /// Snapshot of every step attempt so far.
    pub fn timeline(&self) -> ExecutionTimeline {
        self.step.executor().timeline()
    }

    /// Records the body's outcome and releases `done()` waiters.
    pub(crate) fn finish(&self, outcome: RunOutcome) {
        {
            let mut status = self.lock_status();
            if matches!(*status, InstanceStatus::Terminated { .. }) {
                debug!("Instance '{}' keeps terminated status ({:?})", self.id, outcome);
            } else {
                *status = outcome.into();
            }
        }
        self.step_gate.disarm();
        self.finished.disarm();
    }

    fn lock_status(&self) -> MutexGuard<'_, InstanceStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::EventWaits;
    use crate::execution::middleware::PauseOnGate;
    use crate::execution::step::StepExecutor;
    use crate::workflow::settings::EngineSettings;
    use std::time::Duration;

    fn instance() -> Instance {
        let gate = Arc::new(SuspensionGate::new(false));
        let settings = EngineSettings::default();
        let executor = StepExecutor::new(&settings, vec![Arc::new(PauseOnGate::new(Arc::clone(&gate)))]);
        let step = WorkflowStep::new(Arc::new(executor), Arc::new(EventWaits::new(false)));
        Instance::new("test".to_string(), gate, step)
    }

    #[test]
    fn test_initial_status_running() {
        let instance = instance();
        assert_eq!(instance.status(), InstanceStatus::Running);
        assert_eq!(instance.id(), "test");
    }

    #[test]
    fn test_pause_and_resume() {
        let instance = instance();
        instance.pause();
        instance.pause();
        assert_eq!(instance.status(), InstanceStatus::Paused);
        assert!(!instance.step_gate.is_active());

        instance.resume();
        assert_eq!(instance.status(), InstanceStatus::Running);
        assert!(instance.step_gate.is_active());
    }

    #[test]
    fn test_resume_while_running_is_noop() {
        let instance = instance();
        instance.resume();
        assert_eq!(instance.status(), InstanceStatus::Running);

        instance.pause();
        assert!(!instance.step_gate.is_active());
    }

    #[test]
    fn test_terminate_wins_over_resume() {
        let instance = instance();
        instance.pause();
        instance.terminate();
        instance.resume();
        instance.pause();

        assert!(matches!(instance.status(), InstanceStatus::Terminated { .. }));
        assert!(instance.step.executor().is_terminated());
        assert!(instance.step_gate.is_active());
    }

    #[test]
    fn test_finish_keeps_terminated_status() {
        let instance = instance();
        instance.terminate();
        instance.finish(RunOutcome::Completed);
        assert!(matches!(instance.status(), InstanceStatus::Terminated { .. }));
    }

    #[test]
    fn test_finish_is_final() {
        let instance = instance();
        instance.finish(RunOutcome::Errored("boom".to_string()));
        instance.pause();
        instance.terminate();
        assert_eq!(
            instance.status(),
            InstanceStatus::Errored {
                error: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_done_releases_after_finish() {
        let instance = Arc::new(instance());
        let waiter = {
            let instance = Arc::clone(&instance);
            tokio::spawn(async move { instance.done().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        instance.finish(RunOutcome::Completed);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("done() should resolve")
            .unwrap();
        assert_eq!(instance.status(), InstanceStatus::Completed);

        // Later waiters return immediately.
        instance.done().await;
    }

    #[test]
    fn test_send_event_without_wait() {
        let instance = instance();
        let error = instance.send_event("weather", &143).unwrap_err();
        assert!(error.to_string().contains("weather"));
    }
}
