//! Workflow Body Driver
//!
//! Runs a workflow body to a terminal outcome. Each run of the body is
//! classified as data: a retry signal continues the loop and re-invokes the
//! body against the same [`WorkflowStep`] (so per-label counters persist),
//! anything else breaks out with a [`RunOutcome`].

use std::ops::ControlFlow;

use log::{debug, error, info, warn};

use super::error::{RetrySignal, StepError};
use super::step::WorkflowStep;
use crate::workflow::model::{Workflow, WorkflowEvent};

/// Terminal result of driving a workflow body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Terminated(String),
    Errored(String),
}

/// Maps one body run to "restart" or a terminal outcome.
pub fn classify(result: Result<(), StepError>) -> ControlFlow<RunOutcome, RetrySignal> {
    match result {
        Ok(()) => ControlFlow::Break(RunOutcome::Completed),
        Err(StepError::Retry(signal)) => ControlFlow::Continue(signal),
        Err(StepError::Terminated) => {
            ControlFlow::Break(RunOutcome::Terminated(StepError::Terminated.to_string()))
        }
        Err(error) => ControlFlow::Break(RunOutcome::Errored(error.to_string())),
    }
}

/// Runs `workflow` until it completes, fails, or is terminated.
pub async fn drive<W: Workflow>(
    workflow: &W,
    event: WorkflowEvent<W::Params>,
    step: &WorkflowStep,
) -> RunOutcome {
    let instance_id = event.instance_id.clone();
    let mut restarts: u32 = 0;

    loop {
        debug!("Instance '{}': running body (restart {})", instance_id, restarts);

        match classify(workflow.run(event.clone(), step.clone()).await) {
            ControlFlow::Continue(signal) => {
                restarts += 1;
                info!("Instance '{}': {}; restarting body", instance_id, signal);
            }
            ControlFlow::Break(outcome) => {
                match &outcome {
                    RunOutcome::Completed => {
                        info!("Instance '{}' completed after {} restarts", instance_id, restarts)
                    }
                    RunOutcome::Terminated(_) => warn!("Instance '{}' terminated", instance_id),
                    RunOutcome::Errored(message) => {
                        error!("Instance '{}' errored: {}", instance_id, message)
                    }
                }
                return outcome;
            }
        }
    }
}
