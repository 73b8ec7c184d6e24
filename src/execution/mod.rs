//! Workflow Execution Module
//!
//! Provides the suspension and step-execution machinery that workflow
//! bodies run on: pause gates, retrying step calls, event waits and the
//! loop that drives a body to its terminal outcome.
//!
//! # Architecture
//!
//! - [`gate`]: Re-armable latch behind pause/resume and event waits
//! - [`step`]: Step execution with retry and termination semantics
//! - [`middleware`]: Hooks layered around every step attempt
//! - [`events`]: Event delivery and timeouts for waiting bodies
//! - [`engine`]: Body driver that restarts on retry signals
//! - [`error`]: Error taxonomy shared by the above

pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod middleware;
pub mod step;

pub use engine::{drive, RunOutcome};
pub use error::{BoxError, NonRetryableError, RetrySignal, StepError};
pub use events::{EventError, StepEvent, WaitOptions};
pub use gate::SuspensionGate;
pub use middleware::{PauseOnGate, StepMiddleware, ThrowFirstTime};
pub use step::{StepExecutor, WorkflowStep};
