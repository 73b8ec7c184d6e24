//! Workflow Model
//!
//! The contract between the engine and user workflow bodies.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use localflow::execution::{BoxError, StepError, WorkflowStep};
//! use localflow::workflow::{Workflow, WorkflowEvent};
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Workflow for Greet {
//!     type Params = String;
//!
//!     async fn run(&self, event: WorkflowEvent<String>, step: WorkflowStep) -> Result<(), StepError> {
//!         let name = event.payload.as_str();
//!         step.run("greet", move || async move {
//!             println!("hello {}", name);
//!             Ok::<_, BoxError>(())
//!         })
//!         .await
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::error::StepError;
use crate::execution::step::WorkflowStep;

/// A workflow body.
///
/// Any adapters the body needs (stores, clients, a registry handle) are
/// fields of the implementing type; the engine never inspects them.
///
/// With the default retry strategy a failing step restarts `run` from the
/// top, so steps before the failure run again and must be safe to replay.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Caller-defined input, opaque to the engine
    type Params: Clone + Send + Sync + 'static;

    async fn run(
        &self,
        event: WorkflowEvent<Self::Params>,
        step: WorkflowStep,
    ) -> Result<(), StepError>;
}

/// The input event a body is started with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent<P> {
    pub payload: P,
    pub timestamp: DateTime<Utc>,
    pub instance_id: String,
}

/// Options for creating an instance.
#[derive(Debug, Clone)]
pub struct CreateOptions<P> {
    /// Instance identifier; a UUID is generated when absent
    pub id: Option<String>,
    pub params: P,
}

impl<P> CreateOptions<P> {
    pub fn new(params: P) -> Self {
        Self { id: None, params }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_options() {
        let options = CreateOptions::new(2).with_id("test-2");
        assert_eq!(options.id.as_deref(), Some("test-2"));
        assert_eq!(options.params, 2);
        assert!(CreateOptions::new(()).id.is_none());
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = WorkflowEvent {
            payload: 42,
            timestamp: Utc::now(),
            instance_id: "abc".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["instanceId"], "abc");
        assert_eq!(json["payload"], 42);
    }
}
