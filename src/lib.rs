//! localflow - Local Workflow Execution Engine
//!
//! An in-process engine for long-lived, suspendable workflows built from
//! independently retryable steps. A workflow body runs on the tokio runtime
//! and calls into the engine to execute labeled steps and to wait for
//! external events, while callers pause, resume, terminate and observe each
//! instance from the outside.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`execution`]: Suspension gates, step execution, event waits and the
//!   body driver
//! - [`workflow`]: The workflow contract, instances and the registry
//! - [`monitoring`]: Per-instance step timeline
//! - [`demo`]: The cube workflow and its number store
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use localflow::demo::{CubeParams, CubeWorkflow, MemoryNumberStore};
//! use localflow::workflow::{CreateOptions, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(Registry::new());
//!     let store = Arc::new(MemoryNumberStore::new());
//!
//!     let workflow = CubeWorkflow::new(store.clone(), Arc::clone(&registry));
//!     let instance = registry.create(CreateOptions::new(CubeParams { value: 2 }), workflow)?;
//!
//!     // done() never fails; inspect the status afterwards
//!     instance.done().await;
//!     println!("{}", instance.status());
//!     Ok(())
//! }
//! ```

pub mod demo;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use execution::{BoxError, NonRetryableError, StepError, WaitOptions, WorkflowStep};
pub use workflow::{CreateOptions, Instance, InstanceStatus, Registry, Workflow, WorkflowEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "localflow";
