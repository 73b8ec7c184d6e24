//! Workflow Definition Module
//!
//! Provides the workflow contract, step configuration, and the instance
//! lifecycle built around them.
//!
//! # Structure
//!
//! - [`model`]: The `Workflow` trait and its input event
//! - [`config`]: Step retry configuration and durations
//! - [`settings`]: Engine settings and YAML loading
//! - [`state`]: Instance status values
//! - [`instance`]: Per-instance state machine and control surface
//! - [`registry`]: Instance creation and lookup

pub mod config;
pub mod instance;
pub mod model;
pub mod registry;
pub mod settings;
pub mod state;

pub use config::{Backoff, DurationError, DurationUnit, RetryConfig, StepConfig, WorkflowDuration};
pub use instance::Instance;
pub use model::{CreateOptions, Workflow, WorkflowEvent};
pub use registry::{Registry, RegistryError};
pub use settings::{load_settings, EngineSettings, RetryStrategy, DEFAULT_RETRY_LIMIT};
pub use state::InstanceStatus;
