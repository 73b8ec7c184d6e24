//! Execution Monitoring Module
//!
//! Tracks step attempts for each workflow instance.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step start/end/retry record for summaries

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
