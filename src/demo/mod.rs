//! Demo Workflow
//!
//! A small workflow body and its storage adapter, used by the CLI and the
//! end-to-end tests.
//!
//! - [`cube`]: squares a number, optionally pauses or waits for an event,
//!   then stores its cube
//! - [`store`]: the number store the body writes its result to

pub mod cube;
pub mod store;

pub use cube::{CubeParams, CubeWorkflow, PAUSE_VALUE, WEATHER_EVENT, WEATHER_VALUE};
pub use store::{MemoryNumberStore, NumberStore};
