//! Task registry and composer for the sitepipe asset pipeline.
//!
//! Tasks are registered by name and are either actions (zero-argument async
//! operations) or compositions of other tasks run in series or in parallel.
//! Compositions nest arbitrarily and may refer to registered tasks by name.

mod join;
pub mod registry;
pub mod task;

pub use registry::{TaskError, TaskRegistry};
pub use task::{Action, ActionError, ActionResult, BoxFuture, Task};
