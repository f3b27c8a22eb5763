//! Bulk-send tasks: the record type, the registry and the execution engine.

pub mod engine;
pub mod registry;
pub mod types;

pub use engine::TaskEngine;
pub use registry::{TaskHandle, TaskRegistry};
pub use types::{MessageFailure, Recipients, StartTask, TaskRecord};
