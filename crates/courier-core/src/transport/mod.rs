//! Chat-transport abstractions (the protocol lives in adapter crates).

pub mod port;
pub mod types;

pub use port::{Connection, Transport};
pub use types::{ConnectionEvent, OpenedSession};
