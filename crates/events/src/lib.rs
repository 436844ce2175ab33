//! Carryover import event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. It doubles as a progress sink, so an import
//!   reports straight onto the bus.
//! - [`ImportEvent`]: the event envelope for import progress and lifecycle.

pub mod bus;

pub use bus::{EventBus, ImportEvent};
