//! Pending Registry and the `PendingEntry` lifecycle.

mod entry;
mod registry;

pub use entry::{PendingEntry, PendingState, RetryState};
pub use registry::{PendingRegistry, RegistryChange, RegistryObserver};
