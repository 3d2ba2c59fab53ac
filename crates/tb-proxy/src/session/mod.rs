//! Session management

mod coordinator;
mod registry;
mod remote;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{SessionCoordinator, SessionSettings};
pub use registry::{SessionLease, SessionRegistry};
pub use remote::{RemoteEvent, RemoteEventKind, RemoteHandle, ShellCommand, CONNECT_TIMEOUT};
