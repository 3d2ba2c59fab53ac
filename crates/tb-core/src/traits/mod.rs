//! Core trait definitions

mod connector;

pub use connector::{RemoteConnection, RemoteConnector, RemoteShell, ShellOutput};
