//! SSH client side of the proxy

mod connector;

pub use connector::{SshConnection, SshConnector, SshShell};
