//! tb-core: Core abstractions and configuration for termbridge
//!
//! This crate provides the shared types, error taxonomy, configuration
//! structures and the remote shell connector traits used by the proxy.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, ConnectorError, RegistryError};
pub use types::{Credentials, PtyRequest, SessionId, SessionState};
