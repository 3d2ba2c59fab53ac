//! Core error types for termbridge

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by the remote shell connector.
///
/// The `Display` text is what the browser sees in an `error` frame, so it
/// must never contain credentials.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Server rejected the username/password
    #[error("Authentication failed")]
    Auth,

    /// TCP connect, handshake or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt did not complete within the connect bound
    #[error("Connection timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Pty or shell allocation failed on an authenticated connection
    #[error("Shell error: {0}")]
    Shell(String),

    /// The shell stream or connection is already gone
    #[error("Remote connection closed")]
    Closed,
}

/// Connection registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Admission limit reached
    #[error("Session limit reached ({max} active sessions)")]
    LimitReached { max: usize },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
