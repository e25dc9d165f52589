//! Error taxonomy for the compiler service.
//!
//! Three tiers, matching how far a failure may travel:
//!
//! - user errors are not errors here at all; they are diagnostics carried
//!   by [`RunOutcome::Diagnostics`](crate::sandbox::RunOutcome)
//! - [`RequestError`] fails one request; the loop answers `panic` and
//!   continues
//! - [`FatalError`] escapes the loop to the guard, which answers `panic`
//!   and ends the process
//!
//! [`StartupError`] covers everything that can go wrong before the loop
//! starts.

use std::path::PathBuf;

use constraints_lang::{SerializeError, UnknownLevel};

use crate::sandbox::SandboxError;

/// Failures while building the process-wide state.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to read library file {}: {source}", path.display())]
    ReadLibrary {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("library file {file} does not parse: {first}")]
    LibrarySyntax { file: String, first: String },

    #[error("failed to read compiler config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid compiler config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid compiler config: {0}")]
    Level(#[from] UnknownLevel),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// A failure confined to one request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("result could not be serialized: {0}")]
    Serialize(#[from] SerializeError),
}

/// A failure that ends the process.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("result of kind {kind} has no structural representation and was not serializable")]
    NoStructure { kind: &'static str },

    #[error("failed to read request line: {0}")]
    Input(#[source] std::io::Error),

    #[error("failed to write response: {0}")]
    Output(#[source] std::io::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("request loop panicked: {0}")]
    Panicked(String),
}
