//! Error types for the sandbox module.

use std::path::PathBuf;

use constraints_lang::BundleError;

/// Errors produced by the sandbox layer.
///
/// None of these are user diagnostics: each one fails the request it
/// happened in.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The worker did not answer within the limit.
    #[error("execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// User code raised at runtime; carries the rendered stack trace.
    #[error("{0}")]
    Runtime(String),

    #[error("sandbox worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("failed to start sandbox worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("invalid source bundle: {0}")]
    Bundle(#[from] BundleError),

    #[error("failed to read type root {}: {source}", path.display())]
    TypeRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
