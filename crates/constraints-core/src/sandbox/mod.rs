//! Sandbox: time-bounded compilation and execution of user snippets.
//!
//! A request's source bundle is parsed, checked, and run on a dedicated
//! worker thread. The caller waits at most the request's timeout; an
//! abandoned worker is told to stop through its budget and its result is
//! discarded.
//!
//! # Modules
//!
//! - [`request`]: `RunRequest`, `SourceFile`, `RunOutcome`
//! - [`runner`]: `CodeRunner` trait and the `UserCodeRunner`
//! - [`execution`]: `SandboxConfig`, `execute_with_deadline()`
//! - [`error`]: `SandboxError` / `SandboxResult`

pub mod error;
pub mod execution;
pub mod request;
pub mod runner;

pub use error::{SandboxError, SandboxResult};
pub use execution::{execute_with_deadline, SandboxConfig};
pub use request::{RunOutcome, RunRequest, SourceFile};
pub use runner::{CodeRunner, UserCodeRunner, USER_FILE};
