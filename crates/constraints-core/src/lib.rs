//! Constraints Core Library
//!
//! The compile-and-execute service around `constraints-lang`: fixed library
//! loading, the time-bounded sandbox, the line protocol, and the guarded
//! request loop.

pub mod compiler_config;
pub mod error;
pub mod guard;
pub mod library;
pub mod metrics;
pub mod obs;
pub mod protocol;
pub mod sandbox;
pub mod service;
pub mod state;
pub mod telemetry;

pub use compiler_config::{CompilerConfig, CONFIG_FILE};
pub use error::{FatalError, RequestError, StartupError};
pub use guard::{run_guarded, GuardOutcome};
pub use library::{FixedLibrary, LibraryUnit, AST_FILE, FLUENT_FILE, LIBRARY_FILES, LIBS_DIR};
pub use metrics::METRICS;
pub use protocol::{CompilationRequest, Request, Response};
pub use sandbox::{
    CodeRunner, RunOutcome, RunRequest, SandboxConfig, SandboxError, SandboxResult, SourceFile,
    UserCodeRunner, USER_FILE,
};
pub use service::{RequestHandler, EXPECTED_OUTPUT_TYPE, MISSION_MODEL_FILE};
pub use state::ServiceState;
pub use telemetry::init_tracing;
