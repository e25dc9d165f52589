//! The user code runner: bundle assembly, checking, and execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use constraints_lang::{
    Budget, Category, CompileError, DiagnosticRecord, ParsedSnippet, ParsedUnit, Program, SourceBundle, SourceUnit,
};

use super::error::{SandboxError, SandboxResult};
use super::execution::{execute_with_deadline, SandboxConfig, DEFAULT_WORKER_STACK_BYTES};
use super::request::{RunOutcome, RunRequest, SourceFile};

/// File name the snippet is reported under.
pub const USER_FILE: &str = "constraint.edsl";

/// Extension of declaration files picked up from type roots.
pub const SOURCE_EXTENSION: &str = "edsl";

/// Compiles and runs one request.
///
/// Implementations must not retain anything between calls.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn execute(&self, request: RunRequest) -> SandboxResult<RunOutcome>;
}

/// Runs requests with the constraint script compiler and interpreter.
#[derive(Debug, Clone)]
pub struct UserCodeRunner {
    worker_stack_bytes: usize,
}

impl Default for UserCodeRunner {
    fn default() -> Self {
        Self {
            worker_stack_bytes: DEFAULT_WORKER_STACK_BYTES,
        }
    }
}

impl UserCodeRunner {
    pub fn new(worker_stack_bytes: usize) -> Self {
        Self { worker_stack_bytes }
    }
}

#[async_trait]
impl CodeRunner for UserCodeRunner {
    async fn execute(&self, request: RunRequest) -> SandboxResult<RunOutcome> {
        let RunRequest {
            user_source,
            closure_arguments,
            expected_output_type,
            extra_type_roots,
            timeout_ms,
            additional_source_files,
            level,
        } = request;

        let mut files = additional_source_files;
        for root in &extra_type_roots {
            files.extend(read_type_root(root)?);
        }

        let config = SandboxConfig {
            timeout_ms,
            worker_stack_bytes: self.worker_stack_bytes,
        };
        // Kept for the timeout diagnostic, since the worker owns the snippet.
        let user_unit = SourceUnit::new(USER_FILE, user_source.as_str());

        // Parsing, checking, and running all spend the same budget.
        let job = move |budget: Budget| -> SandboxResult<RunOutcome> {
            let timed_out = || SandboxError::Timeout {
                limit_ms: timeout_ms.get(),
            };
            let units = files
                .into_iter()
                .map(|f| f.into_unit(level, &budget))
                .collect::<Result<Vec<Arc<ParsedUnit>>, _>>()
                .map_err(|_| timed_out())?;
            let snippet = ParsedSnippet::parse_within(USER_FILE, user_source, level, &budget).map_err(|_| timed_out())?;
            let bundle = SourceBundle::new(units, snippet)?;

            let program = match Program::compile(&bundle, &expected_output_type, closure_arguments, &budget) {
                Ok(program) => program,
                Err(CompileError::Diagnostics(diagnostics)) => {
                    let records = diagnostics.iter().map(|d| bundle.record(d)).collect();
                    return Ok(RunOutcome::Diagnostics(records));
                }
                Err(CompileError::Cancelled(_)) => return Err(timed_out()),
            };

            match program.run(&budget) {
                Ok(value) => Ok(RunOutcome::Success(value)),
                Err(err) if err.is_cancelled() => Err(timed_out()),
                Err(err) => Err(SandboxError::Runtime(err.render(&bundle))),
            }
        };

        match execute_with_deadline(&config, job).await {
            Ok(Err(SandboxError::Timeout { limit_ms })) | Err(SandboxError::Timeout { limit_ms }) => {
                Ok(timeout_outcome(&user_unit, limit_ms))
            }
            Ok(result) => result,
            Err(err) => Err(err),
        }
    }
}

/// Deadline expiry is reported as a diagnostic on the snippet.
fn timeout_outcome(user_unit: &SourceUnit, limit_ms: u64) -> RunOutcome {
    tracing::debug!(limit_ms, "execution exceeded its time limit");
    RunOutcome::Diagnostics(vec![DiagnosticRecord::at_unit_start(
        Category::Timeout,
        user_unit,
        format!("execution timed out after {limit_ms}ms"),
    )])
}

/// `*.edsl` files directly under `root`, sorted by file name.
fn read_type_root(root: &Path) -> SandboxResult<Vec<SourceFile>> {
    let root_error = |source| SandboxError::TypeRoot {
        path: root.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(root_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let contents = std::fs::read_to_string(&path).map_err(|source| SandboxError::TypeRoot {
                path: path.clone(),
                source,
            })?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(SourceFile::text(filename, contents))
        })
        .collect()
}
