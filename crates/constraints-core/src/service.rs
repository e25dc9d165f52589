//! The request loop: one line in, one framed response out, strictly in
//! order.

use std::sync::Arc;
use std::time::Instant;

use constraints_lang::Category;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

use crate::error::{FatalError, RequestError};
use crate::metrics::METRICS;
use crate::obs::{
    emit_diagnostics, emit_request_completed, emit_request_panic, emit_request_received, emit_timeout,
    RequestSpan,
};
use crate::protocol::{normalize_line, CompilationRequest, Request, Response};
use crate::sandbox::{CodeRunner, RunOutcome, RunRequest, SourceFile, UserCodeRunner};
use crate::state::ServiceState;

/// File name the request's generated declarations are reported under.
pub const MISSION_MODEL_FILE: &str = "mission-model-generated-code.edsl";

/// Type every snippet must return.
pub const EXPECTED_OUTPUT_TYPE: &str = "Constraint";

/// Answers request lines against the shared [`ServiceState`].
pub struct RequestHandler<R: CodeRunner = UserCodeRunner> {
    state: Arc<ServiceState>,
    runner: R,
}

impl RequestHandler<UserCodeRunner> {
    pub fn new(state: Arc<ServiceState>) -> Self {
        let runner = UserCodeRunner::new(state.sandbox().worker_stack_bytes);
        Self { state, runner }
    }
}

impl<R: CodeRunner> RequestHandler<R> {
    pub fn with_runner(state: Arc<ServiceState>, runner: R) -> Self {
        Self { state, runner }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Bundle for one compile request: library units, then the request's
    /// generated declarations, then the snippet.
    pub fn run_request(&self, request: CompilationRequest) -> RunRequest {
        let mut files: Vec<SourceFile> = self
            .state
            .library()
            .units()
            .map(|unit| SourceFile::Parsed(Arc::clone(unit)))
            .collect();
        files.push(SourceFile::text(MISSION_MODEL_FILE, request.mission_model_generated_code));

        RunRequest {
            user_source: request.constraint_code,
            closure_arguments: Vec::new(),
            expected_output_type: EXPECTED_OUTPUT_TYPE.to_string(),
            extra_type_roots: Vec::new(),
            timeout_ms: self.state.sandbox().timeout_ms,
            additional_source_files: files,
            level: self.state.level(),
        }
    }

    /// Answer one normalized line.
    ///
    /// Failures confined to the request come back as a `panic` response;
    /// only [`FatalError`]s are returned as errors.
    pub async fn handle_line(&self, line: &str) -> Result<Response, FatalError> {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(err) => {
                emit_request_received("malformed", line.len());
                return Ok(request_failed(&err, line));
            }
        };
        emit_request_received(request.kind(), line.len());

        match request {
            Request::Ping => {
                METRICS.inc_pings();
                Ok(Response::Pong)
            }
            Request::Compile(compile) => self.compile(compile, line).await,
        }
    }

    async fn compile(&self, request: CompilationRequest, line: &str) -> Result<Response, FatalError> {
        let outcome = match self.runner.execute(self.run_request(request)).await {
            Ok(outcome) => outcome,
            Err(err) => return Ok(request_failed(&RequestError::from(err), line)),
        };

        match outcome {
            RunOutcome::Diagnostics(records) => {
                if records.iter().any(|r| r.category == Category::Timeout) {
                    METRICS.inc_timeouts();
                    emit_timeout(self.state.sandbox().timeout_ms.get());
                }
                METRICS.inc_diagnostics();
                emit_diagnostics(records.len());
                Ok(Response::Error(records))
            }
            RunOutcome::Success(value) => {
                let Some(node) = value.ast_node() else {
                    return Err(FatalError::NoStructure {
                        kind: value.kind_name(),
                    });
                };
                match node.to_json() {
                    Ok(json) => {
                        METRICS.inc_successes();
                        Ok(Response::Success(json))
                    }
                    Err(err) => Ok(request_failed(&RequestError::from(err), line)),
                }
            }
        }
    }

    /// Read lines until end of input, answering each before reading the
    /// next. Returns `Ok(())` on clean end of input.
    pub async fn serve<I, O>(&self, mut input: I, output: &mut O) -> Result<(), FatalError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = input.read_until(b'\n', &mut buf).await.map_err(FatalError::Input)?;
            if read == 0 {
                tracing::debug!("input closed");
                return Ok(());
            }
            METRICS.inc_requests();

            let line = normalize_line(&buf);
            let span = RequestSpan::new();
            let started = Instant::now();
            let response = self.handle_line(&line).instrument(span.span()).await?;

            let text = response.encode().map_err(FatalError::Encode)?;
            output.write_all(text.as_bytes()).await.map_err(FatalError::Output)?;
            output.flush().await.map_err(FatalError::Output)?;

            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            span.span()
                .in_scope(|| emit_request_completed(response.marker(), elapsed_ms));
        }
    }
}

fn request_failed(err: &RequestError, line: &str) -> Response {
    METRICS.inc_panics();
    emit_request_panic(err);
    Response::request_panic(&err.to_string(), line)
}
