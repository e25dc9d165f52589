//! Last-resort handling around the request loop.
//!
//! Anything that escapes [`RequestHandler::serve`], whether a
//! [`FatalError`] or a panic, is reported on the output channel as a
//! `panic` framing and turns into a nonzero exit.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use crate::error::FatalError;
use crate::obs::emit_fatal;
use crate::protocol::Response;
use crate::sandbox::execution::panic_message;
use crate::sandbox::CodeRunner;
use crate::service::RequestHandler;

/// How the guarded loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Input reached end of stream.
    Clean,
    /// The loop failed; `description` was written as a `panic` framing.
    Fatal { description: String },
}

impl GuardOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            GuardOutcome::Clean => 0,
            GuardOutcome::Fatal { .. } => 1,
        }
    }
}

/// Serve `input` until it ends, catching whatever escapes the loop.
pub async fn run_guarded<R, I, O>(handler: &RequestHandler<R>, input: I, mut output: O) -> GuardOutcome
where
    R: CodeRunner,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let result = AssertUnwindSafe(handler.serve(input, &mut output))
        .catch_unwind()
        .await;

    let fatal = match result {
        Ok(Ok(())) => return GuardOutcome::Clean,
        Ok(Err(err)) => err,
        Err(payload) => FatalError::Panicked(panic_message(&*payload)),
    };
    let description = fatal.to_string();
    emit_fatal(&description);

    write_fatal(&mut output, &description).await;
    GuardOutcome::Fatal { description }
}

async fn write_fatal<O: AsyncWrite + Unpin>(output: &mut O, description: &str) {
    let text = match Response::fatal_panic(description).encode() {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode fatal response");
            return;
        }
    };
    let written = async {
        output.write_all(text.as_bytes()).await?;
        output.flush().await
    };
    if let Err(err) = written.await {
        tracing::error!(error = %err, "failed to write fatal response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(GuardOutcome::Clean.exit_code(), 0);
        assert_eq!(
            GuardOutcome::Fatal {
                description: "x".into()
            }
            .exit_code(),
            1
        );
    }

    #[tokio::test]
    async fn test_write_fatal_frames_description() {
        let mut out = Vec::new();
        write_fatal(&mut out, "request loop panicked: boom").await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "panic\n\"request loop panicked: boom\"\n"
        );
    }
}
