//! The stdin/stdout line protocol.
//!
//! Each request is one line: `ping`, or a JSON [`CompilationRequest`].
//! Each response is a marker line (`pong`, `success`, `error`, `panic`)
//! followed by one payload line, except `pong` which has none.

pub mod request;
pub mod response;

pub use request::{normalize_line, CompilationRequest, Request, PING};
pub use response::Response;
