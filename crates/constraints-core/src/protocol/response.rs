//! Response framing: a marker line, then (except for `pong`) one payload
//! line.

use constraints_lang::DiagnosticRecord;

/// One framed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Pong,
    /// Structural representation of the produced value.
    Success(serde_json::Value),
    /// Diagnostics, in compiler order.
    Error(Vec<DiagnosticRecord>),
    /// Free-text failure description.
    Panic(String),
}

impl Response {
    /// Panic framing for a request that failed locally: the JSON-encoded
    /// description, then the offending line.
    pub fn request_panic(description: &str, line: &str) -> Self {
        let quoted = serde_json::Value::String(description.to_string());
        Response::Panic(format!("{quoted} attempted to handle: {line}"))
    }

    /// Panic framing written by the fatal guard.
    pub fn fatal_panic(description: &str) -> Self {
        Response::Panic(serde_json::Value::String(description.to_string()).to_string())
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Response::Pong => "pong",
            Response::Success(_) => "success",
            Response::Error(_) => "error",
            Response::Panic(_) => "panic",
        }
    }

    /// Wire text, newline-terminated.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let marker = self.marker();
        Ok(match self {
            Response::Pong => format!("{marker}\n"),
            Response::Success(json) => format!("{marker}\n{}\n", serde_json::to_string(json)?),
            Response::Error(records) => format!("{marker}\n{}\n", serde_json::to_string(records)?),
            Response::Panic(text) => format!("{marker}\n{}\n", single_line(text)),
        })
    }
}

/// Keep a payload on one line so framing stays intact.
fn single_line(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}
