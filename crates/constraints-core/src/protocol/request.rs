//! Request lines.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// The liveness check line.
pub const PING: &str = "ping";

/// Payload of a compile request line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationRequest {
    pub constraint_code: String,
    pub mission_model_generated_code: String,
}

/// One decoded input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Compile(CompilationRequest),
}

impl Request {
    /// Classify and decode a normalized line.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        if line == PING {
            return Ok(Request::Ping);
        }
        Ok(Request::Compile(serde_json::from_str(line)?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Compile(_) => "compile",
        }
    }
}

/// Text of a raw input line: lossy UTF-8, line terminator removed.
pub fn normalize_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    let text = text.strip_suffix('\r').unwrap_or(text);
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_is_exact() {
        assert_eq!(Request::parse("ping").unwrap(), Request::Ping);
        assert!(Request::parse(" ping").is_err());
        assert!(Request::parse("PING").is_err());
    }

    #[test]
    fn test_compile_request_is_camel_case() {
        let line = r#"{"constraintCode":"return x;","missionModelGeneratedCode":"type A;"}"#;
        match Request::parse(line).unwrap() {
            Request::Compile(req) => {
                assert_eq!(req.constraint_code, "return x;");
                assert_eq!(req.mission_model_generated_code, "type A;");
            }
            other => panic!("expected Compile, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        match Request::parse(r#"{"constraintCode":"x"}"#) {
            Err(RequestError::Decode(err)) => assert!(err.to_string().contains("missionModelGeneratedCode")),
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(normalize_line(b"ping\n"), "ping");
        assert_eq!(normalize_line(b"ping\r\n"), "ping");
        assert_eq!(normalize_line(b"ping"), "ping");
        assert_eq!(normalize_line(b"\xffping\n"), "\u{fffd}ping");
    }
}
