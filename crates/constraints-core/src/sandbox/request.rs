//! Run request and outcome types.

use std::num::NonZeroU64;
use std::path::PathBuf;
use std::sync::Arc;

use constraints_lang::{Budget, DiagnosticRecord, Exhausted, LanguageLevel, ParsedUnit, Value};

/// A declaration unit handed to the runner alongside the snippet.
#[derive(Debug, Clone)]
pub enum SourceFile {
    /// Parsed once at startup and shared across requests.
    Parsed(Arc<ParsedUnit>),
    /// Per-request text, parsed inside the sandbox.
    Text { filename: String, contents: String },
}

impl SourceFile {
    pub fn text(filename: impl Into<String>, contents: impl Into<String>) -> Self {
        SourceFile::Text {
            filename: filename.into(),
            contents: contents.into(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            SourceFile::Parsed(unit) => unit.source.name(),
            SourceFile::Text { filename, .. } => filename,
        }
    }

    /// Parse text sources under `budget`; parsed units pass through.
    pub(crate) fn into_unit(self, level: LanguageLevel, budget: &Budget) -> Result<Arc<ParsedUnit>, Exhausted> {
        match self {
            SourceFile::Parsed(unit) => Ok(unit),
            SourceFile::Text { filename, contents } => {
                ParsedUnit::parse_within(filename, contents, level, budget).map(Arc::new)
            }
        }
    }
}

/// Everything one execution needs. Consumed by the runner.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Snippet source: the body of an anonymous function.
    pub user_source: String,
    /// Constants visible to the snippet.
    pub closure_arguments: Vec<(String, Value)>,
    /// Name of the type every `return` must be assignable to.
    pub expected_output_type: String,
    /// Directories whose `*.edsl` files join the bundle.
    pub extra_type_roots: Vec<PathBuf>,
    pub timeout_ms: NonZeroU64,
    /// Declaration units, in bundle order, ahead of the type roots.
    pub additional_source_files: Vec<SourceFile>,
    pub level: LanguageLevel,
}

/// Outcome of a run that did not fail locally.
#[derive(Debug)]
pub enum RunOutcome {
    /// The snippet returned this value.
    Success(Value),
    /// Compilation failed, or execution hit the time limit. Never empty.
    Diagnostics(Vec<DiagnosticRecord>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_file_names() {
        let parsed = SourceFile::Parsed(Arc::new(ParsedUnit::parse(
            "constraints-ast.edsl",
            "type Windows;",
            LanguageLevel::default(),
        )));
        assert_eq!(parsed.filename(), "constraints-ast.edsl");
        assert_eq!(SourceFile::text("model.edsl", "").filename(), "model.edsl");
    }

    #[test]
    fn test_text_source_parses_at_level() {
        let unit = SourceFile::text("model.edsl", "fn big() -> number { return 2 ** 10; }")
            .into_unit(LanguageLevel::L2019, &Budget::unlimited())
            .unwrap();
        assert_eq!(unit.diagnostics.len(), 1);
        assert!(unit.diagnostics[0].message.contains("2020"));
    }
}
