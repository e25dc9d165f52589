//! Compiler diagnostics and their plain record form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::{Location, SourceUnit, Span, UnitId};

/// What kind of problem a diagnostic reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Syntax,
    UndefinedName,
    DuplicateName,
    UnknownType,
    CircularType,
    TypeMismatch,
    WrongArgCount,
    InvalidAssignment,
    MissingReturn,
    UnknownProperty,
    Timeout,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Syntax => "syntax",
            Category::UndefinedName => "undefined_name",
            Category::DuplicateName => "duplicate_name",
            Category::UnknownType => "unknown_type",
            Category::CircularType => "circular_type",
            Category::TypeMismatch => "type_mismatch",
            Category::WrongArgCount => "wrong_arg_count",
            Category::InvalidAssignment => "invalid_assignment",
            Category::MissingReturn => "missing_return",
            Category::UnknownProperty => "unknown_property",
            Category::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compile-time problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: Category,
    /// Unit the span points into.
    pub unit: UnitId,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic in unit 0; use [`Diagnostic::in_unit`] once the
    /// unit's position in the bundle is known.
    pub fn new(category: Category, span: Span, message: impl Into<String>) -> Self {
        Self {
            category,
            unit: 0,
            span,
            message: message.into(),
        }
    }

    pub fn in_unit(mut self, unit: UnitId) -> Self {
        self.unit = unit;
        self
    }

    /// Convert to a plain record using the unit the diagnostic points into.
    pub fn to_record(&self, source: &SourceUnit) -> DiagnosticRecord {
        DiagnosticRecord {
            category: self.category,
            message: self.message.clone(),
            location: RecordLocation::new(source.name(), source.location(self.span.start)),
            span: self.span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Where a record points, in human terms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl RecordLocation {
    pub fn new(file: &str, location: Location) -> Self {
        Self {
            file: file.to_string(),
            line: location.line,
            column: location.column,
        }
    }
}

/// Plain data form of a diagnostic, as sent to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub category: Category,
    pub message: String,
    pub location: RecordLocation,
    pub span: Span,
}

impl DiagnosticRecord {
    /// Record for a failure that has no better position than a unit start.
    pub fn at_unit_start(category: Category, source: &SourceUnit, message: String) -> Self {
        Diagnostic::new(category, Span::point(0), message).to_record(source)
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.location.file, self.location.line, self.location.column, self.category, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_serde_matches_display() {
        let categories = [
            Category::Syntax,
            Category::UndefinedName,
            Category::DuplicateName,
            Category::UnknownType,
            Category::CircularType,
            Category::TypeMismatch,
            Category::WrongArgCount,
            Category::InvalidAssignment,
            Category::MissingReturn,
            Category::UnknownProperty,
            Category::Timeout,
        ];
        for category in &categories {
            let json = serde_json::to_string(category).expect("serialize");
            assert_eq!(json, format!("\"{category}\""));
            let back: Category = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(*category, back);
        }
    }

    #[test]
    fn to_record_resolves_location() {
        let unit = SourceUnit::new("constraint.edsl", "const x = 1;\nreturn y;");
        let diag = Diagnostic::new(
            Category::UndefinedName,
            Span::new(20, 21),
            "cannot find name 'y'",
        )
        .in_unit(3);
        assert_eq!(diag.unit, 3);

        let record = diag.to_record(&unit);
        assert_eq!(record.location.file, "constraint.edsl");
        assert_eq!(record.location.line, 2);
        assert_eq!(record.location.column, 8);
        assert_eq!(record.span, Span::new(20, 21));
    }

    #[test]
    fn record_json_shape() {
        let unit = SourceUnit::new("constraint.edsl", "oops");
        let record = Diagnostic::new(Category::Syntax, Span::new(0, 4), "unexpected identifier")
            .to_record(&unit);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["category"], "syntax");
        assert_eq!(json["message"], "unexpected identifier");
        assert_eq!(json["location"]["line"], 1);
        assert_eq!(json["location"]["column"], 1);
        assert_eq!(json["span"]["start"], 0);
        assert_eq!(json["span"]["end"], 4);
    }

    #[test]
    fn record_display_is_compiler_style() {
        let unit = SourceUnit::new("lib.edsl", "x");
        let record = DiagnosticRecord::at_unit_start(Category::Timeout, &unit, "too slow".into());
        assert_eq!(record.to_string(), "lib.edsl:1:1: timeout: too slow");
    }
}
