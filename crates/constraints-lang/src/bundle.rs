//! Source bundles: declaration units plus one snippet, checked as a whole.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{Block, Module};
use crate::diagnostic::{Diagnostic, DiagnosticRecord};
use crate::interp::{Budget, Exhausted, Meter};
use crate::level::LanguageLevel;
use crate::parser::{parse_module_metered, parse_snippet_metered};
use crate::span::{SourceUnit, UnitId};

/// A declaration unit, parsed once and shareable between bundles.
#[derive(Debug)]
pub struct ParsedUnit {
    pub source: SourceUnit,
    pub module: Module,
    /// Syntax diagnostics, relative to this unit.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedUnit {
    pub fn parse(name: impl Into<String>, text: impl Into<String>, level: LanguageLevel) -> Self {
        let budget = Budget::unlimited();
        Self::parse_metered(name, text, level, &Meter::new(&budget))
    }

    /// Parse under `budget`, giving up once it runs out.
    pub fn parse_within(
        name: impl Into<String>,
        text: impl Into<String>,
        level: LanguageLevel,
        budget: &Budget,
    ) -> Result<Self, Exhausted> {
        let meter = Meter::new(budget);
        let unit = Self::parse_metered(name, text, level, &meter);
        meter.check().map(|()| unit)
    }

    fn parse_metered(name: impl Into<String>, text: impl Into<String>, level: LanguageLevel, meter: &Meter<'_>) -> Self {
        let source = SourceUnit::new(name, text);
        let (module, diagnostics) = parse_module_metered(source.text(), level, meter);
        Self {
            source,
            module,
            diagnostics,
        }
    }
}

/// The user snippet: the body of an anonymous function.
#[derive(Debug)]
pub struct ParsedSnippet {
    pub source: SourceUnit,
    pub body: Arc<Block>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedSnippet {
    pub fn parse(name: impl Into<String>, text: impl Into<String>, level: LanguageLevel) -> Self {
        let budget = Budget::unlimited();
        Self::parse_metered(name, text, level, &Meter::new(&budget))
    }

    pub fn parse_within(
        name: impl Into<String>,
        text: impl Into<String>,
        level: LanguageLevel,
        budget: &Budget,
    ) -> Result<Self, Exhausted> {
        let meter = Meter::new(budget);
        let snippet = Self::parse_metered(name, text, level, &meter);
        meter.check().map(|()| snippet)
    }

    fn parse_metered(name: impl Into<String>, text: impl Into<String>, level: LanguageLevel, meter: &Meter<'_>) -> Self {
        let source = SourceUnit::new(name, text);
        let (body, diagnostics) = parse_snippet_metered(source.text(), level, meter);
        Self {
            source,
            body: Arc::new(body),
            diagnostics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    #[error("duplicate source unit '{0}' in bundle")]
    DuplicateUnit(String),

    #[error("too many source units in bundle ({0})")]
    TooManyUnits(usize),
}

/// Ordered units followed by the snippet. Unit names are unique.
///
/// Diagnostics produced against a bundle carry the [`UnitId`] of the unit
/// they point into: declaration units are numbered in order and the
/// snippet comes last.
#[derive(Debug)]
pub struct SourceBundle {
    units: Vec<Arc<ParsedUnit>>,
    snippet: ParsedSnippet,
}

impl SourceBundle {
    pub fn new(units: Vec<Arc<ParsedUnit>>, snippet: ParsedSnippet) -> Result<Self, BundleError> {
        if units.len() >= UnitId::MAX as usize {
            return Err(BundleError::TooManyUnits(units.len() + 1));
        }
        let mut seen = HashSet::new();
        for name in units
            .iter()
            .map(|u| u.source.name())
            .chain(std::iter::once(snippet.source.name()))
        {
            if !seen.insert(name) {
                return Err(BundleError::DuplicateUnit(name.to_string()));
            }
        }
        Ok(Self { units, snippet })
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &ParsedUnit)> {
        self.units
            .iter()
            .enumerate()
            .map(|(i, unit)| (i as UnitId, unit.as_ref()))
    }

    pub fn snippet(&self) -> &ParsedSnippet {
        &self.snippet
    }

    pub fn snippet_unit(&self) -> UnitId {
        self.units.len() as UnitId
    }

    pub fn source(&self, unit: UnitId) -> &SourceUnit {
        self.units
            .get(unit as usize)
            .map(|u| &u.source)
            .unwrap_or(&self.snippet.source)
    }

    /// Syntax diagnostics of every unit, in bundle order.
    pub fn syntax_diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (id, unit) in self.units() {
            out.extend(unit.diagnostics.iter().cloned().map(|d| d.in_unit(id)));
        }
        let snippet_unit = self.snippet_unit();
        out.extend(
            self.snippet
                .diagnostics
                .iter()
                .cloned()
                .map(|d| d.in_unit(snippet_unit)),
        );
        out
    }

    pub fn record(&self, diagnostic: &Diagnostic) -> DiagnosticRecord {
        diagnostic.to_record(self.source(diagnostic.unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Category;

    fn unit(name: &str, text: &str) -> Arc<ParsedUnit> {
        Arc::new(ParsedUnit::parse(name, text, LanguageLevel::default()))
    }

    #[test]
    fn duplicate_unit_names_rejected() {
        let err = SourceBundle::new(
            vec![unit("a.edsl", ""), unit("a.edsl", "")],
            ParsedSnippet::parse("constraint.edsl", "", LanguageLevel::default()),
        )
        .unwrap_err();
        assert_eq!(err, BundleError::DuplicateUnit("a.edsl".into()));

        let err = SourceBundle::new(
            vec![unit("constraint.edsl", "")],
            ParsedSnippet::parse("constraint.edsl", "", LanguageLevel::default()),
        )
        .unwrap_err();
        assert_eq!(err, BundleError::DuplicateUnit("constraint.edsl".into()));
    }

    #[test]
    fn syntax_diagnostics_are_tagged_with_units() {
        let bundle = SourceBundle::new(
            vec![unit("a.edsl", "type A;"), unit("b.edsl", "type ;")],
            ParsedSnippet::parse("constraint.edsl", "return )", LanguageLevel::default()),
        )
        .unwrap();
        let diags = bundle.syntax_diagnostics();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].unit, 1);
        assert_eq!(diags[1].unit, 2);
        assert_eq!(bundle.snippet_unit(), 2);

        let record = bundle.record(&diags[1]);
        assert_eq!(record.category, Category::Syntax);
        assert_eq!(record.location.file, "constraint.edsl");
        assert_eq!(record.location.column, 8);
    }

    #[test]
    fn parse_within_gives_up_on_spent_budget() {
        use std::sync::atomic::AtomicBool;

        let budget = Budget::new(None, Arc::new(AtomicBool::new(true)));
        let unit = ParsedUnit::parse_within("a.edsl", "type A;", LanguageLevel::default(), &budget);
        assert_eq!(unit.unwrap_err(), Exhausted);
        let snippet = ParsedSnippet::parse_within("constraint.edsl", "return 1;", LanguageLevel::default(), &budget);
        assert!(snippet.is_err());

        let unit = ParsedUnit::parse_within("a.edsl", "type A;", LanguageLevel::default(), &Budget::unlimited()).unwrap();
        assert_eq!(unit.module.decls.len(), 1);
    }
}
