//! Hand-written recursive descent parser.
//!
//! ## Architecture
//!
//! - `stream`: token stream with lookahead
//! - `decl`: `type` and `fn` declarations
//! - `stmt`: statements and blocks
//! - `expr`: Pratt expression parser, atoms, lambdas
//! - `types`: type expressions
//!
//! Errors are reported as `syntax` diagnostics. The parser recovers at
//! statement and declaration boundaries so one pass reports several
//! problems; the returned tree contains everything that parsed cleanly.

mod decl;
mod expr;
mod stmt;
mod stream;
mod types;

use stream::TokenStream;

use crate::ast::{Block, Ident, Module};
use crate::diagnostic::{Category, Diagnostic};
use crate::interp::{Budget, Meter};
use crate::lexer::{lex, Token};
use crate::level::{Feature, LanguageLevel};
use crate::span::Span;

/// Deepest syntactic nesting accepted before the parser gives up.
///
/// Bounds recursion in the parser, the checker, and the interpreter.
pub const MAX_NESTING: usize = 256;

type PResult<T> = Result<T, Diagnostic>;

/// Parse a declaration unit.
pub fn parse_module(source: &str, level: LanguageLevel) -> (Module, Vec<Diagnostic>) {
    let budget = Budget::unlimited();
    parse_module_metered(source, level, &Meter::new(&budget))
}

/// Parse a snippet: the body of an anonymous function.
pub fn parse_snippet(source: &str, level: LanguageLevel) -> (Block, Vec<Diagnostic>) {
    let budget = Budget::unlimited();
    parse_snippet_metered(source, level, &Meter::new(&budget))
}

/// Parse a declaration unit, stopping early once `meter` runs out.
pub(crate) fn parse_module_metered(source: &str, level: LanguageLevel, meter: &Meter<'_>) -> (Module, Vec<Diagnostic>) {
    let lexed = lex(source, level);
    let mut parser = Parser::new(&lexed.tokens, source, level, meter);
    let module = parser.module();
    let mut diagnostics = lexed.diagnostics;
    diagnostics.extend(parser.diagnostics);
    (module, diagnostics)
}

pub(crate) fn parse_snippet_metered(source: &str, level: LanguageLevel, meter: &Meter<'_>) -> (Block, Vec<Diagnostic>) {
    let lexed = lex(source, level);
    let mut parser = Parser::new(&lexed.tokens, source, level, meter);
    let body = parser.snippet();
    let mut diagnostics = lexed.diagnostics;
    diagnostics.extend(parser.diagnostics);
    (body, diagnostics)
}

pub(crate) struct Parser<'t> {
    stream: TokenStream<'t>,
    level: LanguageLevel,
    diagnostics: Vec<Diagnostic>,
    depth: usize,
    meter: &'t Meter<'t>,
}

impl<'t> Parser<'t> {
    fn new(
        tokens: &'t [(Token, std::ops::Range<usize>)],
        source: &'t str,
        level: LanguageLevel,
        meter: &'t Meter<'t>,
    ) -> Self {
        Self {
            stream: TokenStream::new(tokens, source),
            level,
            diagnostics: Vec::new(),
            depth: 0,
            meter,
        }
    }

    fn module(&mut self) -> Module {
        let mut decls = Vec::new();
        while !self.stream.at_end() && self.meter.tick() {
            let before = self.stream.position();
            match self.decl() {
                Ok(decl) => decls.push(decl),
                Err(diag) => {
                    self.diagnostics.push(diag);
                    self.synchronize_decl(before);
                }
            }
        }
        Module { decls }
    }

    fn snippet(&mut self) -> Block {
        let mut body = Vec::new();
        while !self.stream.at_end() && !self.meter.is_exhausted() {
            if self.stream.check(&Token::RBrace) {
                let span = self.stream.current_span();
                self.stream.advance();
                self.diagnostics
                    .push(Diagnostic::new(Category::Syntax, span, "unexpected '}'"));
                continue;
            }
            if let Some(stmt) = self.stmt_recovering() {
                body.push(stmt);
            }
        }
        body
    }

    // === Error helpers ===

    fn error_here(&self, expected: &str) -> Diagnostic {
        let span = self.stream.current_span();
        let message = match self.stream.peek() {
            Some(token) => format!("expected {expected}, found {token}"),
            None => format!("expected {expected}, found end of input"),
        };
        Diagnostic::new(Category::Syntax, span, message)
    }

    fn expect(&mut self, token: Token, what: &str) -> PResult<Span> {
        let span = self.stream.current_span();
        if self.stream.eat(&token) {
            Ok(span)
        } else {
            Err(self.error_here(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<Ident> {
        let span = self.stream.current_span();
        match self.stream.peek() {
            Some(Token::Ident(name)) => {
                self.stream.advance();
                Ok(Ident::new(name.clone(), span))
            }
            _ => Err(self.error_here(what)),
        }
    }

    /// Name after a `.`: identifiers and keywords alike (`w.if`, `fn Windows.not`).
    fn expect_property_name(&mut self) -> PResult<Ident> {
        let span = self.stream.current_span();
        if let Some(keyword) = self.stream.peek().and_then(Token::keyword_str) {
            self.stream.advance();
            return Ok(Ident::new(keyword, span));
        }
        self.expect_ident("property name")
    }

    /// Statement terminator: `;`, or an implied one before `}`, end of
    /// input, or a line break.
    fn expect_terminator(&mut self) -> PResult<()> {
        if self.stream.eat(&Token::Semi)
            || self.stream.at_end()
            || self.stream.check(&Token::RBrace)
            || self.stream.newline_before_current()
        {
            Ok(())
        } else {
            Err(self.error_here("';'"))
        }
    }

    /// Record (without failing) a trailing comma below its language level.
    fn note_trailing_comma(&mut self, comma: Span) {
        if !self.level.supports(Feature::TrailingCommas) {
            self.diagnostics.push(Diagnostic::new(
                Category::Syntax,
                comma,
                self.level.unsupported_message(Feature::TrailingCommas),
            ));
        }
    }

    /// Comma separated items up to `close`, which is consumed.
    ///
    /// In `gated` lists (parameters and arguments) a trailing comma is
    /// reported below the level that allows it.
    fn comma_list<T>(
        &mut self,
        close: Token,
        what: &str,
        gated: bool,
        mut item: impl FnMut(&mut Self) -> PResult<T>,
    ) -> PResult<Vec<T>> {
        let mut items = Vec::new();
        while !self.stream.eat(&close) {
            items.push(item(self)?);
            if self.stream.check(&Token::Comma) {
                let comma = self.stream.current_span();
                self.stream.advance();
                if gated && self.stream.check(&close) {
                    self.note_trailing_comma(comma);
                }
                continue;
            }
            self.expect(close.clone(), what)?;
            break;
        }
        Ok(items)
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.enter()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn enter(&mut self) -> PResult<()> {
        if !self.meter.tick() {
            return Err(self.cancelled());
        }
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::new(
                Category::Syntax,
                self.stream.current_span(),
                format!("expression nested too deeply (limit {MAX_NESTING})"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn cancelled(&self) -> Diagnostic {
        Diagnostic::new(Category::Syntax, self.stream.current_span(), "parsing cancelled")
    }

    // === Recovery ===

    /// Skip to the next declaration keyword, always making progress.
    fn synchronize_decl(&mut self, before: usize) {
        if self.stream.position() == before {
            self.stream.advance();
        }
        while let Some(token) = self.stream.peek() {
            if matches!(token, Token::Type | Token::Fn | Token::Static) {
                break;
            }
            self.stream.advance();
        }
    }

    /// Skip past the next `;`, or up to a `}` closing the current block.
    fn synchronize_stmt(&mut self, before: usize) {
        let mut braces = 0usize;
        while let Some(token) = self.stream.peek() {
            match token {
                Token::Semi if braces == 0 => {
                    self.stream.advance();
                    return;
                }
                Token::LBrace => braces += 1,
                Token::RBrace if braces == 0 => {
                    if self.stream.position() == before {
                        self.stream.advance();
                    }
                    return;
                }
                Token::RBrace => braces -= 1,
                _ => {}
            }
            self.stream.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, ExprKind, StmtKind, TypeBody};

    #[test]
    fn module_collects_declarations() {
        let (module, diags) = parse_module(
            "type Windows;\ntype Constraint = Windows;\nfn id(w: Windows) -> Windows { return w; }",
            LanguageLevel::default(),
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(module.decls.len(), 3);
        match &module.decls[1] {
            Decl::Type(decl) => assert!(matches!(decl.body, TypeBody::Alias(_))),
            other => panic!("expected type decl, got {other:?}"),
        }
    }

    #[test]
    fn module_recovers_after_bad_declaration() {
        let (module, diags) = parse_module(
            "type A;\nlet x = 1;\ntype B;\nfn (",
            LanguageLevel::default(),
        );
        assert_eq!(module.decls.len(), 2);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.category == Category::Syntax));
    }

    #[test]
    fn snippet_statements() {
        let (body, diags) = parse_snippet(
            "const a = 1;\nlet b = a + 2\nreturn b;",
            LanguageLevel::default(),
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(body.len(), 3);
        assert!(matches!(body[2].kind, StmtKind::Return(_)));
    }

    #[test]
    fn snippet_missing_semicolon_same_line() {
        let (_, diags) = parse_snippet("const a = 1 const b = 2;", LanguageLevel::default());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("';'"));
    }

    #[test]
    fn snippet_recovers_multiple_errors() {
        let (body, diags) = parse_snippet(
            "const a = ;\nconst b = 2;\nreturn );",
            LanguageLevel::default(),
        );
        assert_eq!(diags.len(), 2);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn empty_snippet_parses_to_empty_body() {
        let (body, diags) = parse_snippet("", LanguageLevel::default());
        assert!(body.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn stray_closing_brace() {
        let (_, diags) = parse_snippet("} return 1;", LanguageLevel::default());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'}'"));
    }

    #[test]
    fn nesting_limit() {
        let source = format!("return {}1{};", "(".repeat(400), ")".repeat(400));
        let (_, diags) = parse_snippet(&source, LanguageLevel::default());
        assert!(diags
            .iter()
            .any(|d| d.message.contains("nested too deeply")));
    }

    #[test]
    fn long_left_chains_count_towards_nesting() {
        let source = format!("return 1{};", " + 1".repeat(MAX_NESTING + 10));
        let (_, diags) = parse_snippet(&source, LanguageLevel::default());
        assert!(diags
            .iter()
            .any(|d| d.message.contains("nested too deeply")));
    }

    #[test]
    fn exhausted_meter_stops_parsing() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let source = "type A;\n".repeat(1_000);
        let budget = Budget::new(None, Arc::new(AtomicBool::new(true)));
        let meter = Meter::new(&budget);
        let (module, _) = parse_module_metered(&source, LanguageLevel::default(), &meter);
        assert!(module.decls.is_empty());
        assert!(meter.is_exhausted());
    }

    #[test]
    fn keyword_property_names() {
        let (body, diags) = parse_snippet("return w.if(v);", LanguageLevel::default());
        assert!(diags.is_empty(), "{diags:?}");
        match &body[0].kind {
            StmtKind::Return(expr) => match &expr.kind {
                ExprKind::Call { callee, .. } => match &callee.kind {
                    ExprKind::Member { property, .. } => assert_eq!(property.name, "if"),
                    other => panic!("expected member, got {other:?}"),
                },
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected return, got {other:?}"),
        }
    }
}
