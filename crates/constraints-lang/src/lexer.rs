//! Tokenizer for constraint script, built on logos.
//!
//! Whitespace and comments are skipped. Lexing never stops at the first
//! bad character: invalid input becomes a `syntax` diagnostic and lexing
//! resumes after it, so a single pass reports every lexical problem.

use std::fmt;
use std::ops::Range;

use logos::Logos;

use crate::diagnostic::{Category, Diagnostic};
use crate::level::{Feature, LanguageLevel};
use crate::span::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
pub enum Token {
    // === Keywords ===
    #[token("type")]
    Type,
    #[token("fn")]
    Fn,
    #[token("static")]
    Static,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("throw")]
    Throw,
    #[token("node")]
    Node,
    #[token("self")]
    SelfKw,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // === Literals ===
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().replace('_', "").parse::<f64>().ok())]
    Number(f64),
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| unescape(lex.slice()))]
    Str(String),
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,

    // === Operators ===
    #[token("=")]
    Assign,
    #[token("==")]
    #[token("===")]
    EqEq,
    #[token("!=")]
    #[token("!==")]
    BangEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("|")]
    Pipe,
}

impl Token {
    /// Keyword spelling, for places where keywords are accepted as names
    /// (`x.type`, `fn Windows.if`).
    pub fn keyword_str(&self) -> Option<&'static str> {
        Some(match self {
            Token::Type => "type",
            Token::Fn => "fn",
            Token::Static => "static",
            Token::Let => "let",
            Token::Const => "const",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Throw => "throw",
            Token::Node => "node",
            Token::SelfKw => "self",
            Token::True => "true",
            Token::False => "false",
            _ => return None,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.keyword_str() {
            return write!(f, "keyword '{keyword}'");
        }
        let symbol = match self {
            Token::Number(n) => return write!(f, "number {n}"),
            Token::Str(s) => return write!(f, "string {s:?}"),
            Token::Ident(name) => return write!(f, "identifier '{name}'"),
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semi => ";",
            Token::Dot => ".",
            Token::Ellipsis => "...",
            Token::Arrow => "->",
            Token::FatArrow => "=>",
            Token::Assign => "=",
            Token::EqEq => "==",
            Token::BangEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::StarStar => "**",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Question => "?",
            Token::Pipe => "|",
            _ => "token",
        };
        write!(f, "'{symbol}'")
    }
}

/// Strip the quotes of a string literal and resolve escapes.
///
/// Unknown escapes keep the escaped character (`\q` is `q`).
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Output of [`lex`].
#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub tokens: Vec<(Token, Range<usize>)>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Tokenize `source` at `level`.
pub fn lex(source: &str, level: LanguageLevel) -> Lexed {
    let mut out = Lexed::default();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start as u32, range.end as u32);
        match result {
            Ok(token) => {
                match &token {
                    Token::Number(_)
                        if lexer.slice().contains('_')
                            && !level.supports(Feature::NumericSeparators) =>
                    {
                        out.diagnostics.push(Diagnostic::new(
                            Category::Syntax,
                            span,
                            level.unsupported_message(Feature::NumericSeparators),
                        ));
                    }
                    Token::StarStar if !level.supports(Feature::ExponentOperator) => {
                        out.diagnostics.push(Diagnostic::new(
                            Category::Syntax,
                            span,
                            level.unsupported_message(Feature::ExponentOperator),
                        ));
                    }
                    _ => {}
                }
                out.tokens.push((token, range));
            }
            Err(()) => {
                let slice = lexer.slice();
                let message = match slice.chars().next() {
                    Some('"') | Some('\'') => {
                        // Skip the rest of the line so the string body does
                        // not lex as a stream of unrelated tokens.
                        let rest = lexer.remainder();
                        let skip = rest.find('\n').unwrap_or(rest.len());
                        lexer.bump(skip);
                        "unterminated string literal".to_string()
                    }
                    Some(c) if c.is_ascii_digit() => format!("invalid numeric literal '{slice}'"),
                    Some(c) => format!("invalid character '{c}'"),
                    None => "unexpected end of input".to_string(),
                };
                out.diagnostics
                    .push(Diagnostic::new(Category::Syntax, span, message));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        let lexed = lex(source, LanguageLevel::default());
        assert!(lexed.diagnostics.is_empty(), "{:?}", lexed.diagnostics);
        lexed.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("static fn Real.Resource(name: string) -> Real"),
            vec![
                Token::Static,
                Token::Fn,
                Token::Ident("Real".into()),
                Token::Dot,
                Token::Ident("Resource".into()),
                Token::LParen,
                Token::Ident("name".into()),
                Token::Colon,
                Token::Ident("string".into()),
                Token::RParen,
                Token::Arrow,
                Token::Ident("Real".into()),
            ]
        );
    }

    #[test]
    fn keyword_prefix_is_identifier() {
        assert_eq!(kinds("types"), vec![Token::Ident("types".into())]);
        assert_eq!(kinds("nodeKind"), vec![Token::Ident("nodeKind".into())]);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1 2.5 1e3 1_000"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(1000.0),
                Token::Number(1000.0)
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            kinds(r#""a\"b" 'c\'d' "x\ny""#),
            vec![
                Token::Str("a\"b".into()),
                Token::Str("c'd".into()),
                Token::Str("x\ny".into())
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n/* block ** */ b /**/ c"),
            vec![
                Token::Ident("a".into()),
                Token::Ident("b".into()),
                Token::Ident("c".into())
            ]
        );
    }

    #[test]
    fn strict_equality_aliases() {
        assert_eq!(
            kinds("a === b !== c"),
            vec![
                Token::Ident("a".into()),
                Token::EqEq,
                Token::Ident("b".into()),
                Token::BangEq,
                Token::Ident("c".into())
            ]
        );
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(
            kinds("a ** b => -> ... <= >="),
            vec![
                Token::Ident("a".into()),
                Token::StarStar,
                Token::Ident("b".into()),
                Token::FatArrow,
                Token::Arrow,
                Token::Ellipsis,
                Token::LtEq,
                Token::GtEq
            ]
        );
    }

    #[test]
    fn invalid_character_reports_and_continues() {
        let lexed = lex("a # b", LanguageLevel::default());
        assert_eq!(lexed.diagnostics.len(), 1);
        assert_eq!(lexed.diagnostics[0].category, Category::Syntax);
        assert!(lexed.diagnostics[0].message.contains("'#'"));
        assert_eq!(lexed.tokens.len(), 2);
    }

    #[test]
    fn unterminated_string_skips_line() {
        let lexed = lex("\"abc def\nx", LanguageLevel::default());
        assert_eq!(lexed.diagnostics.len(), 1);
        assert!(lexed.diagnostics[0].message.contains("unterminated"));
        assert_eq!(lexed.tokens, vec![(Token::Ident("x".into()), 9..10)]);
    }

    #[test]
    fn numeric_separators_gated() {
        let lexed = lex("1_000", LanguageLevel::L2020);
        assert_eq!(lexed.diagnostics.len(), 1);
        assert!(lexed.diagnostics[0].message.contains("numeric separators"));
        // The token is still produced so parsing can continue.
        assert_eq!(lexed.tokens.len(), 1);
    }

    #[test]
    fn exponent_gated() {
        assert_eq!(lex("2 ** 3", LanguageLevel::L2019).diagnostics.len(), 1);
        assert!(lex("2 ** 3", LanguageLevel::L2020).diagnostics.is_empty());
    }

    #[test]
    fn token_display() {
        assert_eq!(Token::If.to_string(), "keyword 'if'");
        assert_eq!(Token::Ident("x".into()).to_string(), "identifier 'x'");
        assert_eq!(Token::Semi.to_string(), "';'");
    }
}
