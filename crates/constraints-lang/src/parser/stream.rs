//! Token stream with lookahead for the recursive descent parser.

use std::ops::Range;

use crate::lexer::Token;
use crate::span::Span;

pub(crate) struct TokenStream<'t> {
    tokens: &'t [(Token, Range<usize>)],
    source: &'t str,
    pos: usize,
}

impl<'t> TokenStream<'t> {
    pub fn new(tokens: &'t [(Token, Range<usize>)], source: &'t str) -> Self {
        Self {
            tokens,
            source,
            pos: 0,
        }
    }

    pub fn peek(&self) -> Option<&'t Token> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n).map(|(tok, _)| tok)
    }

    pub fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos).map(|(tok, _)| tok);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Same token kind, ignoring payloads.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    pub fn check_nth(&self, n: usize, expected: &Token) -> bool {
        matches!(self.peek_nth(n), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume the next token if it matches.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Span of the next token; at end of input, an empty span after the
    /// last token.
    pub fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, range)) => Span::new(range.start as u32, range.end as u32),
            None => Span::point(self.eof_offset()),
        }
    }

    /// Start offset of the next token (or end of input).
    pub fn current_start(&self) -> u32 {
        self.current_span().start
    }

    /// End offset of the last consumed token.
    pub fn previous_end(&self) -> u32 {
        if self.pos == 0 {
            return 0;
        }
        self.tokens
            .get(self.pos - 1)
            .map(|(_, range)| range.end as u32)
            .unwrap_or_else(|| self.eof_offset())
    }

    /// Span from `start` to the end of the last consumed token.
    pub fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.previous_end().max(start))
    }

    /// Whether a line break separates the last consumed token from the next.
    pub fn newline_before_current(&self) -> bool {
        let from = self.previous_end() as usize;
        let to = self.current_start() as usize;
        self.source
            .get(from..to)
            .map(|gap| gap.contains('\n'))
            .unwrap_or(false)
    }

    /// Index of the token after the `)` matching the `(` at `pos + offset`.
    pub fn after_matching_paren(&self, offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = self.pos + offset;
        while let Some((tok, _)) = self.tokens.get(i) {
            match tok {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i + 1 - self.pos);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn eof_offset(&self) -> u32 {
        self.tokens
            .last()
            .map(|(_, range)| range.end as u32)
            .unwrap_or(self.source.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::level::LanguageLevel;

    #[test]
    fn lookahead_and_spans() {
        let source = "a (b) c";
        let lexed = lex(source, LanguageLevel::default());
        let mut stream = TokenStream::new(&lexed.tokens, source);

        assert!(stream.check(&Token::Ident(String::new())));
        assert!(stream.check_nth(1, &Token::LParen));
        assert_eq!(stream.after_matching_paren(1), Some(4));

        let start = stream.current_start();
        stream.advance();
        stream.advance();
        assert_eq!(stream.span_from(start), Span::new(0, 3));
        assert!(!stream.at_end());
    }

    #[test]
    fn newline_detection() {
        let source = "a\nb c";
        let lexed = lex(source, LanguageLevel::default());
        let mut stream = TokenStream::new(&lexed.tokens, source);
        stream.advance();
        assert!(stream.newline_before_current());
        stream.advance();
        assert!(!stream.newline_before_current());
    }

    #[test]
    fn end_of_input_span() {
        let source = "a  ";
        let lexed = lex(source, LanguageLevel::default());
        let mut stream = TokenStream::new(&lexed.tokens, source);
        stream.advance();
        assert!(stream.at_end());
        assert_eq!(stream.current_span(), Span::point(1));
    }
}
