//! Statements and blocks.

use super::{PResult, Parser};
use crate::ast::{Block, Stmt, StmtKind};
use crate::lexer::Token;

impl<'t> Parser<'t> {
    /// `{ stmt* }`
    pub(super) fn block(&mut self) -> PResult<Block> {
        self.expect(Token::LBrace, "'{'")?;
        self.nested(|p| {
            let mut stmts = Vec::new();
            while !p.stream.check(&Token::RBrace) {
                if p.stream.at_end() {
                    return Err(p.error_here("'}'"));
                }
                if p.meter.is_exhausted() {
                    return Err(p.cancelled());
                }
                if let Some(stmt) = p.stmt_recovering() {
                    stmts.push(stmt);
                }
            }
            p.stream.advance();
            Ok(stmts)
        })
    }

    /// Parse one statement; on failure record the diagnostic and skip
    /// ahead to the next statement boundary.
    pub(super) fn stmt_recovering(&mut self) -> Option<Stmt> {
        let before = self.stream.position();
        match self.stmt() {
            Ok(stmt) => Some(stmt),
            Err(diag) => {
                self.diagnostics.push(diag);
                self.synchronize_stmt(before);
                None
            }
        }
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let start = self.stream.current_start();
        let kind = match self.stream.peek() {
            Some(Token::Let) | Some(Token::Const) => {
                let mutable = matches!(self.stream.advance(), Some(Token::Let));
                let name = self.expect_ident("variable name")?;
                let ty = if self.stream.eat(&Token::Colon) {
                    Some(self.type_expr()?)
                } else {
                    None
                };
                self.expect(Token::Assign, "'=' and an initializer")?;
                let init = self.expr()?;
                self.expect_terminator()?;
                StmtKind::Let {
                    mutable,
                    name,
                    ty,
                    init,
                }
            }
            Some(Token::If) => self.if_stmt()?,
            Some(Token::While) => {
                self.stream.advance();
                self.expect(Token::LParen, "'('")?;
                let cond = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                let body = self.body()?;
                StmtKind::While { cond, body }
            }
            Some(Token::Return) => {
                self.stream.advance();
                let value = self.expr()?;
                self.expect_terminator()?;
                StmtKind::Return(value)
            }
            Some(Token::Throw) => {
                self.stream.advance();
                let value = self.expr()?;
                self.expect_terminator()?;
                StmtKind::Throw(value)
            }
            Some(Token::LBrace) => StmtKind::Block(self.block()?),
            Some(Token::Ident(_)) if self.stream.check_nth(1, &Token::Assign) => {
                let target = self.expect_ident("assignment target")?;
                self.stream.advance();
                let value = self.expr()?;
                self.expect_terminator()?;
                StmtKind::Assign { target, value }
            }
            _ => {
                let expr = self.expr()?;
                self.expect_terminator()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt {
            kind,
            span: self.stream.span_from(start),
        })
    }

    fn if_stmt(&mut self) -> PResult<StmtKind> {
        self.expect(Token::If, "'if'")?;
        self.expect(Token::LParen, "'('")?;
        let cond = self.expr()?;
        self.expect(Token::RParen, "')'")?;
        let then_block = self.body()?;
        let else_block = if self.stream.eat(&Token::Else) {
            Some(self.body()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_block,
            else_block,
        })
    }

    /// Body of `if`/`else`/`while`: a block or a single statement.
    fn body(&mut self) -> PResult<Block> {
        if self.stream.check(&Token::LBrace) {
            return self.block();
        }
        self.nested(|p| p.stmt().map(|stmt| vec![stmt]))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ExprKind, StmtKind};
    use crate::level::LanguageLevel;
    use crate::parser::parse_snippet;

    #[test]
    fn let_const_and_assignment() {
        let (body, diags) = parse_snippet(
            "let n: number = 1;\nn = n + 1;\nconst s = 'x';",
            LanguageLevel::default(),
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert!(matches!(body[0].kind, StmtKind::Let { mutable: true, ty: Some(_), .. }));
        assert!(matches!(body[1].kind, StmtKind::Assign { ref target, .. } if target.name == "n"));
        assert!(matches!(body[2].kind, StmtKind::Let { mutable: false, ty: None, .. }));
    }

    #[test]
    fn else_if_chain() {
        let (body, diags) = parse_snippet(
            "if (a) { return 1; } else if (b) return 2; else { return 3; }",
            LanguageLevel::default(),
        );
        assert!(diags.is_empty(), "{diags:?}");
        match &body[0].kind {
            StmtKind::If {
                else_block: Some(else_block),
                ..
            } => {
                assert_eq!(else_block.len(), 1);
                assert!(matches!(
                    else_block[0].kind,
                    StmtKind::If {
                        else_block: Some(_),
                        ..
                    }
                ));
            }
            other => panic!("expected if/else, got {other:?}"),
        }
    }

    #[test]
    fn while_loop() {
        let (body, diags) = parse_snippet("while (true) {}", LanguageLevel::default());
        assert!(diags.is_empty(), "{diags:?}");
        match &body[0].kind {
            StmtKind::While { cond, body } => {
                assert!(matches!(cond.kind, ExprKind::Bool(true)));
                assert!(body.is_empty());
            }
            other => panic!("expected while, got {other:?}"),
        }
    }

    #[test]
    fn throw_statement() {
        let (body, diags) = parse_snippet("throw \"bad\"", LanguageLevel::default());
        assert!(diags.is_empty(), "{diags:?}");
        assert!(matches!(body[0].kind, StmtKind::Throw(_)));
    }

    #[test]
    fn unterminated_block() {
        let (_, diags) = parse_snippet("if (a) { return 1;", LanguageLevel::default());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'}'"));
    }

    #[test]
    fn recovery_inside_block() {
        let (body, diags) = parse_snippet(
            "{ const a = ; const b = 1; }\nreturn b;",
            LanguageLevel::default(),
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(body.len(), 2);
        match &body[0].kind {
            StmtKind::Block(inner) => assert_eq!(inner.len(), 1),
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn spans_cover_statement() {
        let (body, _) = parse_snippet("  return 1;", LanguageLevel::default());
        assert_eq!(body[0].span.start, 2);
        assert_eq!(body[0].span.end, 11);
    }
}
