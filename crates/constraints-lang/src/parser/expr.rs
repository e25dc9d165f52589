//! Expressions: a Pratt parser for binary operators over unary, postfix,
//! and atom parsers.
//!
//! Precedence (loosest first): `?:`, `||`, `&&`, `== !=`, `< <= > >=`,
//! `+ -`, `* / %`, `**` (right associative), unary `- !`, postfix.

use std::sync::Arc;

use super::{PResult, Parser};
use crate::ast::{BinaryOp, Expr, ExprKind, Lambda, LambdaBody, Param, UnaryOp};
use crate::lexer::Token;

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::OrOr => (BinaryOp::Or, 10),
        Token::AndAnd => (BinaryOp::And, 20),
        Token::EqEq => (BinaryOp::Eq, 30),
        Token::BangEq => (BinaryOp::Ne, 30),
        Token::Lt => (BinaryOp::Lt, 35),
        Token::LtEq => (BinaryOp::Le, 35),
        Token::Gt => (BinaryOp::Gt, 35),
        Token::GtEq => (BinaryOp::Ge, 35),
        Token::Plus => (BinaryOp::Add, 40),
        Token::Minus => (BinaryOp::Sub, 40),
        Token::Star => (BinaryOp::Mul, 50),
        Token::Slash => (BinaryOp::Div, 50),
        Token::Percent => (BinaryOp::Mod, 50),
        Token::StarStar => (BinaryOp::Pow, 60),
        _ => return None,
    })
}

impl<'t> Parser<'t> {
    pub(super) fn expr(&mut self) -> PResult<Expr> {
        self.nested(|p| p.conditional())
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let cond = self.binary(0)?;
        if !self.stream.eat(&Token::Question) {
            return Ok(cond);
        }
        let then_expr = self.expr()?;
        self.expect(Token::Colon, "':'")?;
        let else_expr = self.expr()?;
        let span = cond.span.to(else_expr.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Binary operators binding at least as tight as `min_prec`.
    ///
    /// Every operator folded into a chain counts as one nesting level:
    /// evaluating `1 + 1 + ... + 1` recurses down the left spine.
    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let saved = self.depth;
        let result = self.binary_chain(min_prec);
        self.depth = saved;
        result
    }

    fn binary_chain(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        while let Some((op, prec)) = self.stream.peek().and_then(binary_op) {
            if prec < min_prec {
                break;
            }
            self.stream.advance();
            let next_min = if op == BinaryOp::Pow { prec } else { prec + 1 };
            let right = self.binary(next_min)?;
            self.enter()?;
            let span = left.span.to(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let start = self.stream.current_start();
        let op = match self.stream.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.stream.advance();
        let operand = self.nested(|p| p.unary())?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            self.stream.span_from(start),
        ))
    }

    /// Member access, calls, and indexing after an atom.
    fn postfix(&mut self) -> PResult<Expr> {
        let saved = self.depth;
        let result = self.postfix_chain();
        self.depth = saved;
        result
    }

    fn postfix_chain(&mut self) -> PResult<Expr> {
        let start = self.stream.current_start();
        let mut expr = self.atom()?;
        loop {
            let kind = match self.stream.peek() {
                Some(Token::Dot) => {
                    self.stream.advance();
                    let property = self.expect_property_name()?;
                    ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    }
                }
                Some(Token::LParen) => {
                    self.stream.advance();
                    let args = self.comma_list(Token::RParen, "',' or ')'", true, |p| p.expr())?;
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                Some(Token::LBracket) => {
                    self.stream.advance();
                    let index = self.expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                _ => break,
            };
            self.enter()?;
            expr = Expr::new(kind, self.stream.span_from(start));
        }
        Ok(expr)
    }

    fn atom(&mut self) -> PResult<Expr> {
        let start = self.stream.current_start();
        let span = self.stream.current_span();
        let kind = match self.stream.peek() {
            Some(Token::Number(n)) => {
                self.stream.advance();
                ExprKind::Number(*n)
            }
            Some(Token::Str(s)) => {
                self.stream.advance();
                ExprKind::Str(s.clone())
            }
            Some(Token::True) => {
                self.stream.advance();
                ExprKind::Bool(true)
            }
            Some(Token::False) => {
                self.stream.advance();
                ExprKind::Bool(false)
            }
            Some(Token::SelfKw) => {
                self.stream.advance();
                ExprKind::SelfRef
            }
            Some(Token::Ident(name)) => {
                if self.stream.check_nth(1, &Token::FatArrow) {
                    return self.bare_lambda();
                }
                self.stream.advance();
                ExprKind::Ident(name.clone())
            }
            Some(Token::LParen) => {
                let is_lambda = self
                    .stream
                    .after_matching_paren(0)
                    .map(|after| self.stream.check_nth(after, &Token::FatArrow))
                    .unwrap_or(false);
                if is_lambda {
                    return self.paren_lambda();
                }
                self.stream.advance();
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(Expr::new(inner.kind, self.stream.span_from(start)));
            }
            Some(Token::LBracket) => {
                self.stream.advance();
                let items = self.comma_list(Token::RBracket, "',' or ']'", false, |p| p.expr())?;
                ExprKind::Array(items)
            }
            Some(Token::Node) => {
                self.stream.advance();
                let ty = self.expect_ident("node type name")?;
                self.expect(Token::LBrace, "'{'")?;
                let fields = self.comma_list(Token::RBrace, "',' or '}'", false, |p| {
                    let name = p.expect_property_name()?;
                    p.expect(Token::Colon, "':'")?;
                    let value = p.expr()?;
                    Ok((name, value))
                })?;
                ExprKind::Node { ty, fields }
            }
            _ => return Err(self.error_here("expression")),
        };
        let span = if matches!(kind, ExprKind::Array(_) | ExprKind::Node { .. }) {
            self.stream.span_from(start)
        } else {
            span
        };
        Ok(Expr::new(kind, span))
    }

    /// `x => body`
    fn bare_lambda(&mut self) -> PResult<Expr> {
        let start = self.stream.current_start();
        let name = self.expect_ident("parameter name")?;
        let param = Param {
            span: name.span,
            name,
            ty: None,
            rest: false,
        };
        self.lambda_rest(start, vec![param])
    }

    /// `(params) => body`
    fn paren_lambda(&mut self) -> PResult<Expr> {
        let start = self.stream.current_start();
        self.expect(Token::LParen, "'('")?;
        let params = self.params(false)?;
        self.lambda_rest(start, params)
    }

    fn lambda_rest(&mut self, start: u32, params: Vec<Param>) -> PResult<Expr> {
        self.expect(Token::FatArrow, "'=>'")?;
        let body = if self.stream.check(&Token::LBrace) {
            LambdaBody::Block(self.block()?)
        } else {
            LambdaBody::Expr(Box::new(self.expr()?))
        };
        let span = self.stream.span_from(start);
        Ok(Expr::new(
            ExprKind::Lambda(Arc::new(Lambda { params, body, span })),
            span,
        ))
    }
}
