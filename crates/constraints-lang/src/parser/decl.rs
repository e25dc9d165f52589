//! `type` and `fn` declarations.

use std::sync::Arc;

use super::{PResult, Parser};
use crate::ast::{Decl, FieldDecl, FnDecl, FnKind, Param, TypeBody, TypeDecl};
use crate::lexer::Token;

impl<'t> Parser<'t> {
    pub(super) fn decl(&mut self) -> PResult<Decl> {
        match self.stream.peek() {
            Some(Token::Type) => self.type_decl().map(|d| Decl::Type(Arc::new(d))),
            Some(Token::Fn) | Some(Token::Static) => self.fn_decl().map(|d| Decl::Fn(Arc::new(d))),
            _ => Err(self.error_here("declaration ('type' or 'fn')")),
        }
    }

    fn type_decl(&mut self) -> PResult<TypeDecl> {
        let start = self.stream.current_start();
        self.expect(Token::Type, "'type'")?;
        let name = self.expect_ident("type name")?;

        let body = if self.stream.eat(&Token::Assign) {
            let ty = self.type_expr()?;
            self.expect_terminator()?;
            TypeBody::Alias(ty)
        } else if self.stream.eat(&Token::LBrace) {
            let fields = self.comma_list(Token::RBrace, "',' or '}'", false, |p| {
                let name = p.expect_property_name()?;
                p.expect(Token::Colon, "':'")?;
                let ty = p.type_expr()?;
                Ok(FieldDecl { name, ty })
            })?;
            self.stream.eat(&Token::Semi);
            TypeBody::Fields(fields)
        } else {
            self.expect_terminator()?;
            TypeBody::Opaque
        };

        Ok(TypeDecl {
            name,
            body,
            span: self.stream.span_from(start),
        })
    }

    fn fn_decl(&mut self) -> PResult<FnDecl> {
        let start = self.stream.current_start();
        let is_static = self.stream.eat(&Token::Static);
        self.expect(Token::Fn, "'fn'")?;

        let first = self.expect_ident("function name")?;
        let (kind, name) = if self.stream.eat(&Token::Dot) {
            let member = self.expect_property_name()?;
            if is_static {
                (FnKind::Static { owner: first }, member)
            } else {
                (FnKind::Method { owner: first }, member)
            }
        } else if is_static {
            return Err(self.error_here("'.' after the owner of a static function"));
        } else {
            (FnKind::Free, first)
        };

        self.expect(Token::LParen, "'('")?;
        let params = self.params(true)?;
        self.expect(Token::Arrow, "'->' and a return type")?;
        let ret = self.type_expr()?;
        let body = self.block()?;

        Ok(FnDecl {
            kind,
            name,
            params,
            ret,
            body,
            span: self.stream.span_from(start),
        })
    }

    /// Parameter list after `(`, through `)`.
    ///
    /// Declared functions require annotations; lambdas may omit them.
    pub(super) fn params(&mut self, annotated: bool) -> PResult<Vec<Param>> {
        let params = self.comma_list(Token::RParen, "',' or ')'", true, |p| {
            let start = p.stream.current_start();
            let rest = p.stream.eat(&Token::Ellipsis);
            let name = p.expect_ident("parameter name")?;
            let ty = if annotated || p.stream.check(&Token::Colon) {
                p.expect(Token::Colon, "':' and a parameter type")?;
                Some(p.type_expr()?)
            } else {
                None
            };
            Ok(Param {
                name,
                ty,
                rest,
                span: p.stream.span_from(start),
            })
        })?;

        if let Some(misplaced) = params.iter().rev().skip(1).find(|p| p.rest) {
            return Err(crate::diagnostic::Diagnostic::new(
                crate::diagnostic::Category::Syntax,
                misplaced.span,
                "a rest parameter must be last in a parameter list",
            ));
        }
        Ok(params)
    }
}
