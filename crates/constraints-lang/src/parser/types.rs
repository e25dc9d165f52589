//! Type expressions: `number`, `Name`, `"lit"`, `T[]`, `A | B`, `(x: T) => R`.

use super::{PResult, Parser};
use crate::ast::{TypeExpr, TypeExprKind};
use crate::lexer::Token;

impl<'t> Parser<'t> {
    pub(super) fn type_expr(&mut self) -> PResult<TypeExpr> {
        self.nested(|p| {
            let start = p.stream.current_start();
            p.stream.eat(&Token::Pipe);
            let first = p.array_type()?;
            if !p.stream.check(&Token::Pipe) {
                return Ok(first);
            }
            let mut members = vec![first];
            while p.stream.eat(&Token::Pipe) {
                members.push(p.array_type()?);
            }
            Ok(TypeExpr {
                kind: TypeExprKind::Union(members),
                span: p.stream.span_from(start),
            })
        })
    }

    fn array_type(&mut self) -> PResult<TypeExpr> {
        let start = self.stream.current_start();
        let mut ty = self.primary_type()?;
        while self.stream.check(&Token::LBracket) && self.stream.check_nth(1, &Token::RBracket) {
            self.stream.advance();
            self.stream.advance();
            ty = TypeExpr {
                kind: TypeExprKind::Array(Box::new(ty)),
                span: self.stream.span_from(start),
            };
        }
        Ok(ty)
    }

    fn primary_type(&mut self) -> PResult<TypeExpr> {
        let start = self.stream.current_start();
        let kind = match self.stream.peek() {
            Some(Token::Ident(name)) => {
                self.stream.advance();
                TypeExprKind::Named(name.clone())
            }
            Some(Token::Str(value)) => {
                self.stream.advance();
                TypeExprKind::StringLiteral(value.clone())
            }
            Some(Token::LParen) => {
                let is_function = self
                    .stream
                    .after_matching_paren(0)
                    .map(|after| self.stream.check_nth(after, &Token::FatArrow))
                    .unwrap_or(false);
                self.stream.advance();
                if !is_function {
                    let inner = self.type_expr()?;
                    self.expect(Token::RParen, "')'")?;
                    return Ok(inner);
                }
                let params = self.comma_list(Token::RParen, "',' or ')'", true, |p| {
                    // Parameter names in function types are documentation only.
                    if p.stream.check(&Token::Ident(String::new()))
                        && p.stream.check_nth(1, &Token::Colon)
                    {
                        p.stream.advance();
                        p.stream.advance();
                    }
                    p.type_expr()
                })?;
                self.expect(Token::FatArrow, "'=>'")?;
                let ret = self.type_expr()?;
                TypeExprKind::Function {
                    params,
                    ret: Box::new(ret),
                }
            }
            _ => return Err(self.error_here("type")),
        };
        Ok(TypeExpr {
            kind,
            span: self.stream.span_from(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{StmtKind, TypeExpr, TypeExprKind};
    use crate::level::LanguageLevel;
    use crate::parser::parse_snippet;

    fn annotation(ty: &str) -> TypeExpr {
        let (body, diags) = parse_snippet(&format!("let x: {ty} = y;"), LanguageLevel::default());
        assert!(diags.is_empty(), "{diags:?}");
        match body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Let { ty: Some(ty), .. }) => ty,
            other => panic!("expected annotated let, got {other:?}"),
        }
    }

    #[test]
    fn union_of_literals() {
        match annotation("'A' | 'B' | 'C'").kind {
            TypeExprKind::Union(members) => assert_eq!(members.len(), 3),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn leading_pipe_union() {
        match annotation("| 'A' | 'B'").kind {
            TypeExprKind::Union(members) => assert_eq!(members.len(), 2),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn nested_arrays() {
        match annotation("number[][]").kind {
            TypeExprKind::Array(inner) => assert!(matches!(inner.kind, TypeExprKind::Array(_))),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn function_type_with_named_params() {
        match annotation("(instance: ActivityInstance, number) => Constraint").kind {
            TypeExprKind::Function { params, ret } => {
                assert_eq!(params.len(), 2);
                assert!(matches!(params[0].kind, TypeExprKind::Named(ref n) if n == "ActivityInstance"));
                assert!(matches!(ret.kind, TypeExprKind::Named(ref n) if n == "Constraint"));
            }
            other => panic!("expected function type, got {other:?}"),
        }
    }

    #[test]
    fn parenthesized_union_array() {
        match annotation("(Windows | Violations)[]").kind {
            TypeExprKind::Array(inner) => assert!(matches!(inner.kind, TypeExprKind::Union(_))),
            other => panic!("expected array, got {other:?}"),
        }
    }
}
