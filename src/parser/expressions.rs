//! Expression parsing using Pratt precedence.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::span::Span;

use super::core::{ParseResult, Parser};
use super::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Lowest)
    }

    pub(crate) fn parse_precedence(&mut self, min_precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.is_at_end() {
            let precedence = get_precedence(&self.peek().kind);
            if precedence == Precedence::None || precedence < min_precedence {
                break;
            }

            left = self.parse_infix(left, precedence)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let start_span = token.span;

        match &token.kind {
            TokenKind::IntLiteral(n) => Ok(Expr::new(ExprKind::IntLiteral(*n), start_span)),
            TokenKind::StringLiteral(s) => {
                Ok(Expr::new(ExprKind::StringLiteral(s.clone()), start_span))
            }
            TokenKind::BoolLiteral(b) => Ok(Expr::new(ExprKind::BoolLiteral(*b), start_span)),
            TokenKind::Null => Ok(Expr::new(ExprKind::Null, start_span)),

            TokenKind::Identifier(name) => {
                Ok(Expr::new(ExprKind::Identifier(name.clone()), start_span))
            }

            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }

            TokenKind::LeftBracket => self.parse_array(start_span),
            TokenKind::LeftBrace => self.parse_hash(start_span),

            TokenKind::Minus => self.parse_unary(PrefixOp::Negate, start_span),
            TokenKind::Bang => self.parse_unary(PrefixOp::Not, start_span),
            TokenKind::Tilde => self.parse_unary(PrefixOp::BitNot, start_span),

            TokenKind::If => self.parse_if(start_span),
            TokenKind::While => self.parse_while(start_span),
            TokenKind::Fn => self.parse_function(start_span),
            TokenKind::Import => self.parse_import(start_span),

            _ => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", token.kind),
                token.span,
            )),
        }
    }

    fn parse_unary(&mut self, operator: PrefixOp, start_span: Span) -> ParseResult<Expr> {
        let operand = self.parse_precedence(Precedence::Prefix)?;
        let span = start_span.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Prefix {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_array(&mut self, start_span: Span) -> ParseResult<Expr> {
        let elements = self.parse_expression_list(&TokenKind::RightBracket)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::Array(elements), span))
    }

    fn parse_hash(&mut self, start_span: Span) -> ParseResult<Expr> {
        let mut pairs = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let key = self.expression()?;
            self.expect(&TokenKind::Colon)?;
            let value = self.expression()?;
            pairs.push((key, value));

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RightBrace)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }

    fn parse_if(&mut self, start_span: Span) -> ParseResult<Expr> {
        let condition = self.expression()?;
        let consequence = self.block()?;

        let alternative = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // else if: the alternative is a block holding the nested if
                let nested_span = self.current_span();
                self.advance();
                let nested = self.parse_if(nested_span)?;
                let span = nested.span;
                Some(vec![Stmt::new(StmtKind::Expression(nested), span)])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };

        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn parse_while(&mut self, start_span: Span) -> ParseResult<Expr> {
        let condition = self.expression()?;
        let body = self.block()?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::While {
                condition: Box::new(condition),
                body,
            },
            span,
        ))
    }

    fn parse_function(&mut self, start_span: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;

        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
            params.push(self.expect_identifier()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::Function {
                name: None,
                params,
                body,
            },
            span,
        ))
    }

    fn parse_import(&mut self, start_span: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let name = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::Import(Box::new(name)), span))
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> ParseResult<Expr> {
        let token = self.advance();

        match &token.kind {
            TokenKind::Plus => self.binary_expr(left, InfixOp::Add, precedence),
            TokenKind::Minus => self.binary_expr(left, InfixOp::Subtract, precedence),
            TokenKind::Star => self.binary_expr(left, InfixOp::Multiply, precedence),
            TokenKind::Slash => self.binary_expr(left, InfixOp::Divide, precedence),
            TokenKind::Percent => self.binary_expr(left, InfixOp::Modulo, precedence),
            TokenKind::Pipe => self.binary_expr(left, InfixOp::BitOr, precedence),
            TokenKind::Caret => self.binary_expr(left, InfixOp::BitXor, precedence),
            TokenKind::Ampersand => self.binary_expr(left, InfixOp::BitAnd, precedence),
            TokenKind::LessLess => self.binary_expr(left, InfixOp::ShiftLeft, precedence),
            TokenKind::GreaterGreater => self.binary_expr(left, InfixOp::ShiftRight, precedence),
            TokenKind::EqualEqual => self.binary_expr(left, InfixOp::Equal, precedence),
            TokenKind::BangEqual => self.binary_expr(left, InfixOp::NotEqual, precedence),
            TokenKind::Less => self.binary_expr(left, InfixOp::Less, precedence),
            TokenKind::LessEqual => self.binary_expr(left, InfixOp::LessEqual, precedence),
            TokenKind::Greater => self.binary_expr(left, InfixOp::Greater, precedence),
            TokenKind::GreaterEqual => self.binary_expr(left, InfixOp::GreaterEqual, precedence),
            TokenKind::And => self.binary_expr(left, InfixOp::And, precedence),
            TokenKind::Or => self.binary_expr(left, InfixOp::Or, precedence),

            TokenKind::ColonEqual => self.parse_bind(left),
            TokenKind::Equal => self.parse_assign(left),

            TokenKind::LeftParen => {
                let arguments = self.parse_expression_list(&TokenKind::RightParen)?;
                let span = left.span.merge(&self.previous_span());
                Ok(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(left),
                        arguments,
                    },
                    span,
                ))
            }

            TokenKind::LeftBracket => {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = left.span.merge(&self.previous_span());
                Ok(Expr::new(
                    ExprKind::Index {
                        object: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }

            TokenKind::Dot => {
                let name_span = self.current_span();
                let name = self.expect_identifier()?;
                let span = left.span.merge(&name_span);
                Ok(Expr::new(
                    ExprKind::Index {
                        object: Box::new(left),
                        index: Box::new(Expr::new(ExprKind::StringLiteral(name), name_span)),
                    },
                    span,
                ))
            }

            _ => Err(ParserError::unexpected_token(
                "operator",
                format!("{}", token.kind),
                token.span,
            )),
        }
    }

    fn binary_expr(
        &mut self,
        left: Expr,
        operator: InfixOp,
        precedence: Precedence,
    ) -> ParseResult<Expr> {
        let right = self.parse_precedence(precedence.next())?;
        let span = left.span.merge(&right.span);
        Ok(Expr::new(
            ExprKind::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_bind(&mut self, target: Expr) -> ParseResult<Expr> {
        let name = match target.kind {
            ExprKind::Identifier(name) => name,
            _ => return Err(ParserError::invalid_bind_target(target.span)),
        };

        let mut value = self.expression()?;
        if let ExprKind::Function { name: fn_name, .. } = &mut value.kind {
            if fn_name.is_none() {
                *fn_name = Some(name.clone());
            }
        }

        let span = target.span.merge(&value.span);
        Ok(Expr::new(
            ExprKind::Bind {
                name,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_assign(&mut self, target: Expr) -> ParseResult<Expr> {
        if !matches!(
            target.kind,
            ExprKind::Identifier(_) | ExprKind::Index { .. }
        ) {
            return Err(ParserError::invalid_assignment_target(target.span));
        }

        let value = self.expression()?;
        let span = target.span.merge(&value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    /// Comma-separated expressions up to `end`, which is consumed. A trailing
    /// comma is allowed.
    fn parse_expression_list(&mut self, end: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();

        while !self.check(end) && !self.is_at_end() {
            items.push(self.expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(end)?;
        Ok(items)
    }
}
