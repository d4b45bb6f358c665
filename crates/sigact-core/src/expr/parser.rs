// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Recursive-descent parser producing the expression tree.
//!
//! Precedence, lowest first:
//!
//! ```text
//! c ? a : b
//! ||  or
//! &&  and
//! ==  !=
//! <  <=  >  >=
//! in  contains  startsWith  endsWith
//! +  -
//! *  /  %
//! !  not  - (unary)
//! a.b  a[i]  f(x)
//! ```

use serde_json::Value;

use crate::error::CompileError;
use crate::expr::lexer::{Spanned, Token};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startsWith",
            BinaryOp::EndsWith => "endsWith",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Parse a token stream into a single expression.
pub(crate) fn parse(tokens: Vec<Spanned>, source_len: usize) -> Result<Expr, CompileError> {
    if tokens.is_empty() {
        return Err(CompileError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        source_len,
        depth: 0,
    };
    let expr = parser.conditional()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some(spanned) => Err(CompileError::Syntax {
            offset: spanned.offset,
            message: format!("unexpected {:?} after complete expression", spanned.token),
        }),
    }
}

/// Deepest syntax tree a policy may build.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    source_len: usize,
    /// Height of the tree above the node being parsed.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|spanned| spanned.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source_len, |spanned| spanned.offset)
    }

    fn descend(&mut self) -> Result<(), CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(CompileError::Syntax {
                offset: self.offset(),
                message: "expression nested too deeply".into(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), CompileError> {
        if self.eat(&expected) {
            return Ok(());
        }
        match self.peek() {
            None => Err(CompileError::UnexpectedEnd(format!("expected {what}"))),
            Some(found) => Err(CompileError::Syntax {
                offset: self.offset(),
                message: format!("expected {what}, found {found:?}"),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Precedence levels
    // ------------------------------------------------------------------

    fn conditional(&mut self) -> Result<Expr, CompileError> {
        self.descend()?;
        let expr = self.ternary();
        self.depth -= 1;
        expr
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.conditional()?;
        self.expect(Token::Colon, "`:` in conditional")?;
        let otherwise = self.conditional()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = self.and()?;
        while matches!(self.peek(), Some(Token::OrOr | Token::Or)) {
            self.pos += 1;
            self.descend()?;
            let right = self.and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = self.equality()?;
        while matches!(self.peek(), Some(Token::AndAnd | Token::And)) {
            self.pos += 1;
            self.descend()?;
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::comparison, |token| match token {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::BangEq => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::membership, |token| match token {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn membership(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::additive, |token| match token {
            Token::In => Some(BinaryOp::In),
            Token::Contains => Some(BinaryOp::Contains),
            Token::StartsWith => Some(BinaryOp::StartsWith),
            Token::EndsWith => Some(BinaryOp::EndsWith),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::multiplicative, |token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::unary, |token| match token {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// One left-associative level: `next (op next)*`.
    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, CompileError>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut left = next(self)?;
        while let Some(op) = self.peek().and_then(operator) {
            self.pos += 1;
            self.descend()?;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Some(Token::Bang | Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.descend()?;
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek(), Some(Token::Dot | Token::LBracket)) {
                self.descend()?;
            }
            if self.eat(&Token::Dot) {
                let offset = self.offset();
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    Some(other) => match other.keyword_text() {
                        Some(text) => text.to_owned(),
                        None => {
                            return Err(CompileError::Syntax {
                                offset,
                                message: format!(
                                    "expected member name after `.`, found {other:?}"
                                ),
                            })
                        }
                    },
                    None => {
                        return Err(CompileError::UnexpectedEnd(
                            "expected member name after `.`".into(),
                        ))
                    }
                };
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat(&Token::LBracket) {
                let index = self.conditional()?;
                self.expect(Token::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                self.depth = base;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(CompileError::UnexpectedEnd("expected an operand".into()));
        };

        match token {
            Token::Int(value) => Ok(Expr::Literal(Value::from(value))),
            Token::Float(value) => Ok(Expr::Literal(Value::from(value))),
            Token::Str(value) => Ok(Expr::Literal(Value::String(value))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Nil => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) if self.eat(&Token::LParen) => {
                let args = self.list(Token::RParen, "`)`")?;
                Ok(Expr::Call(name, args))
            }
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::Array(self.list(Token::RBracket, "`]`")?)),
            other => Err(CompileError::Syntax {
                offset,
                message: format!("expected an operand, found {other:?}"),
            }),
        }
    }

    /// Comma separated expressions up to and including `close`.
    fn list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.conditional()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;

    fn parse_str(source: &str) -> Result<Expr, CompileError> {
        parse(tokenize(source)?, source.len())
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_str("a || b && c").expect("should parse");
        assert_eq!(
            expr,
            Expr::Logical(
                LogicalOp::Or,
                ident("a"),
                Box::new(Expr::Logical(LogicalOp::And, ident("b"), ident("c"))),
            )
        );
    }

    #[test]
    fn test_arithmetic_is_left_associative() {
        let expr = parse_str("1 - 2 - 3").expect("should parse");
        let one_minus_two = Expr::Binary(
            BinaryOp::Sub,
            Box::new(Expr::Literal(Value::from(1))),
            Box::new(Expr::Literal(Value::from(2))),
        );
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(one_minus_two),
                Box::new(Expr::Literal(Value::from(3))),
            )
        );
    }

    #[test]
    fn test_member_index_and_call_chain() {
        let expr = parse_str(r#"len(signal.hook["name"])"#).expect("should parse");
        let member = Expr::Member(ident("signal"), "hook".into());
        let index = Expr::Index(
            Box::new(member),
            Box::new(Expr::Literal(Value::String("name".into()))),
        );
        assert_eq!(expr, Expr::Call("len".into(), vec![index]));
    }

    #[test]
    fn test_keyword_as_member_name() {
        let expr = parse_str("signal.in").expect("should parse");
        assert_eq!(expr, Expr::Member(ident("signal"), "in".into()));
    }

    #[test]
    fn test_conditional_nests_to_the_right() {
        let expr = parse_str("a ? b : c ? d : e").expect("should parse");
        assert!(matches!(
            expr,
            Expr::Conditional(_, _, ref otherwise) if matches!(**otherwise, Expr::Conditional(..))
        ));
    }

    #[test]
    fn test_array_literal_and_membership() {
        let expr = parse_str("name in ['log', 'call']").expect("should parse");
        assert!(matches!(expr, Expr::Binary(BinaryOp::In, _, ref right) if matches!(**right, Expr::Array(ref items) if items.len() == 2)));
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(parse_str("   "), Err(CompileError::Empty));
    }

    #[test]
    fn test_trailing_tokens_are_rejected() {
        let error = parse_str("true false").expect_err("should fail");
        assert!(matches!(error, CompileError::Syntax { offset: 5, .. }));
    }

    #[test]
    fn test_missing_operand() {
        let error = parse_str("signal.terminate ==").expect_err("should fail");
        assert!(matches!(error, CompileError::UnexpectedEnd(_)));
    }

    #[test]
    fn test_unclosed_paren() {
        let error = parse_str("(true && false").expect_err("should fail");
        assert!(matches!(error, CompileError::UnexpectedEnd(_)));
    }

    fn too_deep(error: CompileError) -> bool {
        matches!(error, CompileError::Syntax { ref message, .. } if message == "expression nested too deeply")
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let source = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(
            parse_str(&source).expect("should parse"),
            Expr::Literal(Value::Bool(true))
        );
    }

    #[test]
    fn test_deep_negation_is_rejected() {
        let source = format!("{}true", "!".repeat(200_000));
        assert!(too_deep(parse_str(&source).expect_err("should fail")));
    }

    #[test]
    fn test_deep_parens_are_rejected() {
        let source = format!("{}true{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(too_deep(parse_str(&source).expect_err("should fail")));
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let source = format!("1{}", " + 1".repeat(100_000));
        assert!(too_deep(parse_str(&source).expect_err("should fail")));

        let source = format!("signal{}", ".a".repeat(100_000));
        assert!(too_deep(parse_str(&source).expect_err("should fail")));
    }
}
