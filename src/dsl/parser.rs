//! Recursive-descent parser for the expression DSL.
//!
//! Precedence, lowest binding first: `OR` < `AND` < `NOT` < comparison
//! (`== != >= <= > < IN LIKE`) < primary.

use thiserror::Error;

use super::ast::{BinaryOp, Expr, Literal};
use super::token::{tokenize, LexError, SpannedToken, Token};

/// Parse errors, including lexical ones from the embedded tokenizer.
#[derive(Debug, Clone, PartialEq, Error, miette::Diagnostic)]
pub enum ParseError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error("empty expression")]
    #[diagnostic(code(wardgate::dsl::empty_expression))]
    Empty,

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    #[diagnostic(code(wardgate::dsl::unexpected_token))]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of expression, expected {expected}")]
    #[diagnostic(code(wardgate::dsl::unexpected_end))]
    UnexpectedEnd { expected: &'static str },

    #[error("trailing {found} at offset {offset} after a complete expression")]
    #[diagnostic(code(wardgate::dsl::trailing_tokens))]
    Trailing { found: String, offset: usize },
}

/// Parse a source string into an [`Expr`].
///
/// # Errors
///
/// Returns [`ParseError`] for lexical errors, an empty source, unexpected
/// tokens, or trailing input after a complete expression.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::Trailing {
            found: extra.token.label(),
            offset: extra.offset,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &'static str, want: &Token) -> Result<(), ParseError> {
        match self.advance() {
            Some(tok) if tok.token == *want => Ok(()),
            Some(tok) => Err(ParseError::UnexpectedToken {
                found: tok.token.label(),
                expected,
                offset: tok.offset,
            }),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek().map(|t| &t.token), Some(Token::Or)) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary_expr()?;
        while matches!(self.peek().map(|t| &t.token), Some(Token::And)) {
            self.advance();
            let right = self.unary_expr()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek().map(|t| &t.token), Some(Token::Not)) {
            self.advance();
            let operand = self.unary_expr()?;
            return Ok(Expr::not(operand));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.primary()?;
        let op = match self.peek().map(|t| &t.token) {
            Some(Token::Eq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::In) => Some(BinaryOp::In),
            Some(Token::Like) => Some(BinaryOp::Like),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let right = self.primary()?;
                Ok(Expr::binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self
            .advance()
            .ok_or(ParseError::UnexpectedEnd { expected: "a value" })?;
        match tok.token {
            Token::Ident(path) => Ok(Expr::Ident { path }),
            Token::Str(s) => Ok(Expr::literal(Literal::Str(s))),
            Token::Number(n) => Ok(Expr::literal(Literal::Number(n))),
            Token::True => Ok(Expr::literal(Literal::Bool(true))),
            Token::False => Ok(Expr::literal(Literal::Bool(false))),
            Token::Null => Ok(Expr::literal(Literal::Null)),
            Token::LParen => {
                let inner = self.or_expr()?;
                self.expect("`)`", &Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if matches!(self.peek().map(|t| &t.token), Some(Token::RBracket)) {
                    self.advance();
                    return Ok(Expr::Array { items });
                }
                loop {
                    items.push(self.primary()?);
                    match self.advance() {
                        Some(SpannedToken {
                            token: Token::Comma,
                            ..
                        }) => continue,
                        Some(SpannedToken {
                            token: Token::RBracket,
                            ..
                        }) => break,
                        Some(other) => {
                            return Err(ParseError::UnexpectedToken {
                                found: other.token.label(),
                                expected: "`,` or `]`",
                                offset: other.offset,
                            });
                        }
                        None => {
                            return Err(ParseError::UnexpectedEnd { expected: "`,` or `]`" });
                        }
                    }
                }
                Ok(Expr::Array { items })
            }
            other => Err(ParseError::UnexpectedToken {
                found: other.label(),
                expected: "a value",
                offset: tok.offset,
            }),
        }
    }
}
