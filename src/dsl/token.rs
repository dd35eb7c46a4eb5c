//! Lexer for the expression DSL.
//!
//! Produces a flat token stream with byte offsets. Keywords are matched
//! case-insensitively; identifiers keep their original casing and may contain
//! dotted segments (`a.b.c`).

use std::fmt;
use thiserror::Error;

/// A single lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Dotted-path identifier, e.g. `intent.amount`.
    Ident(String),
    /// Quoted string literal with escapes already resolved.
    Str(String),
    /// Numeric literal (integers and decimals share one representation).
    Number(f64),
    And,
    Or,
    Not,
    In,
    Like,
    True,
    False,
    Null,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    /// Short label used in parse-error messages.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{name}`"),
            Token::Str(_) => "string literal".to_string(),
            Token::Number(n) => format!("number `{n}`"),
            Token::And => "`AND`".to_string(),
            Token::Or => "`OR`".to_string(),
            Token::Not => "`NOT`".to_string(),
            Token::In => "`IN`".to_string(),
            Token::Like => "`LIKE`".to_string(),
            Token::True => "`TRUE`".to_string(),
            Token::False => "`FALSE`".to_string(),
            Token::Null => "`NULL`".to_string(),
            Token::Eq => "`==`".to_string(),
            Token::Ne => "`!=`".to_string(),
            Token::Ge => "`>=`".to_string(),
            Token::Le => "`<=`".to_string(),
            Token::Gt => "`>`".to_string(),
            Token::Lt => "`<`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Comma => "`,`".to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A token plus the byte offset where it starts in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub offset: usize,
}

/// Lexical errors.
#[derive(Debug, Clone, PartialEq, Error, miette::Diagnostic)]
pub enum LexError {
    #[error("unterminated string literal starting at offset {offset}")]
    #[diagnostic(code(wardgate::dsl::unterminated_string))]
    UnterminatedString { offset: usize },

    #[error("unexpected character `{ch}` at offset {offset}")]
    #[diagnostic(code(wardgate::dsl::unexpected_char))]
    UnexpectedChar { ch: char, offset: usize },

    #[error("malformed number at offset {offset}")]
    #[diagnostic(code(wardgate::dsl::bad_number))]
    BadNumber { offset: usize },
}

/// Tokenize a source string.
///
/// # Errors
///
/// Returns [`LexError`] on an unterminated string, malformed number, or a
/// character outside the grammar.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
    let bytes: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let ch = bytes[pos];
        match ch {
            c if c.is_whitespace() => {
                pos += 1;
            }
            '(' => {
                tokens.push(SpannedToken {
                    token: Token::LParen,
                    offset: pos,
                });
                pos += 1;
            }
            ')' => {
                tokens.push(SpannedToken {
                    token: Token::RParen,
                    offset: pos,
                });
                pos += 1;
            }
            '[' => {
                tokens.push(SpannedToken {
                    token: Token::LBracket,
                    offset: pos,
                });
                pos += 1;
            }
            ']' => {
                tokens.push(SpannedToken {
                    token: Token::RBracket,
                    offset: pos,
                });
                pos += 1;
            }
            ',' => {
                tokens.push(SpannedToken {
                    token: Token::Comma,
                    offset: pos,
                });
                pos += 1;
            }
            '=' if bytes.get(pos + 1) == Some(&'=') => {
                tokens.push(SpannedToken {
                    token: Token::Eq,
                    offset: pos,
                });
                pos += 2;
            }
            '!' if bytes.get(pos + 1) == Some(&'=') => {
                tokens.push(SpannedToken {
                    token: Token::Ne,
                    offset: pos,
                });
                pos += 2;
            }
            '>' => {
                if bytes.get(pos + 1) == Some(&'=') {
                    tokens.push(SpannedToken {
                        token: Token::Ge,
                        offset: pos,
                    });
                    pos += 2;
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Gt,
                        offset: pos,
                    });
                    pos += 1;
                }
            }
            '<' => {
                if bytes.get(pos + 1) == Some(&'=') {
                    tokens.push(SpannedToken {
                        token: Token::Le,
                        offset: pos,
                    });
                    pos += 2;
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Lt,
                        offset: pos,
                    });
                    pos += 1;
                }
            }
            '\'' | '"' => {
                let (token, next) = lex_string(&bytes, pos, ch)?;
                tokens.push(SpannedToken { token, offset: pos });
                pos = next;
            }
            '-' if bytes.get(pos + 1).is_some_and(char::is_ascii_digit) => {
                let (token, next) = lex_number(&bytes, pos)?;
                tokens.push(SpannedToken { token, offset: pos });
                pos = next;
            }
            c if c.is_ascii_digit() => {
                let (token, next) = lex_number(&bytes, pos)?;
                tokens.push(SpannedToken { token, offset: pos });
                pos = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let (token, next) = lex_word(&bytes, pos);
                tokens.push(SpannedToken { token, offset: pos });
                pos = next;
            }
            other => {
                return Err(LexError::UnexpectedChar {
                    ch: other,
                    offset: pos,
                });
            }
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize, quote: char) -> Result<(Token, usize), LexError> {
    let mut out = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                // Backslash escapes the next character verbatim; `\\` and the
                // active quote are the documented cases.
                match chars.get(pos + 1) {
                    Some(&next) => {
                        out.push(next);
                        pos += 2;
                    }
                    None => return Err(LexError::UnterminatedString { offset: start }),
                }
            }
            c if c == quote => return Ok((Token::Str(out), pos + 1)),
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }
    Err(LexError::UnterminatedString { offset: start })
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), LexError> {
    let mut pos = start;
    if chars[pos] == '-' {
        pos += 1;
    }
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < chars.len() && chars[pos] == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit)
    {
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    let text: String = chars[start..pos].iter().collect();
    text.parse::<f64>()
        .map(|n| (Token::Number(n), pos))
        .map_err(|_| LexError::BadNumber { offset: start })
}

fn lex_word(chars: &[char], start: usize) -> (Token, usize) {
    let mut pos = start;
    let ident_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
    while pos < chars.len() && ident_char(chars[pos]) {
        pos += 1;
    }
    let word: String = chars[start..pos].iter().collect();
    // Only bare single-segment words can be keywords.
    let token = if word.contains('.') {
        Token::Ident(word)
    } else {
        match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IN" => Token::In,
            "LIKE" => Token::Like,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "NULL" => Token::Null,
            _ => Token::Ident(word),
        }
    };
    (token, pos)
}
