//! Embedded expression DSL for compact boolean predicates.
//!
//! Policies and ad-hoc governance rules can express conditions as strings
//! like:
//!
//! ```text
//! user.role IN ['admin', 'supervisor'] OR trust.score >= 800
//! ```
//!
//! The pipeline is the classic three stages: [`tokenize`] → [`parse`] →
//! [`evaluate`]. [`compile`] bundles a parsed expression into an immutable,
//! thread-safe [`CompiledExpr`]; [`validate`] reports syntax problems without
//! evaluating.
//!
//! # Semantics
//!
//! * Identifiers are dotted paths resolved through the nested JSON context;
//!   a missing segment yields `null`.
//! * Comparisons coerce numerically when either side is a number and both
//!   parse; otherwise they compare as strings. Ordered comparisons against
//!   `null` are `false`.
//! * `LIKE` is a case-insensitive anchored match with `%` (any run) and `_`
//!   (single character) wildcards.
//! * `AND`/`OR` short-circuit using JSON truthiness: booleans as-is,
//!   non-zero numbers, non-empty strings and arrays.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use wardgate::dsl;
//!
//! let expr = dsl::compile("user.role IN ['admin'] OR trust.score >= 800").unwrap();
//! assert!(expr.evaluate(&json!({"trust": {"score": 850}})));
//! assert!(!expr.evaluate(&json!({"trust": {"score": 799}})));
//! ```

pub mod ast;
pub mod eval;
pub mod parser;
pub mod token;

pub use ast::{BinaryOp, Expr, Literal};
pub use eval::{evaluate, truthy, CompiledExpr};
pub use parser::{parse, ParseError};
pub use token::{tokenize, LexError, SpannedToken, Token};

/// Outcome of [`validate`]: either a usable AST or the first syntax error.
#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<String>,
    pub ast: Option<Expr>,
}

/// Compile an expression source string into a reusable [`CompiledExpr`].
///
/// # Errors
///
/// Returns [`ParseError`] when the source does not lex or parse.
pub fn compile(source: &str) -> Result<CompiledExpr, ParseError> {
    Ok(CompiledExpr::new(parse(source)?))
}

/// Check an expression without evaluating it. Never panics; all syntax
/// problems are reported in the returned [`Validation`].
#[must_use]
pub fn validate(source: &str) -> Validation {
    match parse(source) {
        Ok(ast) => Validation {
            valid: true,
            error: None,
            ast: Some(ast),
        },
        Err(err) => Validation {
            valid: false,
            error: Some(err.to_string()),
            ast: None,
        },
    }
}
