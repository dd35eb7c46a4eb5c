//! Expression AST — a small tagged union, mirroring the token grammar.

use serde::{Deserialize, Serialize};

/// Literal values the grammar can produce directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Str(String),
    Number(f64),
    Bool(bool),
    Null,
}

/// Binary operators, comparison and logical alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    Like,
}

/// A parsed expression tree. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Dotted-path context lookup.
    Ident { path: String },
    /// Literal value.
    Literal { value: Literal },
    /// Array literal, e.g. `['admin', 'supervisor']`.
    Array { items: Vec<Expr> },
    /// Logical negation.
    Not { operand: Box<Expr> },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    #[must_use]
    pub fn ident(path: impl Into<String>) -> Self {
        Expr::Ident { path: path.into() }
    }

    #[must_use]
    pub fn literal(value: Literal) -> Self {
        Expr::Literal { value }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn not(operand: Expr) -> Self {
        Expr::Not {
            operand: Box::new(operand),
        }
    }
}
