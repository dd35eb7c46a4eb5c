//! Tree-walking evaluator for the expression DSL.
//!
//! Evaluation is total: every well-formed [`Expr`] produces a boolean for any
//! context. Missing identifier paths resolve to `null`, and the coercion
//! rules below never fail — they only yield `false`.

use regex::RegexBuilder;
use serde_json::Value;

use super::ast::{BinaryOp, Expr, Literal};

/// A parsed expression bundled for repeated evaluation. Immutable and
/// shareable across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    ast: Expr,
}

impl CompiledExpr {
    #[must_use]
    pub fn new(ast: Expr) -> Self {
        Self { ast }
    }

    /// The underlying AST.
    #[must_use]
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate against a JSON context.
    #[must_use]
    pub fn evaluate(&self, context: &Value) -> bool {
        evaluate(&self.ast, context)
    }
}

/// Evaluate an expression tree against a JSON context, applying truthiness
/// to the result.
#[must_use]
pub fn evaluate(expr: &Expr, context: &Value) -> bool {
    truthy(&eval_value(expr, context))
}

/// JSON truthiness: booleans as-is, non-zero numbers, non-empty strings and
/// arrays; `null` is false; objects are truthy.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn eval_value(expr: &Expr, context: &Value) -> Value {
    match expr {
        Expr::Ident { path } => resolve_path(context, path).cloned().unwrap_or(Value::Null),
        Expr::Literal { value } => match value {
            Literal::Str(s) => Value::String(s.clone()),
            Literal::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        },
        Expr::Array { items } => {
            Value::Array(items.iter().map(|e| eval_value(e, context)).collect())
        }
        Expr::Not { operand } => Value::Bool(!truthy(&eval_value(operand, context))),
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let lhs = eval_value(left, context);
                if !truthy(&lhs) {
                    return Value::Bool(false);
                }
                Value::Bool(truthy(&eval_value(right, context)))
            }
            BinaryOp::Or => {
                let lhs = eval_value(left, context);
                if truthy(&lhs) {
                    return Value::Bool(true);
                }
                Value::Bool(truthy(&eval_value(right, context)))
            }
            BinaryOp::Eq => Value::Bool(values_equal(
                &eval_value(left, context),
                &eval_value(right, context),
            )),
            BinaryOp::Ne => Value::Bool(!values_equal(
                &eval_value(left, context),
                &eval_value(right, context),
            )),
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => {
                let lhs = eval_value(left, context);
                let rhs = eval_value(right, context);
                Value::Bool(compare_ordered(*op, &lhs, &rhs))
            }
            BinaryOp::In => {
                let needle = eval_value(left, context);
                let haystack = eval_value(right, context);
                let found = match haystack {
                    Value::Array(items) => items.iter().any(|item| values_equal(&needle, item)),
                    _ => false,
                };
                Value::Bool(found)
            }
            BinaryOp::Like => {
                let lhs = eval_value(left, context);
                let rhs = eval_value(right, context);
                Value::Bool(like_match(&lhs, &rhs))
            }
        },
    }
}

/// Walk a dotted path through nested objects. Any missing or non-object
/// segment ends the walk with `None`.
pub(crate) fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => fmt_number(n.as_f64().unwrap_or(0.0)),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Equality with the DSL's coercion rules: `null` equals only `null`;
/// numeric when either side is a number and both parse; else string equality.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => {
            let numeric = matches!(left, Value::Number(_)) || matches!(right, Value::Number(_));
            if numeric {
                if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
                    return a == b;
                }
            }
            stringify(left) == stringify(right)
        }
    }
}

/// Ordered comparison; `null` on either side is always false.
pub(crate) fn compare_ordered(op: BinaryOp, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    let ordering = {
        let numeric = matches!(left, Value::Number(_)) || matches!(right, Value::Number(_));
        let num_pair = if numeric {
            as_number(left).zip(as_number(right))
        } else {
            None
        };
        match num_pair {
            Some((a, b)) => a.partial_cmp(&b),
            None => Some(stringify(left).cmp(&stringify(right))),
        }
    };
    let Some(ord) = ordering else { return false };
    match op {
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Ge => ord.is_ge(),
        BinaryOp::Le => ord.is_le(),
        _ => false,
    }
}

/// `LIKE` with `%` (any run) and `_` (single char), case-insensitive,
/// anchored to the full string.
fn like_match(value: &Value, pattern: &Value) -> bool {
    let Value::String(pattern) = pattern else {
        return false;
    };
    if value.is_null() {
        return false;
    }
    let subject = stringify(value);
    let mut translated = String::with_capacity(pattern.len() + 2);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    RegexBuilder::new(&translated)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(&subject))
        .unwrap_or(false)
}
