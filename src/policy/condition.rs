//! Structured condition tree used inside policy rules.
//!
//! Four shapes: field comparisons over the evaluation context, compound
//! and/or/not combinators, trust-band comparisons, and wall-clock time
//! conditions in a named timezone. Evaluation is total — unresolved paths
//! and malformed patterns yield `false`, never an error.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsl::ast::BinaryOp;
use crate::dsl::eval::{compare_ordered, resolve_path, stringify, values_equal};
use crate::types::TrustBand;

/// Operators usable in `field` (and `time`) conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    Exists,
    NotExists,
}

/// Combinators for `compound` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOp {
    And,
    Or,
    Not,
}

/// Which clock facet a `time` condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeField {
    /// Hour of day, 0–23.
    Hour,
    /// Day of week, 0 = Sunday .. 6 = Saturday.
    DayOfWeek,
    /// ISO calendar date, `YYYY-MM-DD`.
    Date,
}

/// The condition sum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Field {
        field: String,
        op: FieldOp,
        #[serde(default)]
        value: Value,
    },
    Compound {
        operator: CompoundOp,
        conditions: Vec<Condition>,
    },
    Trust {
        band: TrustBand,
        op: FieldOp,
    },
    Time {
        field: TimeField,
        op: FieldOp,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
}

/// Everything a condition can look at during evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// The full evaluation context projected to JSON
    /// (`intent`, `entity`, `environment`, `custom`).
    pub data: &'a Value,
    /// The agent's current trust band.
    pub trust_band: TrustBand,
    /// `environment.timestamp`.
    pub timestamp: DateTime<Utc>,
    /// Context-level default timezone for time conditions.
    pub timezone: Option<&'a str>,
}

impl Condition {
    /// Evaluate this condition. Total: every input produces a boolean.
    #[must_use]
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> bool {
        match self {
            Condition::Field { field, op, value } => {
                let resolved = resolve_path(ctx.data, field);
                apply_field_op(*op, resolved, value)
            }
            Condition::Compound {
                operator,
                conditions,
            } => match operator {
                CompoundOp::And => conditions.iter().all(|c| c.evaluate(ctx)),
                CompoundOp::Or => conditions.iter().any(|c| c.evaluate(ctx)),
                CompoundOp::Not => match conditions.first() {
                    Some(first) => !first.evaluate(ctx),
                    None => {
                        tracing::warn!("`not` condition with no operands evaluates to false");
                        false
                    }
                },
            },
            Condition::Trust { band, op } => {
                let current = Value::from(ctx.trust_band.index() as u64);
                let expected = Value::from(band.index() as u64);
                apply_field_op(*op, Some(&current), &expected)
            }
            Condition::Time {
                field,
                op,
                value,
                timezone,
            } => {
                let tz = resolve_timezone(timezone.as_deref().or(ctx.timezone));
                let local = ctx.timestamp.with_timezone(&tz);
                let materialized = match field {
                    TimeField::Hour => Value::from(u64::from(local.hour())),
                    TimeField::DayOfWeek => {
                        Value::from(u64::from(local.weekday().num_days_from_sunday()))
                    }
                    TimeField::Date => Value::String(local.format("%Y-%m-%d").to_string()),
                };
                apply_field_op(*op, Some(&materialized), value)
            }
        }
    }
}

fn resolve_timezone(name: Option<&str>) -> Tz {
    match name {
        None => Tz::UTC,
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = name, "unknown timezone, falling back to UTC");
            Tz::UTC
        }),
    }
}

fn apply_field_op(op: FieldOp, resolved: Option<&Value>, expected: &Value) -> bool {
    match op {
        FieldOp::Exists => resolved.is_some(),
        FieldOp::NotExists => resolved.is_none(),
        _ => {
            let null = Value::Null;
            let actual = resolved.unwrap_or(&null);
            match op {
                FieldOp::Equals => values_equal(actual, expected),
                FieldOp::NotEquals => !values_equal(actual, expected),
                FieldOp::GreaterThan => compare_ordered(BinaryOp::Gt, actual, expected),
                FieldOp::LessThan => compare_ordered(BinaryOp::Lt, actual, expected),
                FieldOp::GreaterThanOrEqual => compare_ordered(BinaryOp::Ge, actual, expected),
                FieldOp::LessThanOrEqual => compare_ordered(BinaryOp::Le, actual, expected),
                FieldOp::In => in_set(actual, expected),
                FieldOp::NotIn => !in_set(actual, expected),
                FieldOp::Contains => contains(actual, expected),
                FieldOp::NotContains => !contains(actual, expected),
                FieldOp::StartsWith => with_strings(actual, expected, |s, p| s.starts_with(p)),
                FieldOp::EndsWith => with_strings(actual, expected, |s, p| s.ends_with(p)),
                FieldOp::Matches => matches_regex(actual, expected),
                FieldOp::Exists | FieldOp::NotExists => unreachable!("handled above"),
            }
        }
    }
}

fn in_set(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => s.contains(&stringify(expected)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        _ => false,
    }
}

fn with_strings(actual: &Value, expected: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
    match (actual, expected) {
        (Value::Null, _) | (_, Value::Null) => false,
        _ => f(&stringify(actual), &stringify(expected)),
    }
}

/// The pattern is compiled once per evaluation; an invalid pattern is a
/// warning and `false`, never an error.
fn matches_regex(actual: &Value, expected: &Value) -> bool {
    let Value::String(pattern) = expected else {
        return false;
    };
    if actual.is_null() {
        return false;
    }
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(&stringify(actual)),
        Err(err) => {
            tracing::warn!(pattern = %pattern, error = %err, "invalid regex in `matches` condition");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(data: &'a Value, band: TrustBand) -> ConditionContext<'a> {
        ConditionContext {
            data,
            trust_band: band,
            timestamp: "2026-01-20T10:00:00Z".parse().unwrap(),
            timezone: None,
        }
    }

    fn field(field: &str, op: FieldOp, value: Value) -> Condition {
        Condition::Field {
            field: field.into(),
            op,
            value,
        }
    }

    #[test]
    fn field_operators() {
        let data = json!({
            "intent": {"intentType": "payment", "amount": 5000, "tags": ["bulk", "eu"]},
        });
        let c = ctx(&data, TrustBand::T2);

        assert!(field("intent.intentType", FieldOp::Equals, json!("payment")).evaluate(&c));
        assert!(field("intent.amount", FieldOp::GreaterThanOrEqual, json!(1000)).evaluate(&c));
        assert!(field("intent.tags", FieldOp::Contains, json!("eu")).evaluate(&c));
        assert!(field("intent.intentType", FieldOp::StartsWith, json!("pay")).evaluate(&c));
        assert!(field("intent.intentType", FieldOp::Matches, json!("^pay.+$")).evaluate(&c));
        assert!(field("intent.amount", FieldOp::In, json!([100, 5000])).evaluate(&c));
        assert!(field("intent.missing", FieldOp::NotExists, json!(null)).evaluate(&c));
        assert!(!field("intent.missing", FieldOp::GreaterThan, json!(1)).evaluate(&c));
        assert!(field("intent.missing", FieldOp::NotIn, json!(["x"])).evaluate(&c));
    }

    #[test]
    fn invalid_regex_is_false() {
        let data = json!({"a": "x"});
        let c = ctx(&data, TrustBand::T0);
        assert!(!field("a", FieldOp::Matches, json!("(unclosed")).evaluate(&c));
    }

    #[test]
    fn trust_comparisons() {
        let data = json!({});
        let c = ctx(&data, TrustBand::T2);
        let lt = Condition::Trust {
            band: TrustBand::T4,
            op: FieldOp::LessThan,
        };
        let ge = Condition::Trust {
            band: TrustBand::T2,
            op: FieldOp::GreaterThanOrEqual,
        };
        assert!(lt.evaluate(&c));
        assert!(ge.evaluate(&c));
    }

    #[test]
    fn compound_combinators() {
        let data = json!({"a": 1, "b": 2});
        let c = ctx(&data, TrustBand::T0);
        let yes = field("a", FieldOp::Equals, json!(1));
        let no = field("b", FieldOp::Equals, json!(99));
        assert!(Condition::Compound {
            operator: CompoundOp::And,
            conditions: vec![yes.clone(), yes.clone()],
        }
        .evaluate(&c));
        assert!(Condition::Compound {
            operator: CompoundOp::Or,
            conditions: vec![no.clone(), yes.clone()],
        }
        .evaluate(&c));
        assert!(Condition::Compound {
            operator: CompoundOp::Not,
            conditions: vec![no],
        }
        .evaluate(&c));
    }

    #[test]
    fn time_condition_respects_timezone() {
        let data = json!({});
        // 10:00 UTC is 05:00 in New York (EST, winter).
        let c = ctx(&data, TrustBand::T0);
        let hour_utc = Condition::Time {
            field: TimeField::Hour,
            op: FieldOp::Equals,
            value: json!(10),
            timezone: None,
        };
        let hour_ny = Condition::Time {
            field: TimeField::Hour,
            op: FieldOp::Equals,
            value: json!(5),
            timezone: Some("America/New_York".into()),
        };
        assert!(hour_utc.evaluate(&c));
        assert!(hour_ny.evaluate(&c));

        let dow = Condition::Time {
            field: TimeField::DayOfWeek,
            op: FieldOp::Equals,
            value: json!(2), // 2026-01-20 is a Tuesday
            timezone: None,
        };
        assert!(dow.evaluate(&c));

        let date = Condition::Time {
            field: TimeField::Date,
            op: FieldOp::Equals,
            value: json!("2026-01-20"),
            timezone: None,
        };
        assert!(date.evaluate(&c));
    }

    #[test]
    fn time_condition_handles_dst_transition() {
        let data = json!({});
        // US DST begins 2026-03-08: 06:59Z is 01:59 EST, 07:00Z is 03:00 EDT
        // (02:00 local never happens).
        let before = ConditionContext {
            data: &data,
            trust_band: TrustBand::T0,
            timestamp: "2026-03-08T06:59:00Z".parse().unwrap(),
            timezone: Some("America/New_York"),
        };
        let after = ConditionContext {
            timestamp: "2026-03-08T07:00:00Z".parse().unwrap(),
            ..before
        };
        let hour = |h: i64| Condition::Time {
            field: TimeField::Hour,
            op: FieldOp::Equals,
            value: json!(h),
            timezone: None,
        };
        assert!(hour(1).evaluate(&before));
        assert!(hour(3).evaluate(&after));
        assert!(!hour(2).evaluate(&after));
    }

    #[test]
    fn condition_json_shape() {
        let cond: Condition = serde_json::from_value(json!({
            "type": "compound",
            "operator": "and",
            "conditions": [
                {"type": "field", "field": "intent.intentType", "op": "equals", "value": "payment"},
                {"type": "trust", "band": "T4", "op": "less_than"},
                {"type": "time", "field": "hour", "op": "greater_than_or_equal", "value": 9}
            ]
        }))
        .unwrap();
        match cond {
            Condition::Compound { conditions, .. } => assert_eq!(conditions.len(), 3),
            other => panic!("expected compound, got {other:?}"),
        }
    }
}
