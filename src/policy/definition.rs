//! Policy model: the stored row, the versioned definition document, rules,
//! actions, and definition validation.
//!
//! A definition is authored as JSON (`version: "1.0"`). Validation walks the
//! raw document and reports *all* problems with their paths before the typed
//! model is built, so authors get one complete round of feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::canonical::{canonical_json, sha256_hex};
use crate::errors::ValidationIssue;
use crate::policy::condition::Condition;
use crate::types::{ActionKind, TrustBand};

/// Length of the truncated definition checksum, in hex characters.
pub const CHECKSUM_LEN: usize = 16;

/// Lifecycle status of a policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Published,
    Deprecated,
    Archived,
}

/// A stored policy: current row plus denormalised metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: u32,
    pub status: PolicyStatus,
    pub definition: PolicyDefinition,
    /// First 16 hex chars of SHA-256 over the canonicalised definition.
    pub checksum: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// One archived prior version of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    pub id: String,
    pub policy_id: String,
    pub version: u32,
    pub definition: PolicyDefinition,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The authored policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinition {
    /// Schema version; only `"1.0"` is accepted.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PolicyTarget>,
    pub rules: Vec<PolicyRule>,
    pub default_action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Applicability filter. Absent lists match everything; `"*"` is a wildcard
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_bands: Option<Vec<TrustBand>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
}

/// One rule: evaluated in ascending `priority` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub when: Condition,
    pub then: PolicyAction,
}

fn default_enabled() -> bool {
    true
}

/// The action a matched rule produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAction {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationDirective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_json::Map<String, Value>>,
}

/// Escalation parameters attached to an `escalate` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationDirective {
    /// The authority the escalation is routed to.
    pub to: String,
    /// Resolution window.
    pub timeout: TimeoutSpec,
    #[serde(default)]
    pub require_justification: bool,
    #[serde(default)]
    pub auto_deny_on_timeout: bool,
}

/// A timeout authored either as minutes (`5`) or as a suffixed string
/// (`"5m"`, `"2h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSpec {
    minutes: u32,
}

impl TimeoutSpec {
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    #[must_use]
    pub fn minutes(self) -> u32 {
        self.minutes
    }
}

impl FromStr for TimeoutSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, scale) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            Some((idx, unit)) => {
                let scale = match unit {
                    'm' | 'M' => 1,
                    'h' | 'H' => 60,
                    other => return Err(format!("unknown timeout unit `{other}`")),
                };
                (&s[..idx], scale)
            }
            None => (s, 1),
        };
        digits
            .parse::<u32>()
            .map(|n| TimeoutSpec { minutes: n * scale })
            .map_err(|_| format!("invalid timeout `{s}`"))
    }
}

impl Serialize for TimeoutSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.minutes)
    }
}

impl<'de> Deserialize<'de> for TimeoutSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Minutes(u32),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Minutes(minutes) => Ok(TimeoutSpec { minutes }),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Truncated SHA-256 checksum over the canonicalised definition JSON.
#[must_use]
pub fn compute_checksum(definition: &Value) -> String {
    let mut digest = sha256_hex(&canonical_json(definition));
    digest.truncate(CHECKSUM_LEN);
    digest
}

impl PolicyDefinition {
    /// Parse a raw document after [`validate_definition`] reported no issues.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the document does not match the typed
    /// model; with a clean validation pass this only happens on shape drift
    /// between validator and model, which is a bug.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Project back to a canonical JSON value (used for checksums).
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("policy definition serializes")
    }
}

const KNOWN_FIELD_OPS: &[&str] = &[
    "equals",
    "not_equals",
    "greater_than",
    "less_than",
    "greater_than_or_equal",
    "less_than_or_equal",
    "in",
    "not_in",
    "contains",
    "not_contains",
    "starts_with",
    "ends_with",
    "matches",
    "exists",
    "not_exists",
];

/// Validate a raw definition document. Returns every issue found; an empty
/// vector means the document can be loaded with
/// [`PolicyDefinition::from_value`].
#[must_use]
pub fn validate_definition(doc: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(root) = doc.as_object() else {
        issues.push(ValidationIssue::new("", "definition must be an object", "not_object"));
        return issues;
    };

    match root.get("version").and_then(Value::as_str) {
        Some("1.0") => {}
        Some(other) => issues.push(ValidationIssue::new(
            "version",
            format!("unsupported definition version `{other}`, expected \"1.0\""),
            "unsupported_version",
        )),
        None => issues.push(ValidationIssue::new(
            "version",
            "missing required string field `version`",
            "missing_field",
        )),
    }

    match root.get("defaultAction").and_then(Value::as_str) {
        Some(action) if ActionKind::parse(action).is_some() => {}
        Some(action) => issues.push(ValidationIssue::new(
            "defaultAction",
            format!("unknown action `{action}`"),
            "unknown_action",
        )),
        None => issues.push(ValidationIssue::new(
            "defaultAction",
            "missing required field `defaultAction`",
            "missing_field",
        )),
    }

    match root.get("rules") {
        Some(Value::Array(rules)) => {
            for (idx, rule) in rules.iter().enumerate() {
                validate_rule(rule, &format!("rules[{idx}]"), &mut issues);
            }
        }
        Some(_) => issues.push(ValidationIssue::new(
            "rules",
            "`rules` must be an array",
            "not_array",
        )),
        None => issues.push(ValidationIssue::new(
            "rules",
            "missing required field `rules`",
            "missing_field",
        )),
    }

    if let Some(target) = root.get("target") {
        validate_target(target, &mut issues);
    }

    issues
}

fn validate_rule(rule: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = rule.as_object() else {
        issues.push(ValidationIssue::new(path, "rule must be an object", "not_object"));
        return;
    };

    for key in ["id", "name"] {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => {}
            Some(_) => issues.push(ValidationIssue::new(
                format!("{path}.{key}"),
                format!("`{key}` must be a non-empty string"),
                "empty_field",
            )),
            None => issues.push(ValidationIssue::new(
                format!("{path}.{key}"),
                format!("missing required string field `{key}`"),
                "missing_field",
            )),
        }
    }

    if !obj.get("priority").is_some_and(Value::is_number) {
        issues.push(ValidationIssue::new(
            format!("{path}.priority"),
            "`priority` must be a number",
            "not_number",
        ));
    }

    if let Some(enabled) = obj.get("enabled") {
        if !enabled.is_boolean() {
            issues.push(ValidationIssue::new(
                format!("{path}.enabled"),
                "`enabled` must be a boolean",
                "not_boolean",
            ));
        }
    }

    match obj.get("when") {
        Some(when) => validate_condition(when, &format!("{path}.when"), issues),
        None => issues.push(ValidationIssue::new(
            format!("{path}.when"),
            "missing required condition `when`",
            "missing_field",
        )),
    }

    match obj.get("then").and_then(|t| t.get("action")).and_then(Value::as_str) {
        Some(action) if ActionKind::parse(action).is_some() => {}
        Some(action) => issues.push(ValidationIssue::new(
            format!("{path}.then.action"),
            format!("unknown action `{action}`"),
            "unknown_action",
        )),
        None => issues.push(ValidationIssue::new(
            format!("{path}.then.action"),
            "missing required field `then.action`",
            "missing_field",
        )),
    }
}

fn validate_condition(cond: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = cond.as_object() else {
        issues.push(ValidationIssue::new(path, "condition must be an object", "not_object"));
        return;
    };

    let kind = obj.get("type").and_then(Value::as_str);
    match kind {
        Some("field") => {
            if !obj.get("field").is_some_and(Value::is_string) {
                issues.push(ValidationIssue::new(
                    format!("{path}.field"),
                    "field condition requires a string `field`",
                    "missing_field",
                ));
            }
            validate_op(obj.get("op"), &format!("{path}.op"), issues);
        }
        Some("compound") => {
            match obj.get("operator").and_then(Value::as_str) {
                Some("and" | "or" | "not") => {}
                Some(op) => issues.push(ValidationIssue::new(
                    format!("{path}.operator"),
                    format!("unknown compound operator `{op}`"),
                    "unknown_operator",
                )),
                None => issues.push(ValidationIssue::new(
                    format!("{path}.operator"),
                    "missing compound `operator`",
                    "missing_field",
                )),
            }
            match obj.get("conditions") {
                Some(Value::Array(nested)) => {
                    for (idx, inner) in nested.iter().enumerate() {
                        validate_condition(inner, &format!("{path}.conditions[{idx}]"), issues);
                    }
                }
                _ => issues.push(ValidationIssue::new(
                    format!("{path}.conditions"),
                    "compound condition requires a `conditions` array",
                    "not_array",
                )),
            }
        }
        Some("trust") => {
            match obj.get("band").and_then(Value::as_str) {
                Some(band) if band.parse::<TrustBand>().is_ok() => {}
                Some(band) => issues.push(ValidationIssue::new(
                    format!("{path}.band"),
                    format!("`{band}` is not a trust band in T0..T5"),
                    "unknown_band",
                )),
                None => issues.push(ValidationIssue::new(
                    format!("{path}.band"),
                    "missing trust `band`",
                    "missing_field",
                )),
            }
            validate_op(obj.get("op"), &format!("{path}.op"), issues);
        }
        Some("time") => {
            match obj.get("field").and_then(Value::as_str) {
                Some("hour" | "dayOfWeek" | "date") => {}
                Some(field) => issues.push(ValidationIssue::new(
                    format!("{path}.field"),
                    format!("unknown time field `{field}`"),
                    "unknown_time_field",
                )),
                None => issues.push(ValidationIssue::new(
                    format!("{path}.field"),
                    "missing time `field`",
                    "missing_field",
                )),
            }
            validate_op(obj.get("op"), &format!("{path}.op"), issues);
        }
        Some(other) => issues.push(ValidationIssue::new(
            format!("{path}.type"),
            format!("unknown condition type `{other}`"),
            "unknown_condition_type",
        )),
        None => issues.push(ValidationIssue::new(
            format!("{path}.type"),
            "condition requires a `type` discriminator",
            "missing_field",
        )),
    }
}

fn validate_op(op: Option<&Value>, path: &str, issues: &mut Vec<ValidationIssue>) {
    match op.and_then(Value::as_str) {
        Some(op) if KNOWN_FIELD_OPS.contains(&op) => {}
        Some(op) => issues.push(ValidationIssue::new(
            path,
            format!("unknown operator `{op}`"),
            "unknown_operator",
        )),
        None => issues.push(ValidationIssue::new(path, "missing operator `op`", "missing_field")),
    }
}

fn validate_target(target: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = target.as_object() else {
        issues.push(ValidationIssue::new("target", "`target` must be an object", "not_object"));
        return;
    };
    for key in ["intentTypes", "entityTypes", "namespaces"] {
        if let Some(value) = obj.get(key) {
            let ok = value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string));
            if !ok {
                issues.push(ValidationIssue::new(
                    format!("target.{key}"),
                    format!("`target.{key}` must be an array of strings"),
                    "not_string_array",
                ));
            }
        }
    }
    if let Some(bands) = obj.get("trustBands") {
        let ok = bands.as_array().is_some_and(|items| {
            items
                .iter()
                .all(|b| b.as_str().is_some_and(|s| s.parse::<TrustBand>().is_ok()))
        });
        if !ok {
            issues.push(ValidationIssue::new(
                "target.trustBands",
                "`target.trustBands` must be an array of bands in T0..T5",
                "unknown_band",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_definition() -> Value {
        json!({
            "version": "1.0",
            "rules": [{
                "id": "r1",
                "name": "deny low-trust payments",
                "priority": 10,
                "when": {
                    "type": "compound",
                    "operator": "and",
                    "conditions": [
                        {"type": "field", "field": "intent.intentType", "op": "equals", "value": "payment"},
                        {"type": "trust", "band": "T4", "op": "less_than"}
                    ]
                },
                "then": {"action": "deny", "reason": "requires T4"}
            }],
            "defaultAction": "allow"
        })
    }

    #[test]
    fn valid_definition_passes_and_parses() {
        let doc = minimal_definition();
        assert!(validate_definition(&doc).is_empty());
        let parsed = PolicyDefinition::from_value(&doc).unwrap();
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.default_action, ActionKind::Allow);
        assert!(parsed.rules[0].enabled);
    }

    #[test]
    fn issues_carry_paths() {
        let doc = json!({
            "version": "2.0",
            "rules": [{
                "id": "",
                "name": "x",
                "priority": "high",
                "when": {"type": "field", "field": "a", "op": "wat"},
                "then": {"action": "obliterate"}
            }],
            "defaultAction": "allow"
        });
        let issues = validate_definition(&doc);
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"version"));
        assert!(paths.contains(&"rules[0].id"));
        assert!(paths.contains(&"rules[0].priority"));
        assert!(paths.contains(&"rules[0].when.op"));
        assert!(paths.contains(&"rules[0].then.action"));
    }

    #[test]
    fn checksum_is_stable_across_key_order() {
        let a = json!({"version": "1.0", "rules": [], "defaultAction": "allow"});
        let b = json!({"defaultAction": "allow", "version": "1.0", "rules": []});
        assert_eq!(compute_checksum(&a), compute_checksum(&b));
        assert_eq!(compute_checksum(&a).len(), CHECKSUM_LEN);
    }

    #[test]
    fn timeout_spec_accepts_both_shapes() {
        let d: EscalationDirective =
            serde_json::from_value(json!({"to": "ops", "timeout": "5m", "autoDenyOnTimeout": true}))
                .unwrap();
        assert_eq!(d.timeout.minutes(), 5);
        assert!(d.auto_deny_on_timeout);

        let d: EscalationDirective =
            serde_json::from_value(json!({"to": "ops", "timeout": 120})).unwrap();
        assert_eq!(d.timeout.minutes(), 120);

        let d: EscalationDirective =
            serde_json::from_value(json!({"to": "ops", "timeout": "2h"})).unwrap();
        assert_eq!(d.timeout.minutes(), 120);
    }
}
