//! Pure, deterministic evaluation of policy sets against a decision context.
//!
//! No I/O happens here: policies and the context are handed in, the result
//! falls out. Given the same inputs the outcome is identical.
//!
//! # Combining semantics
//!
//! Within a policy, enabled rules run in ascending priority order (ties
//! stable by rule id). The **first match sets the action**; a later match
//! overrides only when its action is *strictly more restrictive*. A matched
//! `deny` short-circuits the rest of the policy. Across policies the same
//! restrictiveness ordering applies, and `deny` short-circuits the whole
//! evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use crate::policy::condition::ConditionContext;
use crate::policy::definition::{EscalationDirective, Policy, PolicyRule};
use crate::types::{ActionKind, TrustBand};

/// The intent under consideration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentContext {
    pub id: String,
    pub intent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form intent attributes (amount, target, tags, ...).
    #[serde(default)]
    pub attributes: Value,
}

/// The agent as the evaluator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityContext {
    pub id: String,
    pub entity_type: String,
    pub trust_score: u16,
    pub trust_band: TrustBand,
    #[serde(default)]
    pub attributes: Value,
}

/// Ambient request facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentContext {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub request_id: String,
}

/// Everything a policy evaluation can observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub intent: IntentContext,
    pub entity: EntityContext,
    pub environment: EnvironmentContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl EvaluationContext {
    /// Project to the JSON shape conditions resolve paths against.
    ///
    /// Intent and entity attributes are spread into their parent objects so
    /// conditions can say `intent.amount` rather than
    /// `intent.attributes.amount`; `intent.type` is an alias of
    /// `intent.intentType`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut intent = serde_json::Map::new();
        if let Value::Object(attrs) = &self.intent.attributes {
            intent.extend(attrs.clone());
        }
        intent.insert("id".into(), Value::String(self.intent.id.clone()));
        intent.insert(
            "intentType".into(),
            Value::String(self.intent.intent_type.clone()),
        );
        intent.insert("type".into(), Value::String(self.intent.intent_type.clone()));
        if let Some(description) = &self.intent.description {
            intent.insert("description".into(), Value::String(description.clone()));
        }

        let mut entity = serde_json::Map::new();
        if let Value::Object(attrs) = &self.entity.attributes {
            entity.extend(attrs.clone());
        }
        entity.insert("id".into(), Value::String(self.entity.id.clone()));
        entity.insert(
            "entityType".into(),
            Value::String(self.entity.entity_type.clone()),
        );
        entity.insert("trustScore".into(), Value::from(self.entity.trust_score));
        entity.insert(
            "trustBand".into(),
            Value::String(self.entity.trust_band.to_string()),
        );

        serde_json::json!({
            "intent": Value::Object(intent),
            "entity": Value::Object(entity),
            "trust": {
                "score": self.entity.trust_score,
                "band": self.entity.trust_band.to_string(),
            },
            "environment": {
                "timestamp": self.environment.timestamp.to_rfc3339(),
                "timezone": self.environment.timezone,
                "requestId": self.environment.request_id,
            },
            "custom": self.custom,
        })
    }
}

/// Record of one applicable policy's evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    pub policy_id: String,
    pub policy_name: String,
    pub version: u32,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    pub duration_ms: f64,
}

/// The combined result over all applicable policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
    /// True iff `final_action` is `allow`.
    pub passed: bool,
    pub final_action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationDirective>,
    pub policies_evaluated: Vec<PolicyEvaluation>,
    /// Id of the policy that supplied the final action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_policy: Option<String>,
    pub total_duration_ms: f64,
    pub evaluated_at: DateTime<Utc>,
}

/// One policy's contribution before cross-policy combining.
struct PolicyDecision {
    action: ActionKind,
    reason: Option<String>,
    constraints: Option<serde_json::Map<String, Value>>,
    escalation: Option<EscalationDirective>,
    matched_rule: Option<String>,
}

/// Stateless policy-set evaluator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every applicable policy and combine the results.
    ///
    /// With no applicable policies the outcome is `allow` — absence of
    /// policy is absence of restriction.
    #[must_use]
    pub fn evaluate(
        &self,
        policies: &[Policy],
        context: &EvaluationContext,
        namespace_filter: Option<&str>,
    ) -> EvaluationOutcome {
        let started = Instant::now();
        let data = context.to_value();
        let cond_ctx = ConditionContext {
            data: &data,
            trust_band: context.entity.trust_band,
            timestamp: context.environment.timestamp,
            timezone: context.environment.timezone.as_deref(),
        };

        let mut evaluated = Vec::new();
        let mut combined: Option<(PolicyDecision, String)> = None;

        for policy in policies {
            if !applies(policy, context, namespace_filter) {
                continue;
            }
            let policy_started = Instant::now();
            let decision = evaluate_policy(policy, &cond_ctx);
            evaluated.push(PolicyEvaluation {
                policy_id: policy.id.clone(),
                policy_name: policy.name.clone(),
                version: policy.version,
                action: decision.action,
                matched_rule: decision.matched_rule.clone(),
                duration_ms: policy_started.elapsed().as_secs_f64() * 1000.0,
            });

            let override_current = match &combined {
                None => true,
                Some((current, _)) => decision.action.is_more_restrictive_than(current.action),
            };
            if override_current {
                combined = Some((decision, policy.id.clone()));
            }
            if matches!(combined, Some((PolicyDecision { action: ActionKind::Deny, .. }, _))) {
                break;
            }
        }

        let (decision, applied_policy) = match combined {
            Some((decision, policy_id)) => (decision, Some(policy_id)),
            None => (
                PolicyDecision {
                    action: ActionKind::Allow,
                    reason: None,
                    constraints: None,
                    escalation: None,
                    matched_rule: None,
                },
                None,
            ),
        };

        EvaluationOutcome {
            passed: decision.action == ActionKind::Allow,
            final_action: decision.action,
            reason: decision.reason,
            constraints: decision.constraints,
            escalation: decision.escalation,
            policies_evaluated: evaluated,
            applied_policy,
            total_duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            evaluated_at: Utc::now(),
        }
    }
}

fn applies(policy: &Policy, context: &EvaluationContext, namespace_filter: Option<&str>) -> bool {
    let Some(target) = &policy.definition.target else {
        return true;
    };
    let list_matches = |list: &Option<Vec<String>>, value: &str| match list {
        None => true,
        Some(items) => items.iter().any(|item| item == "*" || item == value),
    };
    if !list_matches(&target.intent_types, &context.intent.intent_type) {
        return false;
    }
    if !list_matches(&target.entity_types, &context.entity.entity_type) {
        return false;
    }
    if let Some(bands) = &target.trust_bands {
        if !bands.contains(&context.entity.trust_band) {
            return false;
        }
    }
    if let (Some(namespaces), Some(filter)) = (&target.namespaces, namespace_filter) {
        if !namespaces.iter().any(|ns| ns == "*" || ns == filter) {
            return false;
        }
    }
    true
}

fn evaluate_policy(policy: &Policy, ctx: &ConditionContext<'_>) -> PolicyDecision {
    let mut rules: Vec<&PolicyRule> = policy
        .definition
        .rules
        .iter()
        .filter(|rule| rule.enabled)
        .collect();
    rules.sort_by(|a, b| (a.priority, &a.id).cmp(&(b.priority, &b.id)));

    let mut matched: Option<&PolicyRule> = None;
    for rule in rules {
        if !rule.when.evaluate(ctx) {
            continue;
        }
        let take = match matched {
            None => true,
            Some(current) => rule
                .then
                .action
                .is_more_restrictive_than(current.then.action),
        };
        if take {
            matched = Some(rule);
        }
        if matched.is_some_and(|r| r.then.action == ActionKind::Deny) {
            break;
        }
    }

    match matched {
        Some(rule) => PolicyDecision {
            action: rule.then.action,
            reason: rule.then.reason.clone(),
            constraints: rule.then.constraints.clone(),
            escalation: rule.then.escalation.clone(),
            matched_rule: Some(rule.id.clone()),
        },
        None => PolicyDecision {
            action: policy.definition.default_action,
            reason: policy.definition.default_reason.clone(),
            constraints: None,
            escalation: None,
            matched_rule: None,
        },
    }
}
