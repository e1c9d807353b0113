//! Rule-set editor: invariant-preserving edits used by the admin surface.
//!
//! Every operation takes the current rule set by reference and returns a new
//! one, so a caller can persist the result as a single document replace and
//! a rejected edit leaves nothing half-applied.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::conflict::{MoveDecision, RuleEdit};
use super::money;
use super::rules::{
    Condition, MatchType, PaymentRule, Rule, RuleSet, SharedRule, ValidationFunction,
};
use crate::error::CoreError;
use crate::types::{FunctionId, Timestamp};

/// Prefix of generated function ids.
pub const FUNCTION_ID_PREFIX: &str = "fn_";

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// A rule as submitted by the admin editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleDraft {
    #[serde(rename = "minval")]
    MinCartValue {
        #[serde(with = "money::decimal_text")]
        value: Decimal,
    },
    #[serde(rename = "orderlimit")]
    OrderLimit {
        #[serde(with = "money::integer_text")]
        value: i64,
    },
    #[serde(rename = "payment")]
    Payment(PaymentDraft),
}

/// A payment rule draft: the gateway set plus one condition to add.
///
/// When an existing payment rule is being edited only `gateways` and
/// `match_type` are applied and `condition` may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub gateways: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(rename = "conditionMatchType", default)]
    pub match_type: MatchType,
}

impl RuleDraft {
    fn shared(&self) -> Option<SharedRule> {
        match self {
            Self::MinCartValue { value } => Some(SharedRule::MinCartValue { value: *value }),
            Self::OrderLimit { value } => Some(SharedRule::OrderLimit { value: *value }),
            Self::Payment(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Add a new, disabled function with no rules.
///
/// The title is trimmed, required, and unique ignoring case. The id is
/// `fn_<unix-millis>`, bumped until it is unused.
pub fn create_function(
    rule_set: &RuleSet,
    title: &str,
    now: Timestamp,
) -> Result<(RuleSet, FunctionId), CoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::Validation(
            "Function title is required".to_string(),
        ));
    }
    let lowered = title.to_lowercase();
    if rule_set
        .functions
        .iter()
        .any(|f| f.title.trim().to_lowercase() == lowered)
    {
        return Err(CoreError::Validation(
            "A function with this name already exists.".to_string(),
        ));
    }

    let mut millis = now.timestamp_millis();
    let id = loop {
        let candidate = format!("{FUNCTION_ID_PREFIX}{millis}");
        if rule_set.function(&candidate).is_none() {
            break candidate;
        }
        millis += 1;
    };

    let mut next = rule_set.clone();
    next.functions.push(ValidationFunction::new(id.clone(), title));
    Ok((next, id))
}

/// Enable or disable a function.
pub fn set_function_enabled(
    rule_set: &RuleSet,
    function_id: &str,
    enabled: bool,
) -> Result<RuleSet, CoreError> {
    let mut next = rule_set.clone();
    function_mut(&mut next, function_id)?.enabled = enabled;
    Ok(next)
}

/// Remove a function and all of its rules.
pub fn delete_function(rule_set: &RuleSet, function_id: &str) -> Result<RuleSet, CoreError> {
    let mut next = rule_set.clone();
    let before = next.functions.len();
    next.functions.retain(|f| f.id != function_id);
    if next.functions.len() == before {
        return Err(function_not_found(function_id));
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Add a rule to a function, or update one in place.
///
/// For minimum-cart-value and order-limit drafts the rest of the rule set is
/// checked first: if a different function already holds that kind of rule,
/// nothing changes and [`RuleEdit::RequiresMoveDecision`] is returned.
/// Otherwise the function's existing rule of that kind is replaced, or the
/// draft is appended.
///
/// Payment drafts are keyed by their gateway set: a function rule with the
/// same gateways absorbs the draft's condition (see
/// [`add_or_update_condition`]), otherwise a new rule is appended. With
/// `editing` pointing at a payment rule, only its gateways and match type
/// are replaced.
///
/// `editing`, when given, must point at a rule of the same kind as the draft.
pub fn add_or_update_rule(
    rule_set: &RuleSet,
    function_id: &str,
    draft: RuleDraft,
    editing: Option<usize>,
) -> Result<RuleEdit, CoreError> {
    let function = rule_set
        .function(function_id)
        .ok_or_else(|| function_not_found(function_id))?;
    validate_rule_draft(&draft)?;

    if let Some(index) = editing {
        let existing = function
            .rules
            .get(index)
            .ok_or_else(|| rule_not_found(function_id, index))?;
        let same_kind = match (&draft, existing.shared()) {
            (RuleDraft::Payment(_), None) => true,
            (_, Some(current)) => draft.shared().is_some_and(|d| d.kind() == current.kind()),
            _ => false,
        };
        if !same_kind {
            return Err(CoreError::Validation(format!(
                "Rule {index} of function '{function_id}' is a different kind of rule"
            )));
        }
    }

    match draft {
        RuleDraft::Payment(payment) => {
            let mut next = rule_set.clone();
            let function = function_mut(&mut next, function_id)?;
            apply_payment_draft(function, payment, editing)?;
            Ok(RuleEdit::Committed { rule_set: next })
        }
        shared_draft => {
            let Some(shared) = shared_draft.shared() else {
                return Err(CoreError::Internal("draft is not a shared rule".to_string()));
            };
            if let Some(holder) = rule_set.shared_rule_holder(shared.kind(), function_id) {
                if let Some(current) = holder.shared_rule(shared.kind()) {
                    tracing::debug!(
                        kind = shared.kind().as_str(),
                        holder = %holder.id,
                        target = %function_id,
                        "Shared rule already held elsewhere, requesting move decision"
                    );
                    return Ok(RuleEdit::RequiresMoveDecision {
                        decision: MoveDecision {
                            kind: shared.kind(),
                            holder_function_id: holder.id.clone(),
                            holder_title: holder.title.clone(),
                            current,
                            target_function_id: function_id.to_string(),
                            proposed: shared,
                        },
                    });
                }
            }

            let mut next = rule_set.clone();
            upsert_shared(function_mut(&mut next, function_id)?, shared);
            Ok(RuleEdit::Committed { rule_set: next })
        }
    }
}

/// Move a globally unique rule from one function to another in one edit.
///
/// The rule is removed from `from_function_id` and installed with the given
/// value on `to_function_id`. Fails with [`CoreError::Conflict`] if `from`
/// no longer holds a rule of that kind.
pub fn move_shared_rule(
    rule_set: &RuleSet,
    from_function_id: &str,
    to_function_id: &str,
    rule: SharedRule,
) -> Result<RuleSet, CoreError> {
    let kind = rule.kind();
    let from = rule_set
        .function(from_function_id)
        .ok_or_else(|| function_not_found(from_function_id))?;
    if rule_set.function(to_function_id).is_none() {
        return Err(function_not_found(to_function_id));
    }
    if from.shared_rule(kind).is_none() {
        return Err(CoreError::Conflict(format!(
            "Function '{from_function_id}' no longer holds a {} rule",
            kind.as_str()
        )));
    }

    let mut next = rule_set.clone();
    if from_function_id != to_function_id {
        function_mut(&mut next, from_function_id)?
            .rules
            .retain(|r| r.shared().map(|s| s.kind()) != Some(kind));
    }
    upsert_shared(function_mut(&mut next, to_function_id)?, rule);

    tracing::info!(
        kind = kind.as_str(),
        from = %from_function_id,
        to = %to_function_id,
        "Moved shared rule"
    );
    Ok(next)
}

/// Remove the rule at `index` from a function.
pub fn remove_rule(
    rule_set: &RuleSet,
    function_id: &str,
    index: usize,
) -> Result<RuleSet, CoreError> {
    let mut next = rule_set.clone();
    let function = function_mut(&mut next, function_id)?;
    if index >= function.rules.len() {
        return Err(rule_not_found(function_id, index));
    }
    function.rules.remove(index);
    Ok(next)
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Add a condition to a payment rule, or update one.
///
/// With `editing` the condition at that index is replaced. Otherwise a
/// country or zip condition is merged (key union) into an existing condition
/// with the same mode and `include` flag, a max-cart-value condition replaces
/// the existing one, and anything else is appended.
pub fn add_or_update_condition(
    rule: &PaymentRule,
    condition: Condition,
    editing: Option<usize>,
) -> Result<PaymentRule, CoreError> {
    validate_condition(&condition)?;
    let mut next = rule.clone();

    if let Some(index) = editing {
        let slot = next.conditions.get_mut(index).ok_or_else(|| CoreError::NotFound {
            entity: "Condition",
            id: index.to_string(),
        })?;
        *slot = condition;
        return Ok(next);
    }

    let existing = next
        .conditions
        .iter()
        .position(|c| c.mode() == condition.mode() && c.include() == condition.include());

    match existing {
        Some(index) => merge_condition(&mut next.conditions[index], condition),
        None => next.conditions.push(condition),
    }

    Ok(next)
}

/// Add or update a condition on the payment rule at `rule_index`.
pub fn upsert_rule_condition(
    rule_set: &RuleSet,
    function_id: &str,
    rule_index: usize,
    condition: Condition,
    editing: Option<usize>,
) -> Result<RuleSet, CoreError> {
    let mut next = rule_set.clone();
    let rule = payment_rule_mut(function_mut(&mut next, function_id)?, function_id, rule_index)?;
    *rule = add_or_update_condition(rule, condition, editing)?;
    Ok(next)
}

/// Remove a condition from a payment rule.
///
/// Removing the last condition removes the rule itself.
pub fn remove_condition(
    rule_set: &RuleSet,
    function_id: &str,
    rule_index: usize,
    condition_index: usize,
) -> Result<RuleSet, CoreError> {
    let mut next = rule_set.clone();
    let function = function_mut(&mut next, function_id)?;
    let rule = payment_rule_mut(function, function_id, rule_index)?;
    if condition_index >= rule.conditions.len() {
        return Err(CoreError::NotFound {
            entity: "Condition",
            id: condition_index.to_string(),
        });
    }
    rule.conditions.remove(condition_index);
    if rule.conditions.is_empty() {
        function.rules.remove(rule_index);
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn apply_payment_draft(
    function: &mut ValidationFunction,
    draft: PaymentDraft,
    editing: Option<usize>,
) -> Result<(), CoreError> {
    let function_id = function.id.clone();

    if let Some(index) = editing {
        let rule = payment_rule_mut(function, &function_id, index)?;
        rule.gateways = draft.gateways;
        rule.match_type = draft.match_type;
        return Ok(());
    }

    let condition = draft.condition.ok_or_else(|| {
        CoreError::Validation("A payment rule needs a condition".to_string())
    })?;

    let same_gateways = function.rules.iter().position(|r| {
        r.as_payment()
            .is_some_and(|p| p.gateways == draft.gateways)
    });

    match same_gateways {
        Some(index) => {
            let rule = payment_rule_mut(function, &function_id, index)?;
            *rule = add_or_update_condition(rule, condition, None)?;
            rule.match_type = draft.match_type;
        }
        None => {
            validate_condition(&condition)?;
            function.rules.push(Rule::PaymentGatewayBlock(PaymentRule {
                gateways: draft.gateways,
                conditions: vec![condition],
                match_type: draft.match_type,
            }));
        }
    }
    Ok(())
}

/// Union keys of matching country/zip conditions; replace anything else.
fn merge_condition(slot: &mut Condition, incoming: Condition) {
    match (slot, incoming) {
        (Condition::Country { keys, .. }, Condition::Country { keys: added, .. })
        | (Condition::Zip { keys, .. }, Condition::Zip { keys: added, .. }) => keys.extend(added),
        (slot, incoming) => *slot = incoming,
    }
}

/// Replace the function's rule of the same kind, or append.
fn upsert_shared(function: &mut ValidationFunction, rule: SharedRule) {
    match function.shared_rule_index(rule.kind()) {
        Some(index) => function.rules[index] = rule.into(),
        None => function.rules.push(rule.into()),
    }
}

fn validate_rule_draft(draft: &RuleDraft) -> Result<(), CoreError> {
    match draft {
        RuleDraft::MinCartValue { value } if *value < Decimal::ZERO => Err(CoreError::Validation(
            "Minimum cart value must not be negative".to_string(),
        )),
        RuleDraft::OrderLimit { value } if *value < 0 => Err(CoreError::Validation(
            "Order limit must not be negative".to_string(),
        )),
        RuleDraft::Payment(p) if p.gateways.iter().all(|g| g.trim().is_empty()) => Err(
            CoreError::Validation("Select at least one payment gateway".to_string()),
        ),
        _ => Ok(()),
    }
}

fn validate_condition(condition: &Condition) -> Result<(), CoreError> {
    match condition {
        Condition::Country { keys, .. } | Condition::Zip { keys, .. } if keys.is_empty() => Err(
            CoreError::Validation("A condition needs at least one key".to_string()),
        ),
        Condition::MaxCartValue { value } if *value < Decimal::ZERO => Err(
            CoreError::Validation("Maximum cart value must not be negative".to_string()),
        ),
        _ => Ok(()),
    }
}

fn function_mut<'a>(
    rule_set: &'a mut RuleSet,
    function_id: &str,
) -> Result<&'a mut ValidationFunction, CoreError> {
    rule_set
        .function_mut(function_id)
        .ok_or_else(|| function_not_found(function_id))
}

fn payment_rule_mut<'a>(
    function: &'a mut ValidationFunction,
    function_id: &str,
    index: usize,
) -> Result<&'a mut PaymentRule, CoreError> {
    match function.rules.get_mut(index) {
        Some(Rule::PaymentGatewayBlock(rule)) => Ok(rule),
        Some(_) => Err(CoreError::Validation(format!(
            "Rule {index} of function '{function_id}' is not a payment rule"
        ))),
        None => Err(rule_not_found(function_id, index)),
    }
}

fn function_not_found(function_id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "ValidationFunction",
        id: function_id.to_string(),
    }
}

fn rule_not_found(function_id: &str, index: usize) -> CoreError {
    CoreError::NotFound {
        entity: "Rule",
        id: format!("{function_id}[{index}]"),
    }
}
