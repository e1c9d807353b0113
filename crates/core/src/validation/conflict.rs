//! Move decisions for globally unique rules.
//!
//! Adding a minimum-cart-value or order-limit rule while another function
//! already holds one never silently duplicates or discards it. The editor
//! returns a [`MoveDecision`] instead, and the caller resolves it with a
//! [`MoveResolution`].

use serde::{Deserialize, Serialize};

use super::editor::move_shared_rule;
use super::rules::{RuleSet, SharedRule, SharedRuleKind};
use crate::error::CoreError;
use crate::types::FunctionId;

/// A globally unique rule is already held by another function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveDecision {
    pub kind: SharedRuleKind,
    /// Function currently holding the rule.
    pub holder_function_id: FunctionId,
    pub holder_title: String,
    /// The holder's rule as it is now.
    pub current: SharedRule,
    /// Function the merchant is editing.
    pub target_function_id: FunctionId,
    /// The rule the merchant asked for.
    pub proposed: SharedRule,
}

impl MoveDecision {
    /// Human-readable prompt for the admin UI.
    pub fn prompt(&self) -> String {
        let what = match self.kind {
            SharedRuleKind::MinCartValue => "A minimum cart value condition",
            SharedRuleKind::OrderLimit => "An order limit condition",
        };
        format!(
            "{what} of {} already exists in function \"{}\". \
             Would you like to move it to this function or keep it where it is?",
            self.current.value_text(),
            self.holder_title
        )
    }
}

/// How the merchant resolved a [`MoveDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveResolution {
    /// Leave the holder's rule in place and drop the proposal.
    KeepExisting,
    /// Remove the rule from the holder and install the proposal on the target.
    MoveHere,
}

/// Outcome of an editor operation that may need a move decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleEdit {
    /// The edit was applied; persist `rule_set` as one document replace.
    Committed { rule_set: RuleSet },
    /// Nothing was changed; the caller must resolve the decision first.
    RequiresMoveDecision { decision: MoveDecision },
}

/// Apply the merchant's resolution to the rule set.
///
/// `KeepExisting` returns the rule set unchanged. `MoveHere` performs the
/// move as a single edit; it fails with [`CoreError::Conflict`] if the holder
/// no longer holds the rule (the decision is stale).
pub fn resolve_move_decision(
    rule_set: &RuleSet,
    decision: &MoveDecision,
    resolution: MoveResolution,
) -> Result<RuleSet, CoreError> {
    match resolution {
        MoveResolution::KeepExisting => Ok(rule_set.clone()),
        MoveResolution::MoveHere => move_shared_rule(
            rule_set,
            &decision.holder_function_id,
            &decision.target_function_id,
            decision.proposed,
        ),
    }
}
