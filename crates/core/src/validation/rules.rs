//! Rule-set model and its JSON codec.
//!
//! A shop's rule set is a single JSON array of validation functions. Each
//! function holds an ordered list of rules; rules and payment conditions are
//! closed sum types discriminated by `type` and `mode` respectively.
//!
//! Two decoders are provided. The lenient one is used by the evaluators and
//! never fails: a configuration defect must not block a shopper. The strict
//! one is used for admin writes and reports every defect.

use std::collections::{BTreeSet, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::money::{self, NumberOrString};
use crate::error::CoreError;
use crate::types::FunctionId;

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// The whole rule set of one shop: an ordered list of validation functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    pub functions: Vec<ValidationFunction>,
}

/// A named, independently enabled group of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFunction {
    #[serde(default)]
    pub id: FunctionId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl ValidationFunction {
    /// A new, disabled function with no rules.
    pub fn new(id: impl Into<FunctionId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            enabled: false,
            rules: Vec::new(),
        }
    }

    /// The function's rule of the given globally unique kind, if any.
    pub fn shared_rule(&self, kind: SharedRuleKind) -> Option<SharedRule> {
        self.rules.iter().find_map(|r| match r.shared() {
            Some(shared) if shared.kind() == kind => Some(shared),
            _ => None,
        })
    }

    /// Index of the function's rule of the given globally unique kind.
    pub fn shared_rule_index(&self, kind: SharedRuleKind) -> Option<usize> {
        self.rules
            .iter()
            .position(|r| r.shared().is_some_and(|s| s.kind() == kind))
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One constraint within a validation function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Rule {
    /// Block checkout while the cart subtotal is below `value`.
    #[serde(rename = "minval")]
    MinCartValue {
        #[serde(with = "money::decimal_text")]
        value: Decimal,
    },
    /// Block checkout while the cart holds more than `value` items.
    #[serde(rename = "orderlimit")]
    OrderLimit {
        #[serde(with = "money::integer_text")]
        value: i64,
    },
    /// Hide payment gateways when the rule's conditions hold.
    #[serde(rename = "payment")]
    PaymentGatewayBlock(PaymentRule),
}

impl Rule {
    /// The rule as a globally unique rule, or `None` for payment rules.
    pub fn shared(&self) -> Option<SharedRule> {
        match self {
            Rule::MinCartValue { value } => Some(SharedRule::MinCartValue { value: *value }),
            Rule::OrderLimit { value } => Some(SharedRule::OrderLimit { value: *value }),
            Rule::PaymentGatewayBlock(_) => None,
        }
    }

    pub fn as_payment(&self) -> Option<&PaymentRule> {
        match self {
            Rule::PaymentGatewayBlock(rule) => Some(rule),
            _ => None,
        }
    }
}

/// How the conditions of a payment rule are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    All,
    Any,
}

/// A payment-gateway block: hide `gateways` when `conditions` match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRule {
    #[serde(default)]
    pub gateways: BTreeSet<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "conditionMatchType", default)]
    pub match_type: MatchType,
}

/// Rule kinds of which at most one instance may exist across a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedRuleKind {
    MinCartValue,
    OrderLimit,
}

impl SharedRuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinCartValue => "min_cart_value",
            Self::OrderLimit => "order_limit",
        }
    }
}

/// A globally unique rule together with its value.
///
/// Serialized exactly like the matching [`Rule`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SharedRule {
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
}

impl SharedRule {
    pub fn kind(&self) -> SharedRuleKind {
        match self {
            Self::MinCartValue { .. } => SharedRuleKind::MinCartValue,
            Self::OrderLimit { .. } => SharedRuleKind::OrderLimit,
        }
    }

    /// The value as display text (`"50"`, `"3"`).
    pub fn value_text(&self) -> String {
        match self {
            Self::MinCartValue { value } => value.normalize().to_string(),
            Self::OrderLimit { value } => value.to_string(),
        }
    }
}

impl From<SharedRule> for Rule {
    fn from(shared: SharedRule) -> Self {
        match shared {
            SharedRule::MinCartValue { value } => Rule::MinCartValue { value },
            SharedRule::OrderLimit { value } => Rule::OrderLimit { value },
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// A sub-predicate of a payment rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionDoc", into = "ConditionDoc")]
pub enum Condition {
    /// Buyer country is (or, with `include = false`, is not) one of `keys`.
    Country { keys: BTreeSet<String>, include: bool },
    /// Delivery postal code matches (or does not match) one of `keys`.
    /// A key ending in `*` matches by prefix.
    Zip { keys: BTreeSet<String>, include: bool },
    /// Cart total exceeds `value` (converted to presentment currency).
    MaxCartValue { value: Decimal },
}

/// Condition discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    Country,
    Zip,
    MaxCartValue,
}

impl Condition {
    pub fn mode(&self) -> ConditionMode {
        match self {
            Self::Country { .. } => ConditionMode::Country,
            Self::Zip { .. } => ConditionMode::Zip,
            Self::MaxCartValue { .. } => ConditionMode::MaxCartValue,
        }
    }

    /// The `include` flag, or `None` for modes it does not apply to.
    pub fn include(&self) -> Option<bool> {
        match self {
            Self::Country { include, .. } | Self::Zip { include, .. } => Some(*include),
            Self::MaxCartValue { .. } => None,
        }
    }
}

/// On-the-wire form of a condition: `{ mode, keys, include }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConditionDoc {
    mode: ConditionMode,
    #[serde(default)]
    keys: Vec<NumberOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    include: Option<bool>,
}

impl TryFrom<ConditionDoc> for Condition {
    type Error = String;

    fn try_from(doc: ConditionDoc) -> Result<Self, Self::Error> {
        let include = doc.include.unwrap_or(false);
        match doc.mode {
            ConditionMode::Country => Ok(Condition::Country {
                keys: text_keys(&doc.keys),
                include,
            }),
            ConditionMode::Zip => Ok(Condition::Zip {
                keys: text_keys(&doc.keys),
                include,
            }),
            ConditionMode::MaxCartValue => {
                let first = doc
                    .keys
                    .first()
                    .ok_or_else(|| "max_cart_value condition has no value".to_string())?;
                let value = first.to_decimal().ok_or_else(|| {
                    format!("max_cart_value condition has invalid value '{}'", first.as_text())
                })?;
                Ok(Condition::MaxCartValue { value })
            }
        }
    }
}

impl From<Condition> for ConditionDoc {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Country { keys, include } => ConditionDoc {
                mode: ConditionMode::Country,
                keys: keys.into_iter().map(NumberOrString::String).collect(),
                include: Some(include),
            },
            Condition::Zip { keys, include } => ConditionDoc {
                mode: ConditionMode::Zip,
                keys: keys.into_iter().map(NumberOrString::String).collect(),
                include: Some(include),
            },
            Condition::MaxCartValue { value } => ConditionDoc {
                mode: ConditionMode::MaxCartValue,
                keys: vec![NumberOrString::String(value.normalize().to_string())],
                include: None,
            },
        }
    }
}

/// Trim keys and drop blanks.
fn text_keys(keys: &[NumberOrString]) -> BTreeSet<String> {
    keys.iter()
        .map(NumberOrString::as_text)
        .filter(|k| !k.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

impl RuleSet {
    /// Decode a stored document, never failing.
    ///
    /// Empty input reads as an empty rule set. A document that is not a JSON
    /// array yields an empty rule set. Missing function fields take their
    /// defaults, and rules or conditions that cannot be decoded are dropped.
    pub fn from_json_lenient(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value_lenient(&value),
            Err(e) => {
                tracing::warn!(error = %e, "Rule set document is not valid JSON, treating as empty");
                Self::default()
            }
        }
    }

    /// Lenient decoding of an already-parsed document. See [`Self::from_json_lenient`].
    pub fn from_value_lenient(value: &Value) -> Self {
        let items = match value {
            Value::Null => return Self::default(),
            Value::Array(items) => items,
            other => {
                tracing::warn!(
                    kind = json_kind(other),
                    "Rule set document is not an array, treating as empty"
                );
                return Self::default();
            }
        };

        let functions = items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => Some(decode_function_lenient(item)),
                other => {
                    tracing::warn!(kind = json_kind(other), "Skipping non-object function entry");
                    None
                }
            })
            .collect();

        Self { functions }
    }

    /// Decode a document submitted by an admin, reporting any defect.
    pub fn from_json_strict(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw)
            .map_err(|e| CoreError::Validation(format!("Invalid rule set document: {e}")))
    }

    /// Strict decoding of an already-parsed document.
    pub fn from_value_strict(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::Validation(format!("Invalid rule set document: {e}")))
    }

    /// Encode the rule set as a JSON value.
    pub fn to_value(&self) -> Result<Value, CoreError> {
        serde_json::to_value(self)
            .map_err(|e| CoreError::Internal(format!("Failed to encode rule set: {e}")))
    }

    /// Functions whose rules take part in evaluation.
    pub fn enabled_functions(&self) -> impl Iterator<Item = &ValidationFunction> {
        self.functions.iter().filter(|f| f.enabled)
    }

    pub fn function(&self, id: &str) -> Option<&ValidationFunction> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn function_mut(&mut self, id: &str) -> Option<&mut ValidationFunction> {
        self.functions.iter_mut().find(|f| f.id == id)
    }

    /// The first function other than `except` holding a rule of `kind`.
    pub fn shared_rule_holder(
        &self,
        kind: SharedRuleKind,
        except: &str,
    ) -> Option<&ValidationFunction> {
        self.functions
            .iter()
            .find(|f| f.id != except && f.shared_rule(kind).is_some())
    }

    /// Check the structural invariants of a complete rule set.
    ///
    /// - function ids are non-empty and unique
    /// - at most one minimum-cart-value and one order-limit rule overall
    /// - every payment rule has at least one condition
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let mut ids = HashSet::new();
        for function in &self.functions {
            if function.id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Function id must not be empty".to_string(),
                ));
            }
            if !ids.insert(function.id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate function id '{}'",
                    function.id
                )));
            }
        }

        for kind in [SharedRuleKind::MinCartValue, SharedRuleKind::OrderLimit] {
            let holders: usize = self
                .functions
                .iter()
                .map(|f| f.rules.iter().filter(|r| r.shared().is_some_and(|s| s.kind() == kind)).count())
                .sum();
            if holders > 1 {
                return Err(CoreError::Validation(format!(
                    "At most one {} rule may exist across all functions, found {holders}",
                    kind.as_str()
                )));
            }
        }

        for function in &self.functions {
            for (index, rule) in function.rules.iter().enumerate() {
                if let Some(payment) = rule.as_payment() {
                    if payment.conditions.is_empty() {
                        return Err(CoreError::Validation(format!(
                            "Payment rule {index} of function '{}' has no conditions",
                            function.id
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn decode_function_lenient(item: &Value) -> ValidationFunction {
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let title = item
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let enabled = item.get("enabled").and_then(Value::as_bool).unwrap_or(false);
    let rules = item
        .get("rules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| decode_rule_lenient(&id, rule))
                .collect()
        })
        .unwrap_or_default();

    ValidationFunction {
        id,
        title,
        enabled,
        rules,
    }
}

fn decode_rule_lenient(function_id: &str, value: &Value) -> Option<Rule> {
    if value.get("type").and_then(Value::as_str) == Some("payment") {
        return decode_payment_lenient(function_id, value).map(Rule::PaymentGatewayBlock);
    }
    match serde_json::from_value::<Rule>(value.clone()) {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::warn!(function_id, error = %e, "Dropping undecodable rule");
            None
        }
    }
}

fn decode_payment_lenient(function_id: &str, value: &Value) -> Option<PaymentRule> {
    let gateways: BTreeSet<String> = value
        .get("gateways")
        .and_then(Value::as_array)
        .map(|gws| {
            gws.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let conditions: Vec<Condition> = value
        .get("conditions")
        .and_then(Value::as_array)
        .map(|conds| {
            conds
                .iter()
                .filter_map(|c| match serde_json::from_value::<Condition>(c.clone()) {
                    Ok(condition) => Some(condition),
                    Err(e) => {
                        tracing::warn!(function_id, error = %e, "Dropping undecodable condition");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if conditions.is_empty() {
        tracing::warn!(function_id, "Dropping payment rule without usable conditions");
        return None;
    }

    // Anything other than an explicit "any" combines with AND.
    let match_type = match value.get("conditionMatchType").and_then(Value::as_str) {
        Some("any") => MatchType::Any,
        _ => MatchType::All,
    };

    Some(PaymentRule {
        gateways,
        conditions,
        match_type,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn sample_document() -> Value {
        json!([
            {
                "id": "fn_1",
                "title": "Minimums",
                "enabled": true,
                "rules": [
                    {"type": "minval", "value": "50"},
                    {"type": "orderlimit", "value": 3}
                ]
            },
            {
                "id": "fn_2",
                "title": "COD for US",
                "enabled": false,
                "rules": [{
                    "type": "payment",
                    "gateways": ["Cash on Delivery (COD)"],
                    "conditionMatchType": "any",
                    "conditions": [
                        {"mode": "country", "keys": ["US", "CA"], "include": true},
                        {"mode": "zip", "keys": ["9*"], "include": false},
                        {"mode": "max_cart_value", "keys": ["200.50"]}
                    ]
                }]
            }
        ])
    }

    #[test]
    fn decodes_all_rule_kinds() {
        let set = RuleSet::from_value_strict(sample_document()).unwrap();
        assert_eq!(set.functions.len(), 2);
        assert_eq!(
            set.functions[0].rules,
            vec![
                Rule::MinCartValue {
                    value: Decimal::from(50)
                },
                Rule::OrderLimit { value: 3 },
            ]
        );
        let payment = set.functions[1].rules[0].as_payment().unwrap();
        assert_eq!(payment.match_type, MatchType::Any);
        assert!(payment.gateways.contains("Cash on Delivery (COD)"));
        assert_eq!(payment.conditions.len(), 3);
        assert_eq!(
            payment.conditions[2],
            Condition::MaxCartValue {
                value: Decimal::new(20050, 2)
            }
        );
    }

    #[test]
    fn round_trip_is_stable() {
        let set = RuleSet::from_value_strict(sample_document()).unwrap();
        let encoded = set.to_value().unwrap();
        let reparsed = RuleSet::from_value_strict(encoded.clone()).unwrap();
        assert_eq!(set, reparsed);
        assert_eq!(encoded, reparsed.to_value().unwrap());
    }

    #[test]
    fn values_are_written_as_strings() {
        let set = RuleSet::from_value_strict(sample_document()).unwrap();
        let encoded = set.to_value().unwrap();
        assert_eq!(encoded[0]["rules"][1], json!({"type": "orderlimit", "value": "3"}));
        assert_eq!(
            encoded[1]["rules"][0]["conditions"][2],
            json!({"mode": "max_cart_value", "keys": ["200.5"]})
        );
    }

    #[test]
    fn lenient_invalid_json_is_empty() {
        assert!(RuleSet::from_json_lenient("{not json").functions.is_empty());
        assert!(RuleSet::from_json_lenient("").functions.is_empty());
        assert!(RuleSet::from_json_lenient("null").functions.is_empty());
        assert!(RuleSet::from_json_lenient("{\"id\": \"fn_1\"}").functions.is_empty());
    }

    #[test]
    fn lenient_missing_fields_take_defaults() {
        let set = RuleSet::from_json_lenient(r#"[{"id": "fn_1"}]"#);
        assert_eq!(set.functions.len(), 1);
        let f = &set.functions[0];
        assert_eq!(f.title, "");
        assert!(!f.enabled);
        assert!(f.rules.is_empty());
    }

    #[test]
    fn lenient_drops_unknown_rules_only() {
        let set = RuleSet::from_value_lenient(&json!([{
            "id": "fn_1",
            "enabled": true,
            "extra": "ignored",
            "rules": [
                {"type": "minvalue", "value": "10"},
                {"type": "minval", "value": "not a number"},
                {"type": "orderlimit", "value": "4"},
                {"type": "payment", "gateways": ["PayPal"], "conditions": [
                    {"mode": "continent", "keys": ["EU"]},
                    {"mode": "country", "keys": ["DE"], "include": true}
                ]},
                {"type": "payment", "gateways": ["PayPal"], "conditions": []}
            ]
        }]));
        let rules = &set.functions[0].rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], Rule::OrderLimit { value: 4 });
        let payment = rules[1].as_payment().unwrap();
        assert_eq!(payment.conditions.len(), 1);
        assert_eq!(payment.match_type, MatchType::All);
    }

    #[test]
    fn strict_rejects_unknown_rule_type() {
        let result = RuleSet::from_json_strict(r#"[{"id": "fn_1", "rules": [{"type": "minvalue", "value": "1"}]}]"#);
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn missing_include_reads_as_exclude() {
        let c: Condition = serde_json::from_value(json!({"mode": "country", "keys": ["US"]})).unwrap();
        assert_eq!(c.include(), Some(false));
    }

    #[test]
    fn invariants_reject_duplicate_min_cart_value() {
        let set = RuleSet::from_value_strict(json!([
            {"id": "fn_1", "rules": [{"type": "minval", "value": "10"}]},
            {"id": "fn_2", "rules": [{"type": "minval", "value": "20"}]}
        ]))
        .unwrap();
        assert_matches!(set.check_invariants(), Err(CoreError::Validation(msg)) if msg.contains("min_cart_value"));
    }

    #[test]
    fn invariants_reject_duplicate_ids_and_empty_payment_rules() {
        let dup = RuleSet::from_value_strict(json!([{"id": "fn_1"}, {"id": "fn_1"}])).unwrap();
        assert_matches!(dup.check_invariants(), Err(CoreError::Validation(_)));

        let empty = RuleSet::from_value_strict(json!([{
            "id": "fn_1",
            "rules": [{"type": "payment", "gateways": ["PayPal"], "conditions": []}]
        }]))
        .unwrap();
        assert_matches!(empty.check_invariants(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn invariants_accept_one_of_each_shared_rule() {
        let set = RuleSet::from_value_strict(sample_document()).unwrap();
        assert!(set.check_invariants().is_ok());
    }

    #[test]
    fn shared_rule_holder_skips_the_editing_function() {
        let set = RuleSet::from_value_strict(sample_document()).unwrap();
        assert!(set
            .shared_rule_holder(SharedRuleKind::MinCartValue, "fn_1")
            .is_none());
        assert_eq!(
            set.shared_rule_holder(SharedRuleKind::MinCartValue, "fn_2")
                .map(|f| f.id.as_str()),
            Some("fn_1")
        );
    }
}
