//! Payment customization evaluator: pure logic, no I/O.
//!
//! Decides which payment gateways are hidden for a checkout. Every payment
//! rule of every enabled function is evaluated; the gateways of all matching
//! rules are unioned into one blocked set.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money;
use super::rules::{Condition, MatchType, PaymentRule, RuleSet};

/// A payment method offered on the current checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
}

/// Checkout state supplied by the payment runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContext {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub cart_total: Option<Decimal>,
    #[serde(default)]
    pub presentment_rate: Option<Decimal>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

/// Hide one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HideOperation {
    pub payment_method_id: String,
}

/// A single customization operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentOperation {
    Hide(HideOperation),
}

/// Result of one payment customization. An empty list hides nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCustomizationResult {
    pub operations: Vec<PaymentOperation>,
}

impl PaymentCustomizationResult {
    /// The explicit "no changes" result.
    pub fn no_changes() -> Self {
        Self::default()
    }
}

/// Inputs every condition is evaluated against.
struct Facts<'a> {
    country_code: &'a str,
    postal_code: Option<&'a str>,
    cart_total: Decimal,
    rate: Decimal,
}

/// Evaluate every enabled function's payment rules against a checkout.
///
/// Without a country code or a cart total nothing is hidden.
pub fn evaluate_payment(rule_set: &RuleSet, ctx: &PaymentContext) -> PaymentCustomizationResult {
    let (Some(country_code), Some(cart_total)) = (ctx.country_code.as_deref(), ctx.cart_total)
    else {
        tracing::debug!("Country code or cart total missing, hiding no gateways");
        return PaymentCustomizationResult::no_changes();
    };
    if country_code.is_empty() {
        return PaymentCustomizationResult::no_changes();
    }

    let facts = Facts {
        country_code,
        postal_code: ctx.postal_code.as_deref().filter(|p| !p.is_empty()),
        cart_total,
        rate: money::effective_rate(ctx.presentment_rate),
    };

    let blocked = blocked_gateways(rule_set, &facts);
    if blocked.is_empty() {
        return PaymentCustomizationResult::no_changes();
    }

    let operations = ctx
        .payment_methods
        .iter()
        .filter(|method| blocked.contains(method.name.as_str()))
        .map(|method| {
            PaymentOperation::Hide(HideOperation {
                payment_method_id: method.id.clone(),
            })
        })
        .collect();

    PaymentCustomizationResult { operations }
}

fn blocked_gateways<'r>(rule_set: &'r RuleSet, facts: &Facts<'_>) -> BTreeSet<&'r str> {
    let mut blocked = BTreeSet::new();
    for function in rule_set.enabled_functions() {
        for rule in function.rules.iter().filter_map(|r| r.as_payment()) {
            if rule_matches(rule, facts) {
                tracing::debug!(
                    function_id = %function.id,
                    gateways = ?rule.gateways,
                    "Payment rule matched"
                );
                blocked.extend(rule.gateways.iter().map(String::as_str));
            }
        }
    }
    blocked
}

fn rule_matches(rule: &PaymentRule, facts: &Facts<'_>) -> bool {
    let mut results = rule.conditions.iter().map(|c| condition_matches(c, facts));
    match rule.match_type {
        MatchType::All => results.all(|r| r),
        MatchType::Any => results.any(|r| r),
    }
}

fn condition_matches(condition: &Condition, facts: &Facts<'_>) -> bool {
    match condition {
        Condition::Country { keys, include } => {
            let found = keys.contains(facts.country_code);
            if *include {
                found
            } else {
                !found
            }
        }
        Condition::Zip { keys, include } => {
            // Without a postal code the condition cannot match either way.
            let Some(postal_code) = facts.postal_code else {
                return false;
            };
            let found = keys.iter().any(|pattern| zip_matches(pattern, postal_code));
            if *include {
                found
            } else {
                !found
            }
        }
        Condition::MaxCartValue { value } => money::to_presentment(*value, facts.rate)
            .is_some_and(|limit| facts.cart_total > limit),
    }
}

/// Literal match, or prefix match for patterns ending in `*`.
pub fn zip_matches(pattern: &str, postal_code: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => postal_code.starts_with(prefix),
        None => postal_code == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn methods() -> Vec<PaymentMethod> {
        vec![
            PaymentMethod {
                id: "gid://pm/1".to_string(),
                name: "COD".to_string(),
            },
            PaymentMethod {
                id: "gid://pm/2".to_string(),
                name: "PayPal".to_string(),
            },
        ]
    }

    fn ctx(country: &str, postal: Option<&str>, total: Decimal) -> PaymentContext {
        PaymentContext {
            country_code: Some(country.to_string()),
            postal_code: postal.map(str::to_string),
            cart_total: Some(total),
            presentment_rate: None,
            payment_methods: methods(),
        }
    }

    fn one_rule(gateways: &[&str], match_type: &str, conditions: serde_json::Value) -> RuleSet {
        RuleSet::from_value_lenient(&json!([{
            "id": "f1",
            "enabled": true,
            "rules": [{
                "type": "payment",
                "gateways": gateways,
                "conditionMatchType": match_type,
                "conditions": conditions
            }]
        }]))
    }

    fn hidden_ids(result: &PaymentCustomizationResult) -> Vec<&str> {
        result
            .operations
            .iter()
            .map(|PaymentOperation::Hide(h)| h.payment_method_id.as_str())
            .collect()
    }

    #[test]
    fn country_include_hides_cod() {
        let rules = one_rule(&["COD"], "all", json!([{"mode": "country", "keys": ["US"], "include": true}]));
        let result = evaluate_payment(&rules, &ctx("US", None, Decimal::from(10)));
        assert_eq!(hidden_ids(&result), vec!["gid://pm/1"]);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"operations": [{"hide": {"paymentMethodId": "gid://pm/1"}}]})
        );
    }

    #[test]
    fn country_exclude_inverts() {
        let rules = one_rule(&["COD"], "all", json!([{"mode": "country", "keys": ["US"], "include": false}]));
        assert!(evaluate_payment(&rules, &ctx("US", None, Decimal::from(10))).operations.is_empty());
        assert_eq!(
            hidden_ids(&evaluate_payment(&rules, &ctx("DE", None, Decimal::from(10)))),
            vec!["gid://pm/1"]
        );
    }

    #[test]
    fn zip_wildcard_matching() {
        assert!(zip_matches("9*", "90210"));
        assert!(zip_matches("9*", "9"));
        assert!(!zip_matches("9*", "8000"));
        assert!(zip_matches("10115", "10115"));
        assert!(!zip_matches("10115", "101150"));
    }

    #[test]
    fn zip_condition_without_postal_code_is_false() {
        let include = one_rule(&["COD"], "all", json!([{"mode": "zip", "keys": ["9*"], "include": true}]));
        let exclude = one_rule(&["COD"], "all", json!([{"mode": "zip", "keys": ["9*"], "include": false}]));
        assert!(evaluate_payment(&include, &ctx("US", None, Decimal::ONE)).operations.is_empty());
        assert!(evaluate_payment(&exclude, &ctx("US", None, Decimal::ONE)).operations.is_empty());
        assert_eq!(
            hidden_ids(&evaluate_payment(&exclude, &ctx("US", Some("8000"), Decimal::ONE))),
            vec!["gid://pm/1"]
        );
    }

    #[test]
    fn max_cart_value_is_strictly_greater() {
        let rules = one_rule(&["COD"], "all", json!([{"mode": "max_cart_value", "keys": ["100"]}]));
        assert!(evaluate_payment(&rules, &ctx("US", None, Decimal::from(100))).operations.is_empty());
        assert_eq!(
            hidden_ids(&evaluate_payment(&rules, &ctx("US", None, Decimal::new(10001, 2)))),
            vec!["gid://pm/1"]
        );
    }

    #[test]
    fn max_cart_value_uses_presentment_rate() {
        let rules = one_rule(&["COD"], "all", json!([{"mode": "max_cart_value", "keys": ["100"]}]));
        let mut c = ctx("US", None, Decimal::from(150));
        c.presentment_rate = Some(Decimal::from(2));
        assert!(evaluate_payment(&rules, &c).operations.is_empty());
        c.cart_total = Some(Decimal::new(20001, 2));
        assert_eq!(evaluate_payment(&rules, &c).operations.len(), 1);
    }

    #[test]
    fn any_versus_all() {
        let conditions = json!([
            {"mode": "country", "keys": ["US"], "include": true},
            {"mode": "country", "keys": ["CA"], "include": true}
        ]);
        let any = one_rule(&["COD"], "any", conditions.clone());
        let all = one_rule(&["COD"], "all", conditions);
        let c = ctx("US", None, Decimal::ONE);
        assert_eq!(evaluate_payment(&any, &c).operations.len(), 1);
        assert!(evaluate_payment(&all, &c).operations.is_empty());
    }

    #[test]
    fn overlapping_rules_hide_once() {
        let rules = RuleSet::from_value_lenient(&json!([
            {"id": "f1", "enabled": true, "rules": [
                {"type": "payment", "gateways": ["PayPal"], "conditions": [{"mode": "country", "keys": ["US"], "include": true}]}
            ]},
            {"id": "f2", "enabled": true, "rules": [
                {"type": "payment", "gateways": ["PayPal", "COD"], "conditions": [{"mode": "max_cart_value", "keys": ["5"]}]}
            ]}
        ]));
        let result = evaluate_payment(&rules, &ctx("US", None, Decimal::from(10)));
        assert_eq!(hidden_ids(&result), vec!["gid://pm/1", "gid://pm/2"]);
    }

    #[test]
    fn unknown_gateways_are_ignored() {
        let rules = one_rule(&["Klarna"], "all", json!([{"mode": "country", "keys": ["US"], "include": true}]));
        assert!(evaluate_payment(&rules, &ctx("US", None, Decimal::ONE)).operations.is_empty());
    }

    #[test]
    fn missing_inputs_are_a_no_op() {
        let rules = one_rule(&["COD"], "all", json!([{"mode": "country", "keys": ["US"], "include": false}]));
        let mut c = ctx("DE", None, Decimal::ONE);
        c.cart_total = None;
        assert_eq!(evaluate_payment(&rules, &c), PaymentCustomizationResult::no_changes());
        let mut c = ctx("DE", None, Decimal::ONE);
        c.country_code = None;
        assert_eq!(evaluate_payment(&rules, &c), PaymentCustomizationResult::no_changes());
    }

    #[test]
    fn disabled_functions_do_not_hide() {
        let rules = RuleSet::from_value_lenient(&json!([{"id": "f1", "enabled": false, "rules": [
            {"type": "payment", "gateways": ["COD"], "conditions": [{"mode": "country", "keys": ["US"], "include": true}]}
        ]}]));
        assert!(evaluate_payment(&rules, &ctx("US", None, Decimal::ONE)).operations.is_empty());
    }

    #[test]
    fn overflowing_max_cart_value_never_matches() {
        let huge = json!({"mode": "max_cart_value", "keys": ["79228162514264337593543950335"]});
        let mut c = ctx("US", None, Decimal::from(100));
        c.presentment_rate = Some(Decimal::new(15, 1));

        let rules = one_rule(&["COD"], "all", json!([huge.clone()]));
        assert!(evaluate_payment(&rules, &c).operations.is_empty());

        let rules = one_rule(
            &["COD"],
            "any",
            json!([huge, {"mode": "country", "keys": ["US"], "include": true}]),
        );
        assert_eq!(hidden_ids(&evaluate_payment(&rules, &c)), vec!["gid://pm/1"]);
    }
}
