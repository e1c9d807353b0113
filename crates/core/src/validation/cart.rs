//! Cart validation evaluator: pure logic, no I/O.
//!
//! Decides whether checkout should be blocked for a cart. Every applicable
//! rule of every enabled function is checked; violations accumulate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money;
use super::rules::{Rule, RuleSet};

/// Step of the buyer journey the runtime is validating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuyerJourneyStep {
    CartInteraction,
    CheckoutInteraction,
    CheckoutCompletion,
    #[serde(other)]
    Unknown,
}

impl BuyerJourneyStep {
    /// Rules only block checkout steps, never cart interactions.
    pub fn is_checkout(&self) -> bool {
        matches!(self, Self::CheckoutInteraction | Self::CheckoutCompletion)
    }
}

/// Cart state supplied by the checkout runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub subtotal: Decimal,
    pub currency_code: String,
    /// Multiplier from shop currency into presentment currency.
    #[serde(default)]
    pub presentment_rate: Option<Decimal>,
    pub total_quantity: i64,
    #[serde(default)]
    pub buyer_journey_step: Option<BuyerJourneyStep>,
}

/// Where a validation error is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorTarget {
    Cart,
}

/// A single blocking error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartValidationError {
    pub message: String,
    pub target: ErrorTarget,
}

/// Result of one cart validation. An empty list allows checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartValidationResult {
    pub errors: Vec<CartValidationError>,
}

impl CartValidationResult {
    pub fn allows_checkout(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Evaluate every enabled function's rules against a cart.
pub fn evaluate_cart(rule_set: &RuleSet, cart: &CartSnapshot) -> CartValidationResult {
    if let Some(step) = cart.buyer_journey_step {
        if !step.is_checkout() {
            return CartValidationResult::default();
        }
    }

    let rate = money::effective_rate(cart.presentment_rate);
    let mut errors = Vec::new();

    for function in rule_set.enabled_functions() {
        for rule in &function.rules {
            if let Some(error) = evaluate_rule(rule, cart, rate) {
                tracing::debug!(function_id = %function.id, message = %error.message, "Cart rule violated");
                errors.push(error);
            }
        }
    }

    CartValidationResult { errors }
}

fn evaluate_rule(rule: &Rule, cart: &CartSnapshot, rate: Decimal) -> Option<CartValidationError> {
    match rule {
        Rule::MinCartValue { value } => evaluate_min_cart_value(*value, cart, rate),
        Rule::OrderLimit { value } => evaluate_order_limit(*value, cart),
        Rule::PaymentGatewayBlock(_) => None,
    }
}

fn evaluate_min_cart_value(
    minimum: Decimal,
    cart: &CartSnapshot,
    rate: Decimal,
) -> Option<CartValidationError> {
    // An unconvertible minimum never blocks checkout.
    let converted = money::to_presentment(minimum, rate)?.trunc();
    if cart.subtotal < converted {
        Some(CartValidationError {
            message: format!(
                "Minimum cart value must be {converted} {} to proceed.",
                cart.currency_code
            ),
            target: ErrorTarget::Cart,
        })
    } else {
        None
    }
}

fn evaluate_order_limit(limit: i64, cart: &CartSnapshot) -> Option<CartValidationError> {
    // A limit of zero (or less) means "no limit".
    if limit > 0 && cart.total_quantity > limit {
        Some(CartValidationError {
            message: format!("You can only order up to {limit} items per order."),
            target: ErrorTarget::Cart,
        })
    } else {
        None
    }
}
