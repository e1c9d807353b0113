//! Handlers for checkout-time evaluation.
//!
//! Request bodies follow the input shape the checkout runtime hands to a
//! cart validation or payment customization function. The rule set comes
//! from the shop's `validationFunctions` metafield when the runtime inlines
//! it, and from the store otherwise. Both endpoints fail open: an unreadable
//! rule set evaluates as empty.

use axum::extract::{Path, State};
use axum::Json;
use cartguard_core::validation::cart::{
    evaluate_cart, BuyerJourneyStep, CartSnapshot, CartValidationResult,
};
use cartguard_core::validation::payment::{
    evaluate_payment, PaymentContext, PaymentCustomizationResult, PaymentMethod,
};
use cartguard_core::validation::rules::RuleSet;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ── Runtime input shapes ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyInput {
    pub amount: Decimal,
    #[serde(default)]
    pub currency_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCostInput {
    #[serde(default)]
    pub subtotal_amount: Option<MoneyInput>,
}

#[derive(Debug, Deserialize)]
pub struct CartLineInput {
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryAddressInput {
    #[serde(default)]
    pub zip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryGroupInput {
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddressInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartInput {
    #[serde(default)]
    pub cost: CartCostInput,
    #[serde(default)]
    pub lines: Vec<CartLineInput>,
    #[serde(default)]
    pub delivery_groups: Vec<DeliveryGroupInput>,
}

impl CartInput {
    fn subtotal(&self) -> Option<&MoneyInput> {
        self.cost.subtotal_amount.as_ref()
    }

    /// Sum of line quantities, saturating instead of overflowing.
    fn total_quantity(&self) -> i64 {
        self.lines
            .iter()
            .fold(0_i64, |total, line| total.saturating_add(line.quantity))
    }

    /// Zip of the first delivery group's address.
    fn postal_code(&self) -> Option<String> {
        self.delivery_groups
            .first()
            .and_then(|g| g.delivery_address.as_ref())
            .and_then(|a| a.zip.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BuyerJourneyInput {
    #[serde(default)]
    pub step: Option<BuyerJourneyStep>,
}

#[derive(Debug, Deserialize)]
pub struct MetafieldInput {
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopInput {
    #[serde(default)]
    pub validation_functions: Option<MetafieldInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryInput {
    #[serde(default)]
    pub iso_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocalizationInput {
    #[serde(default)]
    pub country: Option<CountryInput>,
}

/// Input of a cart validation run.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartValidationInput {
    #[serde(default)]
    pub cart: CartInput,
    #[serde(default)]
    pub presentment_currency_rate: Option<Decimal>,
    #[serde(default)]
    pub buyer_journey: Option<BuyerJourneyInput>,
    #[serde(default)]
    pub shop: Option<ShopInput>,
}

/// Input of a payment customization run.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCustomizationInput {
    #[serde(default)]
    pub cart: CartInput,
    #[serde(default)]
    pub localization: Option<LocalizationInput>,
    #[serde(default)]
    pub presentment_currency_rate: Option<Decimal>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub shop: Option<ShopInput>,
}

// ── Rule set resolution ──────────────────────────────────────────────

/// Rule set to evaluate: the inlined metafield if present, else the store.
async fn rule_set_for(state: &AppState, shop: &str, inline: Option<&ShopInput>) -> RuleSet {
    if let Some(metafield) = inline.and_then(|s| s.validation_functions.as_ref()) {
        return RuleSet::from_json_lenient(&metafield.value);
    }

    match state.store.load(shop).await {
        Ok(stored) => stored.rule_set(),
        Err(e) => {
            tracing::error!(shop, error = %e, "Failed to load rule set, evaluating none");
            RuleSet::default()
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

/// POST /api/v1/shops/{shop}/cart-validation
///
/// Returns `{ "data": { "errors": [...] } }`; an empty list allows checkout.
pub async fn validate_cart(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    Json(input): Json<CartValidationInput>,
) -> AppResult<Json<DataResponse<CartValidationResult>>> {
    let Some(subtotal) = input.cart.subtotal() else {
        tracing::debug!(shop, "Cart has no subtotal, nothing to validate");
        return Ok(Json(DataResponse {
            data: CartValidationResult::default(),
        }));
    };

    let snapshot = CartSnapshot {
        subtotal: subtotal.amount,
        currency_code: subtotal.currency_code.clone(),
        presentment_rate: input.presentment_currency_rate,
        total_quantity: input.cart.total_quantity(),
        buyer_journey_step: input.buyer_journey.as_ref().and_then(|j| j.step),
    };

    let rule_set = rule_set_for(&state, &shop, input.shop.as_ref()).await;
    let result = evaluate_cart(&rule_set, &snapshot);

    tracing::debug!(shop, errors = result.errors.len(), "Cart validated");
    Ok(Json(DataResponse { data: result }))
}

/// POST /api/v1/shops/{shop}/payment-customization
///
/// Returns `{ "data": { "operations": [{ "hide": { "paymentMethodId" } }] } }`.
pub async fn customize_payment(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    Json(input): Json<PaymentCustomizationInput>,
) -> AppResult<Json<DataResponse<PaymentCustomizationResult>>> {
    let ctx = PaymentContext {
        country_code: input
            .localization
            .as_ref()
            .and_then(|l| l.country.as_ref())
            .and_then(|c| c.iso_code.clone()),
        postal_code: input.cart.postal_code(),
        cart_total: input.cart.subtotal().map(|m| m.amount),
        presentment_rate: input.presentment_currency_rate,
        payment_methods: input.payment_methods,
    };

    let rule_set = rule_set_for(&state, &shop, input.shop.as_ref()).await;
    let result = evaluate_payment(&rule_set, &ctx);

    tracing::debug!(shop, hidden = result.operations.len(), "Payment methods customized");
    Ok(Json(DataResponse { data: result }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_quantity_sums_lines() {
        let cart: CartInput =
            serde_json::from_value(json!({ "lines": [{ "quantity": 2 }, { "quantity": 3 }] }))
                .unwrap();
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn total_quantity_saturates() {
        let cart: CartInput = serde_json::from_value(json!({
            "lines": [{ "quantity": i64::MAX }, { "quantity": 5 }]
        }))
        .unwrap();
        assert_eq!(cart.total_quantity(), i64::MAX);
    }
}
