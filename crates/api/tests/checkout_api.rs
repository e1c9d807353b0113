//! Integration tests for the checkout evaluation endpoints.

mod common;

use axum::http::StatusCode;
use axum::Router;
use common::{body_json, post_json, put_json};
use serde_json::{json, Value};

const SHOP: &str = "/api/v1/shops/demo.myshopify.com";

async fn store_rule_set(app: &Router, document: Value) {
    let response = put_json(app.clone(), &format!("{SHOP}/rule-set"), document).await;
    assert_eq!(response.status(), StatusCode::OK);
}

fn cart_input(subtotal: &str, quantities: &[i64], step: &str) -> Value {
    json!({
        "cart": {
            "cost": { "subtotalAmount": { "amount": subtotal, "currencyCode": "USD" } },
            "lines": quantities.iter().map(|q| json!({ "quantity": q })).collect::<Vec<_>>()
        },
        "presentmentCurrencyRate": "1.0",
        "buyerJourney": { "step": step }
    })
}

fn payment_input(country: &str, zip: Option<&str>, subtotal: &str) -> Value {
    json!({
        "cart": {
            "cost": { "subtotalAmount": { "amount": subtotal, "currencyCode": "USD" } },
            "deliveryGroups": [{ "deliveryAddress": { "zip": zip } }]
        },
        "localization": { "country": { "isoCode": country } },
        "paymentMethods": [
            { "id": "gid://shopify/PaymentCustomizationPaymentMethod/1", "name": "COD" },
            { "id": "gid://shopify/PaymentCustomizationPaymentMethod/2", "name": "PayPal" }
        ]
    })
}

// ---------------------------------------------------------------------------
// Cart validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cart_below_minimum_is_blocked() {
    let app = common::build_test_app();
    store_rule_set(
        &app,
        json!([{ "id": "f1", "title": "Min", "enabled": true,
                 "rules": [{ "type": "minval", "value": "50" }] }]),
    )
    .await;

    let response = post_json(
        app.clone(),
        &format!("{SHOP}/cart-validation"),
        cart_input("40.0", &[1], "CHECKOUT_INTERACTION"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json["data"]["errors"],
        json!([{ "message": "Minimum cart value must be 50 USD to proceed.", "target": "cart" }])
    );
}

#[tokio::test]
async fn order_limit_counts_all_lines() {
    let app = common::build_test_app();
    store_rule_set(
        &app,
        json!([{ "id": "f1", "title": "Limit", "enabled": true,
                 "rules": [{ "type": "orderlimit", "value": "3" }] }]),
    )
    .await;

    let json = body_json(
        post_json(
            app.clone(),
            &format!("{SHOP}/cart-validation"),
            cart_input("100", &[2, 2], "CHECKOUT_COMPLETION"),
        )
        .await,
    )
    .await;
    assert_eq!(
        json["data"]["errors"][0]["message"],
        "You can only order up to 3 items per order."
    );
}

#[tokio::test]
async fn cart_interaction_step_is_never_blocked() {
    let app = common::build_test_app();
    store_rule_set(
        &app,
        json!([{ "id": "f1", "title": "Min", "enabled": true,
                 "rules": [{ "type": "minval", "value": "50" }] }]),
    )
    .await;

    let json = body_json(
        post_json(
            app.clone(),
            &format!("{SHOP}/cart-validation"),
            cart_input("10", &[1], "CART_INTERACTION"),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["errors"], json!([]));
}

#[tokio::test]
async fn inline_metafield_overrides_store_and_fails_open() {
    let app = common::build_test_app();
    store_rule_set(
        &app,
        json!([{ "id": "f1", "title": "Min", "enabled": true,
                 "rules": [{ "type": "minval", "value": "50" }] }]),
    )
    .await;

    let mut input = cart_input("10", &[1], "CHECKOUT_INTERACTION");
    input["shop"] = json!({ "validationFunctions": { "value": "not json" } });

    let json = body_json(post_json(app.clone(), &format!("{SHOP}/cart-validation"), input).await).await;
    assert_eq!(json["data"]["errors"], json!([]));
}

#[tokio::test]
async fn shop_without_rules_allows_checkout() {
    let app = common::build_test_app();
    let json = body_json(
        post_json(
            app,
            &format!("{SHOP}/cart-validation"),
            cart_input("1", &[99], "CHECKOUT_COMPLETION"),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["errors"], json!([]));
}

// ---------------------------------------------------------------------------
// Payment customization
// ---------------------------------------------------------------------------

fn cod_for_us() -> Value {
    json!([{ "id": "f1", "title": "COD", "enabled": true, "rules": [{
        "type": "payment",
        "gateways": ["COD"],
        "conditions": [{ "mode": "country", "keys": ["US"], "include": true }],
        "conditionMatchType": "all"
    }]}])
}

#[tokio::test]
async fn matching_country_hides_gateway() {
    let app = common::build_test_app();
    store_rule_set(&app, cod_for_us()).await;

    let response = post_json(
        app.clone(),
        &format!("{SHOP}/payment-customization"),
        payment_input("US", Some("10001"), "25.00"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json["data"]["operations"],
        json!([{ "hide": {
            "paymentMethodId": "gid://shopify/PaymentCustomizationPaymentMethod/1"
        } }])
    );
}

#[tokio::test]
async fn other_country_hides_nothing() {
    let app = common::build_test_app();
    store_rule_set(&app, cod_for_us()).await;

    let json = body_json(
        post_json(
            app.clone(),
            &format!("{SHOP}/payment-customization"),
            payment_input("CA", None, "25.00"),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["operations"], json!([]));
}

#[tokio::test]
async fn zip_prefix_and_max_cart_value_with_any() {
    let app = common::build_test_app();
    store_rule_set(
        &app,
        json!([{ "id": "f1", "title": "PayPal", "enabled": true, "rules": [{
            "type": "payment",
            "gateways": ["PayPal"],
            "conditions": [
                { "mode": "zip", "keys": ["900*"], "include": true },
                { "mode": "max_cart_value", "keys": ["500"] }
            ],
            "conditionMatchType": "any"
        }]}]),
    )
    .await;

    let by_zip = body_json(
        post_json(
            app.clone(),
            &format!("{SHOP}/payment-customization"),
            payment_input("US", Some("90012"), "20"),
        )
        .await,
    )
    .await;
    assert_eq!(by_zip["data"]["operations"].as_array().unwrap().len(), 1);

    let by_total = body_json(
        post_json(
            app.clone(),
            &format!("{SHOP}/payment-customization"),
            payment_input("US", Some("10001"), "600"),
        )
        .await,
    )
    .await;
    assert_eq!(by_total["data"]["operations"].as_array().unwrap().len(), 1);

    let neither = body_json(
        post_json(
            app.clone(),
            &format!("{SHOP}/payment-customization"),
            payment_input("US", Some("10001"), "20"),
        )
        .await,
    )
    .await;
    assert_eq!(neither["data"]["operations"], json!([]));
}

#[tokio::test]
async fn missing_country_hides_nothing() {
    let app = common::build_test_app();
    store_rule_set(&app, cod_for_us()).await;

    let mut input = payment_input("US", None, "25");
    input["localization"] = json!({});

    let json = body_json(
        post_json(app.clone(), &format!("{SHOP}/payment-customization"), input).await,
    )
    .await;
    assert_eq!(json["data"]["operations"], json!([]));
}
