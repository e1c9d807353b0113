pub mod checkout;
pub mod health;
pub mod rule_sets;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /shops/{shop}/rule-set                                     get, replace
/// /shops/{shop}/functions                                    create
/// /shops/{shop}/functions/{id}                               get, delete
/// /shops/{shop}/functions/{id}/enabled                       set (PUT)
/// /shops/{shop}/functions/{id}/rules                         add or update (POST)
/// /shops/{shop}/functions/{id}/rules/{index}                 remove (DELETE)
/// /shops/{shop}/functions/{id}/rules/{index}/conditions      add or update (POST)
/// /shops/{shop}/functions/{id}/rules/{index}/conditions/{c}  remove (DELETE)
/// /shops/{shop}/moves                                        resolve move decision (POST)
///
/// /shops/{shop}/cart-validation                              evaluate (POST)
/// /shops/{shop}/payment-customization                        evaluate (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest(
        "/shops/{shop}",
        rule_sets::router().merge(checkout::router()),
    )
}
