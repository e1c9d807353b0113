//! Route definitions for checkout-time evaluation.

use axum::routing::post;
use axum::Router;

use crate::handlers::checkout;
use crate::state::AppState;

/// Routes mounted at `/shops/{shop}`.
///
/// ```text
/// POST   /cart-validation        -> validate_cart
/// POST   /payment-customization  -> customize_payment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart-validation", post(checkout::validate_cart))
        .route("/payment-customization", post(checkout::customize_payment))
}
