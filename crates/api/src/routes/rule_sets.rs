//! Route definitions for rule-set editing.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::{functions, rule_sets};
use crate::state::AppState;

/// Routes mounted at `/shops/{shop}`.
///
/// ```text
/// GET    /rule-set                                  -> get_rule_set
/// PUT    /rule-set                                  -> replace_rule_set
/// POST   /functions                                 -> create_function
/// GET    /functions/{id}                            -> get_function
/// DELETE /functions/{id}                            -> delete_function
/// PUT    /functions/{id}/enabled                    -> set_enabled
/// POST   /functions/{id}/rules                      -> upsert_rule
/// DELETE /functions/{id}/rules/{index}              -> remove_rule
/// POST   /functions/{id}/rules/{index}/conditions   -> upsert_condition
/// DELETE /functions/{id}/rules/{index}/conditions/{condition_index}
///                                                   -> remove_condition
/// POST   /moves                                     -> resolve_move
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/rule-set",
            get(rule_sets::get_rule_set).put(rule_sets::replace_rule_set),
        )
        .route("/functions", post(functions::create_function))
        .route(
            "/functions/{id}",
            get(functions::get_function).delete(functions::delete_function),
        )
        .route("/functions/{id}/enabled", put(functions::set_enabled))
        .route("/functions/{id}/rules", post(functions::upsert_rule))
        .route(
            "/functions/{id}/rules/{index}",
            delete(functions::remove_rule),
        )
        .route(
            "/functions/{id}/rules/{index}/conditions",
            post(functions::upsert_condition),
        )
        .route(
            "/functions/{id}/rules/{index}/conditions/{condition_index}",
            delete(functions::remove_condition),
        )
        .route("/moves", post(rule_sets::resolve_move))
}
