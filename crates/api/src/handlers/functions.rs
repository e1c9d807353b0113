//! Handlers for the `/shops/{shop}/functions` resource: functions, their
//! rules, and the conditions of payment rules.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cartguard_core::error::CoreError;
use cartguard_core::types::FunctionId;
use cartguard_core::validation::editor::{self, RuleDraft};
use cartguard_core::validation::rules::{Condition, RuleSet, ValidationFunction};
use serde::{Deserialize, Serialize};

use super::rule_sets::{apply_edit, commit, load_for_edit, EditResponse};
use crate::error::AppResult;
use crate::query::RevisionParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ── Request / response types ─────────────────────────────────────────

/// Request body for creating a function.
#[derive(Debug, Deserialize)]
pub struct CreateFunctionRequest {
    pub title: String,
}

/// A newly created function and the rule set it was stored in.
#[derive(Debug, Serialize)]
pub struct FunctionCreated {
    pub function_id: FunctionId,
    pub revision: i64,
    pub rule_set: RuleSet,
}

/// Request body for enabling or disabling a function.
#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

/// Request body for adding or updating a rule.
#[derive(Debug, Deserialize)]
pub struct UpsertRuleRequest {
    pub draft: RuleDraft,
    /// Index of the rule being edited; omitted when adding.
    #[serde(default)]
    pub editing_index: Option<usize>,
}

/// Request body for adding or updating a payment rule condition.
#[derive(Debug, Deserialize)]
pub struct UpsertConditionRequest {
    pub condition: Condition,
    #[serde(default)]
    pub editing_index: Option<usize>,
}

// ── Functions ────────────────────────────────────────────────────────

/// POST /api/v1/shops/{shop}/functions
///
/// Create a disabled function with no rules. Returns HTTP 201.
pub async fn create_function(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    Query(params): Query<RevisionParams>,
    Json(input): Json<CreateFunctionRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<FunctionCreated>>)> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let (next, function_id) = editor::create_function(&rule_set, &input.title, chrono::Utc::now())?;
    let stored = commit(&state, &shop, &next, revision).await?;

    tracing::info!(shop, function_id = %function_id, "Validation function created");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: FunctionCreated {
                function_id,
                revision: stored.revision,
                rule_set: next,
            },
        }),
    ))
}

/// GET /api/v1/shops/{shop}/functions/{id}
pub async fn get_function(
    State(state): State<AppState>,
    Path((shop, id)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<ValidationFunction>>> {
    let stored = state.store.load(&shop).await?;
    let function = stored
        .rule_set()
        .functions
        .into_iter()
        .find(|f| f.id == id)
        .ok_or(CoreError::NotFound {
            entity: "ValidationFunction",
            id,
        })?;
    Ok(Json(DataResponse { data: function }))
}

/// DELETE /api/v1/shops/{shop}/functions/{id}
pub async fn delete_function(
    State(state): State<AppState>,
    Path((shop, id)): Path<(String, String)>,
    Query(params): Query<RevisionParams>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let next = editor::delete_function(&rule_set, &id)?;
    let stored = commit(&state, &shop, &next, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, next),
    }))
}

/// PUT /api/v1/shops/{shop}/functions/{id}/enabled
pub async fn set_enabled(
    State(state): State<AppState>,
    Path((shop, id)): Path<(String, String)>,
    Query(params): Query<RevisionParams>,
    Json(input): Json<SetEnabledRequest>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let next = editor::set_function_enabled(&rule_set, &id, input.enabled)?;
    let stored = commit(&state, &shop, &next, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, next),
    }))
}

// ── Rules ────────────────────────────────────────────────────────────

/// POST /api/v1/shops/{shop}/functions/{id}/rules
///
/// Add or update a rule. A minimum-cart-value or order-limit rule already
/// held by another function yields `outcome: "requires_move_decision"` and
/// stores nothing.
pub async fn upsert_rule(
    State(state): State<AppState>,
    Path((shop, id)): Path<(String, String)>,
    Query(params): Query<RevisionParams>,
    Json(input): Json<UpsertRuleRequest>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let edit = editor::add_or_update_rule(&rule_set, &id, input.draft, input.editing_index)?;
    let data = apply_edit(&state, &shop, edit, revision).await?;
    Ok(Json(DataResponse { data }))
}

/// DELETE /api/v1/shops/{shop}/functions/{id}/rules/{index}
pub async fn remove_rule(
    State(state): State<AppState>,
    Path((shop, id, index)): Path<(String, String, usize)>,
    Query(params): Query<RevisionParams>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let next = editor::remove_rule(&rule_set, &id, index)?;
    let stored = commit(&state, &shop, &next, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, next),
    }))
}

// ── Conditions ───────────────────────────────────────────────────────

/// POST /api/v1/shops/{shop}/functions/{id}/rules/{index}/conditions
///
/// Add a condition to a payment rule (merging keys into a matching country
/// or zip condition), or replace the one at `editing_index`.
pub async fn upsert_condition(
    State(state): State<AppState>,
    Path((shop, id, index)): Path<(String, String, usize)>,
    Query(params): Query<RevisionParams>,
    Json(input): Json<UpsertConditionRequest>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let next =
        editor::upsert_rule_condition(&rule_set, &id, index, input.condition, input.editing_index)?;
    let stored = commit(&state, &shop, &next, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, next),
    }))
}

/// DELETE /api/v1/shops/{shop}/functions/{id}/rules/{index}/conditions/{condition_index}
///
/// Removing the last condition of a payment rule removes the rule.
pub async fn remove_condition(
    State(state): State<AppState>,
    Path((shop, id, index, condition_index)): Path<(String, String, usize, usize)>,
    Query(params): Query<RevisionParams>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;
    let next = editor::remove_condition(&rule_set, &id, index, condition_index)?;
    let stored = commit(&state, &shop, &next, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, next),
    }))
}
