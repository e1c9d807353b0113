//! Handlers for the `/shops/{shop}/rule-set` and `/shops/{shop}/moves`
//! resources, plus the load/commit cycle shared by every editor handler.
//!
//! Each edit reads the stored document, applies one pure editor operation
//! from `cartguard_core`, and writes the result back with a revision
//! compare-and-swap. A lost race is reported as 409.

use axum::extract::{Path, Query, State};
use axum::Json;
use cartguard_core::error::CoreError;
use cartguard_core::validation::conflict::{
    resolve_move_decision, MoveDecision, MoveResolution, RuleEdit,
};
use cartguard_core::validation::rules::RuleSet;
use cartguard_db::models::rule_set::StoredRuleSet;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::query::RevisionParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ── Response types ───────────────────────────────────────────────────

/// The stored document of a shop as returned to the admin UI.
#[derive(Debug, Serialize)]
pub struct RuleSetDocument {
    pub revision: i64,
    /// Raw stored JSON; a document that no longer decodes is still visible
    /// here so it can be repaired with a replace.
    pub document: serde_json::Value,
}

/// Outcome of an editor request.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditResponse {
    /// The edit was stored at `revision`.
    Committed { revision: i64, rule_set: RuleSet },
    /// Nothing was stored; the client must resolve `decision` via
    /// `POST /moves` before retrying.
    RequiresMoveDecision {
        revision: i64,
        prompt: String,
        decision: MoveDecision,
    },
}

impl EditResponse {
    pub fn committed(stored: StoredRuleSet, rule_set: RuleSet) -> Self {
        Self::Committed {
            revision: stored.revision,
            rule_set,
        }
    }
}

// ── Load / commit ────────────────────────────────────────────────────

/// Load a shop's rule set for editing.
///
/// The stored document is decoded strictly; a document with unknown rules
/// or invariant violations must be replaced wholesale before it can be
/// edited piecemeal.
pub(crate) async fn load_for_edit(
    state: &AppState,
    shop: &str,
    params: &RevisionParams,
) -> AppResult<(RuleSet, i64)> {
    let stored = state.store.load(shop).await?;

    if let Some(expected) = params.expected_revision {
        if expected != stored.revision {
            return Err(CoreError::Conflict(format!(
                "Rule set is at revision {}, not {expected}; reload and retry",
                stored.revision
            ))
            .into());
        }
    }

    let rule_set = RuleSet::from_value_strict(stored.document).map_err(|e| {
        tracing::warn!(shop, error = %e, "Stored rule set cannot be edited");
        CoreError::Conflict(format!(
            "Stored rule set is invalid and must be replaced: {e}"
        ))
    })?;

    Ok((rule_set, stored.revision))
}

/// Persist an edited rule set if the stored revision is still `revision`.
pub(crate) async fn commit(
    state: &AppState,
    shop: &str,
    rule_set: &RuleSet,
    revision: i64,
) -> AppResult<StoredRuleSet> {
    rule_set.check_invariants()?;
    let document = rule_set.to_value()?;

    let stored = state
        .store
        .replace(shop, document, revision)
        .await?
        .ok_or_else(|| {
            CoreError::Conflict(
                "Rule set was modified by another request; reload and retry".to_string(),
            )
        })?;

    tracing::info!(shop, revision = stored.revision, "Rule set saved");
    Ok(stored)
}

/// Commit a [`RuleEdit`], or pass a move decision back to the client.
pub(crate) async fn apply_edit(
    state: &AppState,
    shop: &str,
    edit: RuleEdit,
    revision: i64,
) -> AppResult<EditResponse> {
    match edit {
        RuleEdit::Committed { rule_set } => {
            let stored = commit(state, shop, &rule_set, revision).await?;
            Ok(EditResponse::committed(stored, rule_set))
        }
        RuleEdit::RequiresMoveDecision { decision } => Ok(EditResponse::RequiresMoveDecision {
            revision,
            prompt: decision.prompt(),
            decision,
        }),
    }
}

// ── Rule set ─────────────────────────────────────────────────────────

/// GET /api/v1/shops/{shop}/rule-set
///
/// Return the stored document and its revision. A shop that has never been
/// written returns `[]` at revision 0.
pub async fn get_rule_set(
    State(state): State<AppState>,
    Path(shop): Path<String>,
) -> AppResult<Json<DataResponse<RuleSetDocument>>> {
    let stored = state.store.load(&shop).await?;
    Ok(Json(DataResponse {
        data: RuleSetDocument {
            revision: stored.revision,
            document: stored.document,
        },
    }))
}

/// PUT /api/v1/shops/{shop}/rule-set?expected_revision=N
///
/// Replace the whole document. The body is decoded strictly and must
/// satisfy the rule-set invariants.
pub async fn replace_rule_set(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    Query(params): Query<RevisionParams>,
    Json(document): Json<serde_json::Value>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let rule_set = RuleSet::from_value_strict(document)?;

    // The current document is not decoded: replacing is how a corrupt
    // document gets repaired.
    let revision = match params.expected_revision {
        Some(expected) => expected,
        None => state.store.load(&shop).await?.revision,
    };

    let stored = commit(&state, &shop, &rule_set, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, rule_set),
    }))
}

// ── Moves ────────────────────────────────────────────────────────────

/// Request body for resolving a move decision.
#[derive(Debug, Deserialize)]
pub struct ResolveMoveRequest {
    pub decision: MoveDecision,
    pub resolution: MoveResolution,
}

/// POST /api/v1/shops/{shop}/moves?expected_revision=N
///
/// Resolve a decision returned by a rule edit. `move_here` relocates the
/// globally unique rule in one write; `keep_existing` stores nothing.
pub async fn resolve_move(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    Query(params): Query<RevisionParams>,
    Json(input): Json<ResolveMoveRequest>,
) -> AppResult<Json<DataResponse<EditResponse>>> {
    let (rule_set, revision) = load_for_edit(&state, &shop, &params).await?;

    if input.resolution == MoveResolution::KeepExisting {
        tracing::debug!(shop, kind = input.decision.kind.as_str(), "Kept existing shared rule");
        return Ok(Json(DataResponse {
            data: EditResponse::Committed { revision, rule_set },
        }));
    }

    let next = resolve_move_decision(&rule_set, &input.decision, input.resolution)?;
    let stored = commit(&state, &shop, &next, revision).await?;
    Ok(Json(DataResponse {
        data: EditResponse::committed(stored, next),
    }))
}
