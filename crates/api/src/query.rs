//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Optimistic-concurrency parameter (`?expected_revision=`).
///
/// When present, the edit is rejected with 409 unless the stored document
/// is still at this revision.
#[derive(Debug, Default, Deserialize)]
pub struct RevisionParams {
    pub expected_revision: Option<i64>,
}
