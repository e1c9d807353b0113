//! Models for shop rule-set documents.

use cartguard_core::types::Timestamp;
use cartguard_core::validation::rules::RuleSet;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `shop_rule_sets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ShopRuleSetRow {
    pub shop_domain: String,
    pub document: serde_json::Value,
    pub revision: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The latest version of a shop's document as seen by a reader.
///
/// A shop with no stored document reads as an empty array at revision `0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRuleSet {
    pub document: serde_json::Value,
    pub revision: i64,
}

impl StoredRuleSet {
    /// Revision of a shop that has never been written.
    pub const INITIAL_REVISION: i64 = 0;

    pub fn empty() -> Self {
        Self {
            document: serde_json::Value::Array(Vec::new()),
            revision: Self::INITIAL_REVISION,
        }
    }

    /// Decode the document, falling back to an empty rule set on any defect.
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::from_value_lenient(&self.document)
    }
}

impl From<ShopRuleSetRow> for StoredRuleSet {
    fn from(row: ShopRuleSetRow) -> Self {
        Self {
            document: row.document,
            revision: row.revision,
        }
    }
}
