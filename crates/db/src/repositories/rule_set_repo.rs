//! Repository for shop rule-set documents.

use sqlx::PgPool;

use crate::models::rule_set::ShopRuleSetRow;

/// Column list for `shop_rule_sets` queries.
const COLUMNS: &str = "shop_domain, document, revision, created_at, updated_at";

/// Provides read and compare-and-swap write operations for rule-set documents.
pub struct RuleSetRepo;

impl RuleSetRepo {
    /// Find the document of a shop.
    pub async fn find_by_shop(
        pool: &PgPool,
        shop_domain: &str,
    ) -> Result<Option<ShopRuleSetRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM shop_rule_sets WHERE shop_domain = $1");
        sqlx::query_as::<_, ShopRuleSetRow>(&query)
            .bind(shop_domain)
            .fetch_optional(pool)
            .await
    }

    /// Insert the first document of a shop at revision 1.
    ///
    /// Returns `None` if another writer created the document first.
    pub async fn insert(
        pool: &PgPool,
        shop_domain: &str,
        document: &serde_json::Value,
    ) -> Result<Option<ShopRuleSetRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO shop_rule_sets (shop_domain, document, revision) \
             VALUES ($1, $2, 1) \
             ON CONFLICT (shop_domain) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ShopRuleSetRow>(&query)
            .bind(shop_domain)
            .bind(document)
            .fetch_optional(pool)
            .await
    }

    /// Replace the document if its revision is still `expected_revision`.
    ///
    /// Bumps the revision by one. Returns `None` when the stored revision
    /// differs (a concurrent write won) or the shop has no document.
    pub async fn replace(
        pool: &PgPool,
        shop_domain: &str,
        document: &serde_json::Value,
        expected_revision: i64,
    ) -> Result<Option<ShopRuleSetRow>, sqlx::Error> {
        let query = format!(
            "UPDATE shop_rule_sets SET \
                document = $2, \
                revision = revision + 1, \
                updated_at = NOW() \
             WHERE shop_domain = $1 AND revision = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ShopRuleSetRow>(&query)
            .bind(shop_domain)
            .bind(document)
            .bind(expected_revision)
            .fetch_optional(pool)
            .await
    }
}
