//! Rule-set store abstraction.
//!
//! The API layer talks to a [`RuleSetStore`] so the same handlers run against
//! PostgreSQL in production and an in-process map in development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::rule_set::StoredRuleSet;
use crate::repositories::RuleSetRepo;
use crate::DbPool;

/// Storage for one rule-set document per shop.
#[async_trait]
pub trait RuleSetStore: Send + Sync {
    /// Read the latest document. A shop with no document reads as
    /// [`StoredRuleSet::empty`].
    async fn load(&self, shop_domain: &str) -> Result<StoredRuleSet, sqlx::Error>;

    /// Replace the document if the stored revision equals `expected_revision`.
    ///
    /// Returns the new version, or `None` if the revision no longer matches.
    async fn replace(
        &self,
        shop_domain: &str,
        document: serde_json::Value,
        expected_revision: i64,
    ) -> Result<Option<StoredRuleSet>, sqlx::Error>;

    /// Whether the backing storage is reachable.
    async fn health_check(&self) -> Result<(), sqlx::Error>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// Store backed by the `shop_rule_sets` table.
pub struct PgRuleSetStore {
    pool: DbPool,
}

impl PgRuleSetStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleSetStore for PgRuleSetStore {
    async fn load(&self, shop_domain: &str) -> Result<StoredRuleSet, sqlx::Error> {
        Ok(RuleSetRepo::find_by_shop(&self.pool, shop_domain)
            .await?
            .map(StoredRuleSet::from)
            .unwrap_or_else(StoredRuleSet::empty))
    }

    async fn replace(
        &self,
        shop_domain: &str,
        document: serde_json::Value,
        expected_revision: i64,
    ) -> Result<Option<StoredRuleSet>, sqlx::Error> {
        let row = if expected_revision == StoredRuleSet::INITIAL_REVISION {
            RuleSetRepo::insert(&self.pool, shop_domain, &document).await?
        } else {
            RuleSetRepo::replace(&self.pool, shop_domain, &document, expected_revision).await?
        };
        if row.is_none() {
            tracing::warn!(shop_domain, expected_revision, "Rule set revision mismatch");
        }
        Ok(row.map(StoredRuleSet::from))
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        crate::health_check(&self.pool).await
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store. Documents are lost on restart.
#[derive(Default)]
pub struct MemoryRuleSetStore {
    documents: RwLock<HashMap<String, StoredRuleSet>>,
}

impl MemoryRuleSetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleSetStore for MemoryRuleSetStore {
    async fn load(&self, shop_domain: &str) -> Result<StoredRuleSet, sqlx::Error> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(shop_domain)
            .cloned()
            .unwrap_or_else(StoredRuleSet::empty))
    }

    async fn replace(
        &self,
        shop_domain: &str,
        document: serde_json::Value,
        expected_revision: i64,
    ) -> Result<Option<StoredRuleSet>, sqlx::Error> {
        let mut documents = self.documents.write().await;
        let current = documents
            .get(shop_domain)
            .map(|d| d.revision)
            .unwrap_or(StoredRuleSet::INITIAL_REVISION);
        if current != expected_revision {
            tracing::warn!(shop_domain, expected_revision, current, "Rule set revision mismatch");
            return Ok(None);
        }
        let stored = StoredRuleSet {
            document,
            revision: current + 1,
        };
        documents.insert(shop_domain.to_string(), stored.clone());
        Ok(Some(stored))
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_shop_reads_empty() {
        let store = MemoryRuleSetStore::new();
        let stored = store.load("a.myshopify.com").await.unwrap();
        assert_eq!(stored, StoredRuleSet::empty());
        assert!(stored.rule_set().functions.is_empty());
    }

    #[tokio::test]
    async fn replace_bumps_revision() {
        let store = MemoryRuleSetStore::new();
        let first = store
            .replace("a.myshopify.com", json!([{"id": "fn_1"}]), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.revision, 1);
        let second = store
            .replace("a.myshopify.com", json!([]), 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.revision, 2);
        assert_eq!(store.load("a.myshopify.com").await.unwrap(), second);
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryRuleSetStore::new();
        store
            .replace("a.myshopify.com", json!([]), 0)
            .await
            .unwrap()
            .unwrap();
        let stale = store
            .replace("a.myshopify.com", json!([{"id": "fn_2"}]), 0)
            .await
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(
            store.load("a.myshopify.com").await.unwrap().document,
            json!([])
        );
    }

    #[tokio::test]
    async fn shops_are_isolated() {
        let store = MemoryRuleSetStore::new();
        store
            .replace("a.myshopify.com", json!([{"id": "fn_1"}]), 0)
            .await
            .unwrap();
        assert_eq!(
            store.load("b.myshopify.com").await.unwrap().revision,
            StoredRuleSet::INITIAL_REVISION
        );
    }
}
