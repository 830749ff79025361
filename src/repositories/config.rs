//! Integration configuration repository.

use std::sync::Arc;

use chrono::Utc;

use crate::models::{IntegrationConfig, PairKey, TenantId};
use crate::providers::Provider;
use crate::store::{KeyedStore, MemoryStore};

/// Per-tenant provider configuration, at most one row per pair.
#[derive(Clone)]
pub struct ConfigRepository {
    store: Arc<dyn KeyedStore<PairKey, IntegrationConfig>>,
}

impl ConfigRepository {
    pub fn new(store: Arc<dyn KeyedStore<PairKey, IntegrationConfig>>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Create or update the configuration for a pair. The original
    /// `created_at` survives credential rotation.
    pub async fn upsert(
        &self,
        tenant_id: TenantId,
        provider: Provider,
        client_id: String,
        client_secret: String,
        redirect_uri: Option<String>,
        scopes: Option<String>,
    ) -> IntegrationConfig {
        let key = PairKey::new(tenant_id.clone(), provider);
        let now = Utc::now();
        let created_at = self
            .store
            .get(&key)
            .await
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let config = IntegrationConfig {
            tenant_id,
            provider,
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            created_at,
            updated_at: now,
        };
        self.store.upsert(key, config.clone()).await;
        config
    }

    pub async fn get(&self, tenant_id: &TenantId, provider: Provider) -> Option<IntegrationConfig> {
        self.store
            .get(&PairKey::new(tenant_id.clone(), provider))
            .await
    }

    pub async fn list_all(&self) -> Vec<IntegrationConfig> {
        self.store.list_all().await
    }

    pub async fn delete(&self, tenant_id: &TenantId, provider: Provider) -> bool {
        self.store
            .delete_by_key(&PairKey::new(tenant_id.clone(), provider))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_enforces_one_row_per_pair() {
        let repo = ConfigRepository::in_memory();
        let tenant = TenantId::from("acme");

        repo.upsert(
            tenant.clone(),
            Provider::Github,
            "first-id".to_string(),
            "first-secret".to_string(),
            None,
            None,
        )
        .await;
        let updated = repo
            .upsert(
                tenant.clone(),
                Provider::Github,
                "second-id".to_string(),
                "second-secret".to_string(),
                None,
                None,
            )
            .await;

        assert_eq!(repo.list_all().await.len(), 1);
        let fetched = repo.get(&tenant, Provider::Github).await.expect("row exists");
        assert_eq!(fetched.client_id, "second-id");
        assert_eq!(fetched.created_at, updated.created_at);
    }

    #[tokio::test]
    async fn test_pairs_are_independent() {
        let repo = ConfigRepository::in_memory();
        let tenant = TenantId::from("acme");

        repo.upsert(
            tenant.clone(),
            Provider::Github,
            "gh".to_string(),
            "s".to_string(),
            None,
            None,
        )
        .await;
        repo.upsert(
            tenant.clone(),
            Provider::Slack,
            "sl".to_string(),
            "s".to_string(),
            None,
            None,
        )
        .await;

        assert_eq!(repo.list_all().await.len(), 2);
        assert!(repo.delete(&tenant, Provider::Github).await);
        assert!(repo.get(&tenant, Provider::Github).await.is_none());
        assert!(repo.get(&tenant, Provider::Slack).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_row_reports_false() {
        let repo = ConfigRepository::in_memory();
        assert!(!repo.delete(&TenantId::from("acme"), Provider::Jira).await);
    }
}
