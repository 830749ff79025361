//! Token store
//!
//! Keyed persistence of one token record per (tenant, provider) pair.
//! Secrets are encrypted on write and decrypted on read; the ciphertext AAD
//! binds each token to its pair so records cannot be replayed across
//! tenants. The single-valid-token invariant is carried by the keyed
//! store's atomic upsert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use crate::crypto::{CryptoError, CryptoKey, decrypt_token, encrypt_token};
use crate::models::{PairKey, TenantId, TokenRecord};
use crate::providers::Provider;
use crate::store::{KeyedStore, MemoryStore};

fn token_aad(tenant_id: &TenantId, provider: Provider) -> String {
    format!("{}|{}", tenant_id, provider.slug())
}

/// Arguments for [`TokenStore::store_token`].
#[derive(Debug, Clone)]
pub struct NewToken<'a> {
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub token_type: &'a str,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<&'a str>,
}

#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyedStore<PairKey, TokenRecord>>,
    crypto_key: CryptoKey,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyedStore<PairKey, TokenRecord>>, crypto_key: CryptoKey) -> Self {
        Self { store, crypto_key }
    }

    pub fn in_memory(crypto_key: CryptoKey) -> Self {
        Self::new(Arc::new(MemoryStore::new()), crypto_key)
    }

    /// Encrypt and persist a new credential set for the pair, atomically
    /// replacing any prior record. No reader observes zero or two rows.
    pub async fn store_token(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
        token: NewToken<'_>,
    ) -> Result<TokenRecord, CryptoError> {
        let aad = token_aad(tenant_id, provider);
        let access_token_ciphertext = encrypt_token(&self.crypto_key, &aad, token.access_token)?;
        let refresh_token_ciphertext = token
            .refresh_token
            .map(|refresh| encrypt_token(&self.crypto_key, &aad, refresh))
            .transpose()?;

        let key = PairKey::new(tenant_id.clone(), provider);
        let now = Utc::now();
        let record = TokenRecord {
            tenant_id: tenant_id.clone(),
            provider,
            access_token_ciphertext,
            refresh_token_ciphertext,
            token_type: token.token_type.to_string(),
            expires_at: token.expires_at,
            scopes: token.scopes.map(|s| s.to_string()),
            created_at: now,
            updated_at: now,
        };

        self.store.upsert(key, record.clone()).await;
        Ok(record)
    }

    /// The decrypted access token, only while the record is unexpired.
    /// Expired-but-present tokens read as absent here.
    pub async fn valid_access_token(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
    ) -> Result<Option<String>, CryptoError> {
        self.valid_access_token_at(tenant_id, provider, Utc::now())
            .await
    }

    /// Clock-injected variant of [`valid_access_token`].
    ///
    /// [`valid_access_token`]: TokenStore::valid_access_token
    pub async fn valid_access_token_at(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, CryptoError> {
        let key = PairKey::new(tenant_id.clone(), provider);
        let Some(record) = self.store.get(&key).await else {
            return Ok(None);
        };
        if !record.is_valid_at(now) {
            return Ok(None);
        }

        let aad = token_aad(tenant_id, provider);
        match decrypt_token(&self.crypto_key, &aad, &record.access_token_ciphertext) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                error!(pair = %key, "access token decryption failed");
                Err(e)
            }
        }
    }

    /// The decrypted refresh token, regardless of access-token expiry: the
    /// refresh path needs it precisely because the access token lapsed.
    pub async fn refresh_token(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
    ) -> Result<Option<String>, CryptoError> {
        let key = PairKey::new(tenant_id.clone(), provider);
        let Some(record) = self.store.get(&key).await else {
            return Ok(None);
        };
        let Some(ciphertext) = record.refresh_token_ciphertext else {
            return Ok(None);
        };

        let aad = token_aad(tenant_id, provider);
        match decrypt_token(&self.crypto_key, &aad, &ciphertext) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                error!(pair = %key, "refresh token decryption failed");
                Err(e)
            }
        }
    }

    pub async fn expires_at(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
    ) -> Option<DateTime<Utc>> {
        self.store
            .get(&PairKey::new(tenant_id.clone(), provider))
            .await
            .and_then(|record| record.expires_at)
    }

    pub async fn delete_token(&self, tenant_id: &TenantId, provider: Provider) -> bool {
        self.store
            .delete_by_key(&PairKey::new(tenant_id.clone(), provider))
            .await
    }

    /// Whether an unexpired token record exists for the pair. Does not
    /// touch the ciphertext.
    pub async fn has_valid_token(&self, tenant_id: &TenantId, provider: Provider) -> bool {
        self.has_valid_token_at(tenant_id, provider, Utc::now())
            .await
    }

    /// Clock-injected variant of [`has_valid_token`].
    ///
    /// [`has_valid_token`]: TokenStore::has_valid_token
    pub async fn has_valid_token_at(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
        now: DateTime<Utc>,
    ) -> bool {
        self.store
            .get(&PairKey::new(tenant_id.clone(), provider))
            .await
            .is_some_and(|record| record.is_valid_at(now))
    }
}
