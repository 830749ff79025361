//! Domain models shared across the integration core.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::Provider;

/// Identifier of an isolated tenant ("company") whose integrations and
/// tokens are segregated from all others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Composite key identifying one tenant-provider pair. Configurations,
/// tokens, pending OAuth states, and metrics are all keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub tenant_id: TenantId,
    pub provider: Provider,
}

impl PairKey {
    pub fn new(tenant_id: TenantId, provider: Provider) -> Self {
        Self {
            tenant_id,
            provider,
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.provider)
    }
}

/// Per-tenant OAuth client configuration for one provider.
///
/// Exactly one configuration may exist per (tenant, provider) pair. A
/// configuration can exist without a token: the tenant has enabled the
/// provider but not yet completed authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub tenant_id: TenantId,
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    /// Overrides the derived `public_base_url + callback_path` redirect URI.
    pub redirect_uri: Option<String>,
    /// Overrides the catalog's default scopes.
    pub scopes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationConfig {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.tenant_id.clone(), self.provider)
    }
}

/// The current credential set for one (tenant, provider) pair.
///
/// At most one record exists per pair; every refresh or re-authorization
/// replaces the record wholesale. Token secrets are stored as AES-256-GCM
/// ciphertext, never plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub tenant_id: TenantId,
    pub provider: Provider,
    pub access_token_ciphertext: Vec<u8>,
    pub refresh_token_ciphertext: Option<Vec<u8>>,
    pub token_type: String,
    /// Absent means the token does not expire.
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.tenant_id.clone(), self.provider)
    }

    /// Whether the record is usable at `now`: present and not past expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}
