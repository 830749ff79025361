//! # OAuth Flow Orchestrator
//!
//! Drives the authorization-code flow per provider: builds authorization
//! URLs with single-use CSRF state, exchanges callback codes for tokens,
//! reports connection status, and disconnects pairs. Every outcome is
//! recorded in the metrics ledger before an error propagates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::IntegrationError;
use crate::metrics::{HealthReport, MetricsLedger, MetricsSnapshot};
use crate::models::{IntegrationConfig, PairKey, TenantId};
use crate::providers::{ExchangerRegistry, Provider};
use crate::repositories::token::NewToken;
use crate::repositories::{ConfigRepository, TokenStore};

/// Status payload returned to the embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

#[derive(Debug, Clone)]
struct PendingState {
    state: String,
    expires_at: DateTime<Utc>,
}

pub struct OAuthService {
    config: Arc<AppConfig>,
    configs: Arc<ConfigRepository>,
    tokens: Arc<TokenStore>,
    exchangers: Arc<ExchangerRegistry>,
    ledger: Arc<MetricsLedger>,
    // One pending state per pair; issuing a new URL invalidates the prior
    // state, and redeeming consumes it.
    pending_states: Mutex<HashMap<PairKey, PendingState>>,
}

impl OAuthService {
    pub fn new(
        config: Arc<AppConfig>,
        configs: Arc<ConfigRepository>,
        tokens: Arc<TokenStore>,
        exchangers: Arc<ExchangerRegistry>,
        ledger: Arc<MetricsLedger>,
    ) -> Self {
        Self {
            config,
            configs,
            tokens,
            exchangers,
            ledger,
            pending_states: Mutex::new(HashMap::new()),
        }
    }

    /// Upsert the tenant's OAuth client credentials for a provider.
    pub async fn configure(
        &self,
        tenant_id: TenantId,
        provider: Provider,
        client_id: String,
        client_secret: String,
    ) -> IntegrationConfig {
        info!(tenant_id = %tenant_id, provider = %provider, "configuring integration");
        self.configs
            .upsert(tenant_id, provider, client_id, client_secret, None, None)
            .await
    }

    /// Build the provider authorization URL for a tenant, issuing a fresh
    /// single-use CSRF state.
    pub async fn generate_oauth_url(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
    ) -> Result<Url, IntegrationError> {
        let config = self.require_config(tenant_id, provider).await?;
        let state = self.issue_state(&config.key());
        let redirect_uri = self.redirect_uri(&config);
        let scopes = effective_scopes(&config);

        let mut url = Url::parse(provider.authorize_url())
            .expect("catalog authorize URL is valid");
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes)
            .append_pair("state", &state);

        info!(tenant_id = %tenant_id, provider = %provider, "generated authorization URL");
        Ok(url)
    }

    /// Redeem a provider callback: validate the CSRF state, exchange the
    /// code, and persist the resulting tokens.
    pub async fn handle_callback(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
        code: &str,
        state: &str,
    ) -> Result<ConnectionStatus, IntegrationError> {
        let key = PairKey::new(tenant_id.clone(), provider);
        self.ledger.record_attempt(&key);

        let config = match self.require_config(tenant_id, provider).await {
            Ok(config) => config,
            Err(e) => {
                self.ledger.record_failure(&key);
                return Err(e);
            }
        };

        if !self.take_state(&key, state) {
            warn!(pair = %key, "oauth callback state mismatch");
            self.ledger.record_failure(&key);
            return Err(IntegrationError::InvalidState {
                tenant_id: tenant_id.clone(),
                provider,
            });
        }

        let redirect_uri = self.redirect_uri(&config);
        let exchanger = self.exchangers.get(provider)?;
        let grant = match exchanger.exchange_code(&config, code, &redirect_uri).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(pair = %key, error = %e, "authorization code exchange failed");
                self.ledger.record_failure(&key);
                return Err(e.into());
            }
        };

        let scopes = grant.scope.clone().unwrap_or_else(|| effective_scopes(&config));
        if let Err(e) = self
            .tokens
            .store_token(
                tenant_id,
                provider,
                NewToken {
                    access_token: &grant.access_token,
                    refresh_token: grant.refresh_token.as_deref(),
                    token_type: &grant.token_type,
                    expires_at: grant.expires_at,
                    scopes: Some(&scopes),
                },
            )
            .await
        {
            self.ledger.record_failure(&key);
            return Err(e.into());
        }

        self.ledger.record_success(&key);
        info!(pair = %key, "integration connected");
        Ok(ConnectionStatus { connected: true })
    }

    /// Whether the pair currently holds an unexpired token.
    pub async fn is_connected(&self, tenant_id: &TenantId, provider: Provider) -> bool {
        self.tokens.has_valid_token(tenant_id, provider).await
    }

    pub async fn check_status(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
    ) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(tenant_id, provider).await,
        }
    }

    /// Delete the pair's token and configuration. Idempotent: disconnecting
    /// an already-disconnected pair succeeds, and the disconnection counter
    /// only moves when a row was actually removed.
    pub async fn disconnect(&self, tenant_id: &TenantId, provider: Provider) -> ConnectionStatus {
        let key = PairKey::new(tenant_id.clone(), provider);
        let removed_token = self.tokens.delete_token(tenant_id, provider).await;
        let removed_config = self.configs.delete(tenant_id, provider).await;
        self.pending_states
            .lock()
            .expect("state lock poisoned")
            .remove(&key);

        if removed_token || removed_config {
            self.ledger.record_disconnect(&key);
            info!(pair = %key, "integration disconnected");
        }
        ConnectionStatus { connected: false }
    }

    pub fn metrics(&self, tenant_id: &TenantId, provider: Provider) -> MetricsSnapshot {
        self.ledger
            .snapshot(&PairKey::new(tenant_id.clone(), provider))
    }

    pub fn health(&self, tenant_id: &TenantId, provider: Provider) -> HealthReport {
        self.ledger
            .health(&PairKey::new(tenant_id.clone(), provider))
    }

    async fn require_config(
        &self,
        tenant_id: &TenantId,
        provider: Provider,
    ) -> Result<IntegrationConfig, IntegrationError> {
        self.configs
            .get(tenant_id, provider)
            .await
            .ok_or_else(|| IntegrationError::NotConfigured {
                tenant_id: tenant_id.clone(),
                provider,
            })
    }

    fn redirect_uri(&self, config: &IntegrationConfig) -> String {
        config.redirect_uri.clone().unwrap_or_else(|| {
            format!(
                "{}{}",
                self.config.public_base_url.trim_end_matches('/'),
                config.provider.callback_path()
            )
        })
    }

    fn issue_state(&self, key: &PairKey) -> String {
        let state = Uuid::new_v4().to_string();
        let expires_at =
            Utc::now() + Duration::seconds(self.config.oauth_state_ttl_seconds as i64);
        self.pending_states
            .lock()
            .expect("state lock poisoned")
            .insert(
                key.clone(),
                PendingState {
                    state: state.clone(),
                    expires_at,
                },
            );
        state
    }

    /// Consume the pending state for a pair. Returns true only when an
    /// unexpired state exists and matches; the entry is removed either way,
    /// so a state can never be redeemed twice.
    fn take_state(&self, key: &PairKey, presented: &str) -> bool {
        let mut states = self.pending_states.lock().expect("state lock poisoned");
        match states.remove(key) {
            Some(pending) => pending.state == presented && pending.expires_at > Utc::now(),
            None => false,
        }
    }
}

fn effective_scopes(config: &IntegrationConfig) -> String {
    config
        .scopes
        .clone()
        .unwrap_or_else(|| config.provider.default_scopes().to_string())
}
