//! Refresh sweep behavior against stub and wiremock token endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use integrations::config::AppConfig;
use integrations::crypto::CryptoKey;
use integrations::metrics::MetricsLedger;
use integrations::models::{IntegrationConfig, PairKey, TenantId, TokenRecord};
use integrations::store::{KeyedStore, MemoryStore};
use integrations::providers::{
    ExchangeError, ExchangerRegistry, Provider, TokenExchanger, TokenGrant,
};
use integrations::refresh::RefreshSweeper;
use integrations::repositories::token::NewToken;
use integrations::repositories::{ConfigRepository, TokenStore};

/// Stub exchanger whose refresh grant fails for configured client IDs and
/// optionally rotates the refresh token.
struct StubExchanger {
    provider: Provider,
    failing_client_ids: Vec<String>,
    rotated_refresh_token: Option<String>,
}

#[async_trait]
impl TokenExchanger for StubExchanger {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn exchange_code(
        &self,
        _config: &IntegrationConfig,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        Err(ExchangeError::Malformed("stub has no code exchange".into()))
    }

    async fn refresh_token(
        &self,
        config: &IntegrationConfig,
        _refresh_token: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        if self.failing_client_ids.contains(&config.client_id) {
            return Err(ExchangeError::Provider {
                code: "invalid_grant".to_string(),
                description: "refresh token revoked".to_string(),
            });
        }
        Ok(TokenGrant {
            access_token: format!("renewed-{}", config.client_id),
            refresh_token: self.rotated_refresh_token.clone(),
            token_type: "bearer".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: None,
        })
    }
}

/// Stub for a provider variant that has no refresh flow.
struct RefreshlessExchanger {
    provider: Provider,
}

#[async_trait]
impl TokenExchanger for RefreshlessExchanger {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn exchange_code(
        &self,
        _config: &IntegrationConfig,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        Err(ExchangeError::Malformed("stub has no code exchange".into()))
    }

    async fn refresh_token(
        &self,
        _config: &IntegrationConfig,
        _refresh_token: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        Err(ExchangeError::Unsupported(self.provider))
    }
}

struct Harness {
    sweeper: RefreshSweeper,
    configs: Arc<ConfigRepository>,
    tokens: Arc<TokenStore>,
    ledger: Arc<MetricsLedger>,
}

fn harness(registry: ExchangerRegistry) -> Harness {
    let config = Arc::new(AppConfig::default());
    let configs = Arc::new(ConfigRepository::in_memory());
    let tokens = Arc::new(TokenStore::in_memory(CryptoKey::derive(
        &config.crypto_secret,
    )));
    let ledger = Arc::new(MetricsLedger::new());
    let sweeper = RefreshSweeper::new(
        config,
        configs.clone(),
        tokens.clone(),
        Arc::new(registry),
        ledger.clone(),
    );
    Harness {
        sweeper,
        configs,
        tokens,
        ledger,
    }
}

async fn seed_pair(harness: &Harness, tenant: &str, client_id: &str, token: NewToken<'_>) {
    let tenant = TenantId::from(tenant);
    harness
        .configs
        .upsert(
            tenant.clone(),
            Provider::Github,
            client_id.to_string(),
            "secret".to_string(),
            None,
            None,
        )
        .await;
    harness
        .tokens
        .store_token(&tenant, Provider::Github, token)
        .await
        .expect("token stored");
}

fn expiring_token<'a>(refresh_token: Option<&'a str>) -> NewToken<'a> {
    NewToken {
        access_token: "stale-access",
        refresh_token,
        token_type: "bearer",
        expires_at: Some(Utc::now() + Duration::seconds(60)),
        scopes: None,
    }
}

#[tokio::test]
async fn test_one_failing_pair_does_not_stop_the_sweep() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec!["bad-client".to_string()],
        rotated_refresh_token: None,
    }));
    let harness = harness(registry);

    seed_pair(&harness, "acme", "acme-client", expiring_token(Some("r1"))).await;
    seed_pair(&harness, "broken", "bad-client", expiring_token(Some("r2"))).await;
    seed_pair(&harness, "globex", "globex-client", expiring_token(Some("r3"))).await;

    let stats = harness.sweeper.sweep(Utc::now()).await;

    assert_eq!(stats.pairs_scanned, 3);
    assert_eq!(stats.refreshes_attempted, 3);
    assert_eq!(stats.refreshes_succeeded, 2);
    assert_eq!(stats.refreshes_failed, 1);

    // The two healthy pairs got fresh tokens; the failing one kept its old
    // record and only its metric moved.
    assert_eq!(
        harness
            .tokens
            .valid_access_token(&TenantId::from("acme"), Provider::Github)
            .await
            .expect("reads"),
        Some("renewed-acme-client".to_string())
    );
    assert_eq!(
        harness
            .tokens
            .valid_access_token(&TenantId::from("globex"), Provider::Github)
            .await
            .expect("reads"),
        Some("renewed-globex-client".to_string())
    );

    let failed = harness
        .ledger
        .snapshot(&PairKey::new(TenantId::from("broken"), Provider::Github));
    assert_eq!(failed.failed_refreshes, 1);
    assert_eq!(failed.successful_refreshes, 0);
}

#[tokio::test]
async fn test_corrupt_refresh_ciphertext_records_a_failed_refresh() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec![],
        rotated_refresh_token: None,
    }));

    let config = Arc::new(AppConfig::default());
    let backing: Arc<MemoryStore<PairKey, TokenRecord>> = Arc::new(MemoryStore::new());
    let configs = Arc::new(ConfigRepository::in_memory());
    let tokens = Arc::new(TokenStore::new(
        backing.clone(),
        CryptoKey::derive(&config.crypto_secret),
    ));
    let ledger = Arc::new(MetricsLedger::new());
    let sweeper = RefreshSweeper::new(
        config,
        configs.clone(),
        tokens.clone(),
        Arc::new(registry),
        ledger.clone(),
    );

    for (tenant, client_id) in [("broken", "broken-client"), ("acme", "acme-client")] {
        let tenant = TenantId::from(tenant);
        configs
            .upsert(
                tenant.clone(),
                Provider::Github,
                client_id.to_string(),
                "secret".to_string(),
                None,
                None,
            )
            .await;
        tokens
            .store_token(&tenant, Provider::Github, expiring_token(Some("r1")))
            .await
            .expect("token stored");
    }

    // Flip a ciphertext byte so the broken pair's refresh token no longer
    // decrypts.
    let broken_key = PairKey::new(TenantId::from("broken"), Provider::Github);
    let mut record = backing.get(&broken_key).await.expect("record exists");
    record
        .refresh_token_ciphertext
        .as_mut()
        .expect("refresh ciphertext present")[20] ^= 0xFF;
    backing.upsert(broken_key.clone(), record).await;

    let stats = sweeper.sweep(Utc::now()).await;

    assert_eq!(stats.refreshes_failed, 1);
    assert_eq!(stats.refreshes_succeeded, 1);
    assert_eq!(ledger.snapshot(&broken_key).failed_refreshes, 1);
    assert_eq!(
        tokens
            .valid_access_token(&TenantId::from("acme"), Provider::Github)
            .await
            .expect("reads"),
        Some("renewed-acme-client".to_string())
    );
}

#[tokio::test]
async fn test_unsupported_refresh_records_a_failed_refresh() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(RefreshlessExchanger {
        provider: Provider::Github,
    }));
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Slack,
        failing_client_ids: vec![],
        rotated_refresh_token: None,
    }));
    let harness = harness(registry);

    seed_pair(&harness, "acme", "gh-client", expiring_token(Some("r1"))).await;
    let slack_tenant = TenantId::from("acme");
    harness
        .configs
        .upsert(
            slack_tenant.clone(),
            Provider::Slack,
            "slack-client".to_string(),
            "secret".to_string(),
            None,
            None,
        )
        .await;
    harness
        .tokens
        .store_token(&slack_tenant, Provider::Slack, expiring_token(Some("r2")))
        .await
        .expect("token stored");

    let stats = harness.sweeper.sweep(Utc::now()).await;

    assert_eq!(stats.refreshes_failed, 1);
    assert_eq!(stats.refreshes_succeeded, 1);
    let github = harness
        .ledger
        .snapshot(&PairKey::new(TenantId::from("acme"), Provider::Github));
    assert_eq!(github.failed_refreshes, 1);
    assert_eq!(
        harness
            .tokens
            .valid_access_token(&slack_tenant, Provider::Slack)
            .await
            .expect("reads"),
        Some("renewed-slack-client".to_string())
    );
}

#[tokio::test]
async fn test_already_expired_token_is_still_refreshed() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec![],
        rotated_refresh_token: None,
    }));
    let harness = harness(registry);

    seed_pair(
        &harness,
        "acme",
        "acme-client",
        NewToken {
            access_token: "long-dead",
            refresh_token: Some("r1"),
            token_type: "bearer",
            expires_at: Some(Utc::now() - Duration::hours(3)),
            scopes: None,
        },
    )
    .await;

    let stats = harness.sweeper.sweep(Utc::now()).await;
    assert_eq!(stats.refreshes_succeeded, 1);
    assert!(
        harness
            .tokens
            .has_valid_token(&TenantId::from("acme"), Provider::Github)
            .await
    );
}

#[tokio::test]
async fn test_pair_without_refresh_token_is_skipped_not_failed() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec![],
        rotated_refresh_token: None,
    }));
    let harness = harness(registry);

    seed_pair(&harness, "acme", "acme-client", expiring_token(None)).await;

    let stats = harness.sweeper.sweep(Utc::now()).await;
    assert_eq!(stats.pairs_scanned, 1);
    assert_eq!(stats.pairs_skipped, 1);
    assert_eq!(stats.refreshes_attempted, 0);

    let snapshot = harness
        .ledger
        .snapshot(&PairKey::new(TenantId::from("acme"), Provider::Github));
    assert_eq!(snapshot.failed_refreshes, 0);
    assert_eq!(snapshot.successful_refreshes, 0);
}

#[tokio::test]
async fn test_token_outside_lead_window_is_untouched() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec![],
        rotated_refresh_token: None,
    }));
    let harness = harness(registry);

    seed_pair(
        &harness,
        "acme",
        "acme-client",
        NewToken {
            access_token: "still-fresh",
            refresh_token: Some("r1"),
            token_type: "bearer",
            expires_at: Some(Utc::now() + Duration::hours(6)),
            scopes: None,
        },
    )
    .await;

    let stats = harness.sweeper.sweep(Utc::now()).await;
    assert_eq!(stats.pairs_skipped, 1);
    assert_eq!(stats.refreshes_attempted, 0);
    assert_eq!(
        harness
            .tokens
            .valid_access_token(&TenantId::from("acme"), Provider::Github)
            .await
            .expect("reads"),
        Some("still-fresh".to_string())
    );
}

#[tokio::test]
async fn test_refresh_token_rotation() {
    // Provider rotates the refresh token: the rotated one must be stored.
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec![],
        rotated_refresh_token: Some("rotated-refresh".to_string()),
    }));
    let harness = harness(registry);
    seed_pair(&harness, "acme", "acme-client", expiring_token(Some("old-refresh"))).await;

    harness.sweeper.sweep(Utc::now()).await;
    assert_eq!(
        harness
            .tokens
            .refresh_token(&TenantId::from("acme"), Provider::Github)
            .await
            .expect("reads"),
        Some("rotated-refresh".to_string())
    );
}

#[tokio::test]
async fn test_refresh_token_reused_when_provider_omits_it() {
    let mut registry = ExchangerRegistry::empty();
    registry.register(Arc::new(StubExchanger {
        provider: Provider::Github,
        failing_client_ids: vec![],
        rotated_refresh_token: None,
    }));
    let harness = harness(registry);
    seed_pair(&harness, "acme", "acme-client", expiring_token(Some("old-refresh"))).await;

    harness.sweeper.sweep(Utc::now()).await;
    assert_eq!(
        harness
            .tokens
            .refresh_token(&TenantId::from("acme"), Provider::Github)
            .await
            .expect("reads"),
        Some("old-refresh".to_string())
    );
}

#[tokio::test]
async fn test_refresh_against_stub_token_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "gho_renewed",
            "token_type": "bearer",
            "refresh_token": "ghr_rotated",
            "expires_in": 28800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = Arc::new(AppConfig {
        github_token_url: Some(format!("{}/login/oauth/access_token", mock_server.uri())),
        ..AppConfig::default()
    });
    let configs = Arc::new(ConfigRepository::in_memory());
    let tokens = Arc::new(TokenStore::in_memory(CryptoKey::derive(
        &config.crypto_secret,
    )));
    let registry = ExchangerRegistry::from_config(&config).expect("registry builds");
    let sweeper = RefreshSweeper::new(
        config,
        configs.clone(),
        tokens.clone(),
        Arc::new(registry),
        Arc::new(MetricsLedger::new()),
    );

    let tenant = TenantId::from("acme");
    configs
        .upsert(
            tenant.clone(),
            Provider::Github,
            "client-x".to_string(),
            "secret-y".to_string(),
            None,
            None,
        )
        .await;
    tokens
        .store_token(&tenant, Provider::Github, expiring_token(Some("old-refresh")))
        .await
        .expect("token stored");

    let stats = sweeper.sweep(Utc::now()).await;
    assert_eq!(stats.refreshes_succeeded, 1);
    assert_eq!(
        tokens
            .valid_access_token(&tenant, Provider::Github)
            .await
            .expect("reads"),
        Some("gho_renewed".to_string())
    );
    assert_eq!(
        tokens
            .refresh_token(&tenant, Provider::Github)
            .await
            .expect("reads"),
        Some("ghr_rotated".to_string())
    );
}
