//! GitHub token exchanger
//!
//! GitHub's token endpoint takes the client credentials in the form body and
//! answers with JSON only when asked via the `Accept` header. GitHub Apps
//! issue expiring access tokens with rotating refresh tokens.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::models::IntegrationConfig;
use crate::providers::exchange::{ExchangeError, TokenExchanger, TokenGrant, parse_grant_response};
use crate::providers::Provider;

#[derive(Debug, Clone)]
pub struct GithubExchanger {
    http: reqwest::Client,
    token_url: Url,
}

impl GithubExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: Url::parse(Provider::Github.token_url())
                .expect("catalog token URL is valid"),
        }
    }

    /// Point the exchanger at a non-default token endpoint (GitHub
    /// Enterprise hosts, stub servers in tests).
    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }
}

#[async_trait]
impl TokenExchanger for GithubExchanger {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    async fn exchange_code(
        &self,
        config: &IntegrationConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        debug!(tenant_id = %config.tenant_id, "exchanging GitHub authorization code");

        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        parse_grant_response(response).await
    }

    async fn refresh_token(
        &self,
        config: &IntegrationConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        debug!(tenant_id = %config.tenant_id, "refreshing GitHub access token");

        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        parse_grant_response(response).await
    }
}
