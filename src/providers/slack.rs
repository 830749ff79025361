//! Slack token exchanger
//!
//! Slack's `oauth.v2.access` endpoint authenticates the client via HTTP
//! Basic auth and signals failures inside a 200 response as
//! `{"ok": false, "error": ...}`. Token rotation (when enabled on the Slack
//! app) issues a new refresh token on every refresh.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::models::IntegrationConfig;
use crate::providers::exchange::{ExchangeError, TokenExchanger, TokenGrant, parse_grant_response};
use crate::providers::Provider;

#[derive(Debug, Clone)]
pub struct SlackExchanger {
    http: reqwest::Client,
    token_url: Url,
}

impl SlackExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: Url::parse(Provider::Slack.token_url())
                .expect("catalog token URL is valid"),
        }
    }

    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }
}

#[async_trait]
impl TokenExchanger for SlackExchanger {
    fn provider(&self) -> Provider {
        Provider::Slack
    }

    async fn exchange_code(
        &self,
        config: &IntegrationConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        debug!(tenant_id = %config.tenant_id, "exchanging Slack authorization code");

        let params = [("code", code), ("redirect_uri", redirect_uri)];

        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&config.client_id, Some(&config.client_secret))
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
        debug!(tenant_id = %config.tenant_id, "refreshing Slack access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&params)
            .send()
            .await?;

        parse_grant_response(response).await
    }
}
