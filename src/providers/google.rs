//! Google token exchanger
//!
//! Google's token endpoint takes credentials and an explicit `grant_type` in
//! the form body. Refresh responses do not carry a refresh token; the one
//! issued at first authorization stays valid and is reused by the caller.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::models::IntegrationConfig;
use crate::providers::exchange::{ExchangeError, TokenExchanger, TokenGrant, parse_grant_response};
use crate::providers::Provider;

#[derive(Debug, Clone)]
pub struct GoogleExchanger {
    http: reqwest::Client,
    token_url: Url,
}

impl GoogleExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: Url::parse(Provider::Google.token_url())
                .expect("catalog token URL is valid"),
        }
    }

    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }
}

#[async_trait]
impl TokenExchanger for GoogleExchanger {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn exchange_code(
        &self,
        config: &IntegrationConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        debug!(tenant_id = %config.tenant_id, "exchanging Google authorization code");

        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
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
        debug!(tenant_id = %config.tenant_id, "refreshing Google access token");

        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        parse_grant_response(response).await
    }
}
