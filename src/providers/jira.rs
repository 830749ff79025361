//! Jira (Atlassian) token exchanger
//!
//! Atlassian's token endpoint is the odd one out: it takes a JSON body
//! instead of a form-encoded one. Refresh tokens rotate on every use when
//! the `offline_access` scope was granted.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::models::IntegrationConfig;
use crate::providers::exchange::{ExchangeError, TokenExchanger, TokenGrant, parse_grant_response};
use crate::providers::Provider;

#[derive(Debug, Clone)]
pub struct JiraExchanger {
    http: reqwest::Client,
    token_url: Url,
}

impl JiraExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: Url::parse(Provider::Jira.token_url())
                .expect("catalog token URL is valid"),
        }
    }

    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }
}

#[async_trait]
impl TokenExchanger for JiraExchanger {
    fn provider(&self) -> Provider {
        Provider::Jira
    }

    async fn exchange_code(
        &self,
        config: &IntegrationConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        debug!(tenant_id = %config.tenant_id, "exchanging Jira authorization code");

        let body = json!({
            "grant_type": "authorization_code",
            "client_id": config.client_id,
            "client_secret": config.client_secret,
            "code": code,
            "redirect_uri": redirect_uri,
        });

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&body)
            .send()
            .await?;

        parse_grant_response(response).await
    }

    async fn refresh_token(
        &self,
        config: &IntegrationConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, ExchangeError> {
        debug!(tenant_id = %config.tenant_id, "refreshing Jira access token");

        let body = json!({
            "grant_type": "refresh_token",
            "client_id": config.client_id,
            "client_secret": config.client_secret,
            "refresh_token": refresh_token,
        });

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&body)
            .send()
            .await?;

        parse_grant_response(response).await
    }
}
