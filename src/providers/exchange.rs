//! Token exchange seam
//!
//! Defines the capability every provider variant supplies: exchanging an
//! authorization code for tokens and refreshing an access token. Each
//! provider builds its own token-endpoint request shape, but all of them
//! speak the standard OAuth2 grant response.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::IntegrationConfig;
use crate::providers::Provider;

const MAX_ERROR_BODY_LEN: usize = 512;

/// Errors from a provider's token endpoint interaction.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The provider rejected the grant with a machine-readable error code.
    #[error("provider rejected the grant: {code}: {description}")]
    Provider { code: String, description: String },
    /// The token endpoint answered with an unexpected HTTP status.
    #[error("token endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },
    /// The response body did not match the expected grant shape.
    #[error("malformed token response: {0}")]
    Malformed(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider variant has no refresh implementation.
    #[error("token refresh is not supported for provider '{0}'")]
    Unsupported(Provider),
}

/// A successfully parsed token grant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Wire shape of the standard OAuth2 token response, shared by every
/// provider. Slack additionally wraps errors in `{"ok": false, "error": ..}`
/// with HTTP 200, which is why `ok` is modeled here.
#[derive(Debug, Deserialize)]
pub(crate) struct WireTokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    ok: Option<bool>,
    error: Option<String>,
    error_description: Option<String>,
}

impl WireTokenResponse {
    fn into_grant(self, now: DateTime<Utc>) -> Result<TokenGrant, ExchangeError> {
        if self.ok == Some(false) || (self.error.is_some() && self.access_token.is_none()) {
            return Err(ExchangeError::Provider {
                code: self.error.unwrap_or_else(|| "unknown_error".to_string()),
                description: self.error_description.unwrap_or_default(),
            });
        }

        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ExchangeError::Malformed("response carries no access_token".into()))?;

        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            token_type: self
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "bearer".to_string()),
            expires_at: self
                .expires_in
                .map(|seconds| now + Duration::seconds(seconds as i64)),
            scope: self.scope,
        })
    }
}

/// Parse a token-endpoint HTTP response into a [`TokenGrant`], mapping
/// provider error payloads onto [`ExchangeError::Provider`].
pub(crate) async fn parse_grant_response(
    response: reqwest::Response,
) -> Result<TokenGrant, ExchangeError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        if let Ok(wire) = serde_json::from_str::<WireTokenResponse>(&body)
            && let Some(code) = wire.error
        {
            return Err(ExchangeError::Provider {
                code,
                description: wire.error_description.unwrap_or_default(),
            });
        }
        return Err(ExchangeError::Endpoint {
            status: status.as_u16(),
            body: truncate_at_char_boundary(body, MAX_ERROR_BODY_LEN),
        });
    }

    let wire: WireTokenResponse =
        serde_json::from_str(&body).map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    wire.into_grant(Utc::now())
}

/// Truncate to at most `max_len` bytes without splitting a UTF-8 character.
/// Provider error pages are arbitrary text, so byte 512 may fall inside a
/// multi-byte sequence.
fn truncate_at_char_boundary(mut body: String, max_len: usize) -> String {
    if body.len() > max_len {
        let cut = (0..=max_len)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    body
}

/// Provider-specific token lifecycle capability.
///
/// One variant exists per catalog entry, selected via the
/// [`ExchangerRegistry`](crate::providers::ExchangerRegistry) dispatch table.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    fn provider(&self) -> Provider;

    /// Trade an authorization code for tokens at the provider's token
    /// endpoint.
    async fn exchange_code(
        &self,
        config: &IntegrationConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ExchangeError>;

    /// Renew an access token from a refresh token. Variants without a
    /// refresh flow return [`ExchangeError::Unsupported`].
    async fn refresh_token(
        &self,
        config: &IntegrationConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, ExchangeError>;
}
