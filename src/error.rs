//! # Error Handling
//!
//! Unified error taxonomy for the integration core. Request-triggered
//! operations propagate these to their caller after recording a metric; the
//! refresh sweep converts every per-item error into a failed-refresh metric
//! and continues. Nothing here is fatal to the process.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::models::TenantId;
use crate::providers::{ExchangeError, Provider, RegistryError};

#[derive(Debug, Error)]
pub enum IntegrationError {
    /// No integration configuration exists for the pair. A caller error,
    /// surfaced as a client error by the embedding layer.
    #[error("no integration configured for tenant '{tenant_id}' and provider '{provider}'")]
    NotConfigured {
        tenant_id: TenantId,
        provider: Provider,
    },

    /// CSRF state mismatch on callback. Security-relevant; logged and
    /// surfaced as a client error.
    #[error("oauth state mismatch for tenant '{tenant_id}' and provider '{provider}'")]
    InvalidState {
        tenant_id: TenantId,
        provider: Provider,
    },

    /// The provider rejected the exchange or answered with an unexpected
    /// shape. Carries the provider's error code and description.
    #[error("oauth exchange failed ({code}): {description}")]
    OAuth { code: String, description: String },

    /// A stored secret is corrupt or unreadable. Fatal for that token; the
    /// pair reads as disconnected once the error is logged.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Refresh requested for a provider without a refresh flow.
    #[error("token refresh is not supported for provider '{0}'")]
    Unsupported(Provider),

    /// No exchanger is registered for the provider.
    #[error("no exchanger registered for provider '{0}'")]
    NotRegistered(Provider),
}

impl IntegrationError {
    /// Stable machine-readable code for the embedding layer's error
    /// envelope.
    pub fn code(&self) -> &'static str {
        match self {
            IntegrationError::NotConfigured { .. } => "NOT_CONFIGURED",
            IntegrationError::InvalidState { .. } => "INVALID_STATE",
            IntegrationError::OAuth { .. } => "OAUTH_EXCHANGE_FAILED",
            IntegrationError::Crypto(_) => "CRYPTO_FAILURE",
            IntegrationError::Unsupported(_) => "REFRESH_UNSUPPORTED",
            IntegrationError::NotRegistered(_) => "PROVIDER_NOT_REGISTERED",
        }
    }
}

impl From<ExchangeError> for IntegrationError {
    fn from(error: ExchangeError) -> Self {
        match error {
            ExchangeError::Provider { code, description } => {
                IntegrationError::OAuth { code, description }
            }
            ExchangeError::Unsupported(provider) => IntegrationError::Unsupported(provider),
            ExchangeError::Endpoint { status, body } => IntegrationError::OAuth {
                code: format!("http_{}", status),
                description: body,
            },
            other => IntegrationError::OAuth {
                code: "exchange_failed".to_string(),
                description: other.to_string(),
            },
        }
    }
}

impl From<RegistryError> for IntegrationError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotRegistered(provider) => IntegrationError::NotRegistered(provider),
            other => IntegrationError::OAuth {
                code: "exchange_failed".to_string(),
                description: other.to_string(),
            },
        }
    }
}
