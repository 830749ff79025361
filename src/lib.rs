//! # Integration Core Library
//!
//! Multi-tenant OAuth integration and token lifecycle management: provider
//! catalog, at-rest token encryption, the authorization-code flow, per-pair
//! metrics, and a background refresh sweep.

pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod models;
pub mod oauth;
pub mod providers;
pub mod refresh;
pub mod repositories;
pub mod store;
pub mod telemetry;

pub use config::AppConfig;
pub use error::IntegrationError;
pub use metrics::{HealthReport, HealthStatus, MetricsLedger, MetricsSnapshot};
pub use models::{IntegrationConfig, PairKey, TenantId, TokenRecord};
pub use oauth::{ConnectionStatus, OAuthService};
pub use providers::{ExchangerRegistry, Provider, TokenExchanger, TokenGrant};
pub use refresh::{RefreshOutcome, RefreshSweeper, SweepStats};
pub use repositories::{ConfigRepository, TokenStore};
