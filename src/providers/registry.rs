//! Exchanger registry
//!
//! Tagged-variant dispatch table from [`Provider`] to its
//! [`TokenExchanger`]. Built once at startup from the application
//! configuration; tests swap in stub exchangers via [`register`].
//!
//! [`register`]: ExchangerRegistry::register

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::AppConfig;
use crate::providers::exchange::TokenExchanger;
use crate::providers::{
    GithubExchanger, GoogleExchanger, JiraExchanger, Provider, SlackExchanger,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no exchanger registered for provider '{0}'")]
    NotRegistered(Provider),
    #[error("invalid token endpoint override for provider '{provider}': {url}")]
    InvalidOverride { provider: Provider, url: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Clone, Default)]
pub struct ExchangerRegistry {
    exchangers: HashMap<Provider, Arc<dyn TokenExchanger>>,
}

impl ExchangerRegistry {
    /// An empty registry; useful for tests that register stubs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the registry with every catalog provider, applying token
    /// endpoint overrides and the outbound HTTP timeout from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()?;

        let mut registry = Self::empty();

        let mut github = GithubExchanger::new(http.clone());
        if let Some(url) = &config.github_token_url {
            github = github.with_token_url(parse_override(Provider::Github, url)?);
        }
        registry.register(Arc::new(github));

        let mut slack = SlackExchanger::new(http.clone());
        if let Some(url) = &config.slack_token_url {
            slack = slack.with_token_url(parse_override(Provider::Slack, url)?);
        }
        registry.register(Arc::new(slack));

        let mut google = GoogleExchanger::new(http.clone());
        if let Some(url) = &config.google_token_url {
            google = google.with_token_url(parse_override(Provider::Google, url)?);
        }
        registry.register(Arc::new(google));

        let mut jira = JiraExchanger::new(http);
        if let Some(url) = &config.jira_token_url {
            jira = jira.with_token_url(parse_override(Provider::Jira, url)?);
        }
        registry.register(Arc::new(jira));

        Ok(registry)
    }

    /// Register an exchanger, replacing any previous one for its provider.
    pub fn register(&mut self, exchanger: Arc<dyn TokenExchanger>) {
        self.exchangers.insert(exchanger.provider(), exchanger);
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn TokenExchanger>, RegistryError> {
        self.exchangers
            .get(&provider)
            .cloned()
            .ok_or(RegistryError::NotRegistered(provider))
    }
}

fn parse_override(provider: Provider, url: &str) -> Result<Url, RegistryError> {
    Url::parse(url).map_err(|_| RegistryError::InvalidOverride {
        provider,
        url: url.to_string(),
    })
}
