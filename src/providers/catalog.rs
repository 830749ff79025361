//! Provider catalog
//!
//! Static, immutable metadata for every supported OAuth2 provider: endpoint
//! URLs, default scopes, and display identity. The set is closed; an unknown
//! slug is rejected at the parsing boundary and never reaches the core.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing a provider slug that is not in the catalog.
#[derive(Debug, Clone, Error)]
#[error("unknown provider '{slug}'")]
pub struct UnknownProvider {
    pub slug: String,
}

/// Supported OAuth2 providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Slack,
    Google,
    Jira,
}

impl Provider {
    /// All catalog entries, in registration order.
    pub const ALL: [Provider; 4] = [
        Provider::Github,
        Provider::Slack,
        Provider::Google,
        Provider::Jira,
    ];

    /// Stable lowercase identifier used in keys, URLs, and metric labels.
    pub fn slug(self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Slack => "slack",
            Provider::Google => "google",
            Provider::Jira => "jira",
        }
    }

    /// Human-readable provider name.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Github => "GitHub",
            Provider::Slack => "Slack",
            Provider::Google => "Google",
            Provider::Jira => "Jira",
        }
    }

    /// Authorization endpoint the tenant's administrator is redirected to.
    pub fn authorize_url(self) -> &'static str {
        match self {
            Provider::Github => "https://github.com/login/oauth/authorize",
            Provider::Slack => "https://slack.com/oauth/v2/authorize",
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Provider::Jira => "https://auth.atlassian.com/authorize",
        }
    }

    /// Token endpoint for the authorization-code and refresh grants.
    pub fn token_url(self) -> &'static str {
        match self {
            Provider::Github => "https://github.com/login/oauth/access_token",
            Provider::Slack => "https://slack.com/api/oauth.v2.access",
            Provider::Google => "https://oauth2.googleapis.com/token",
            Provider::Jira => "https://auth.atlassian.com/oauth/token",
        }
    }

    /// Scopes requested when the tenant configuration does not override them.
    pub fn default_scopes(self) -> &'static str {
        match self {
            Provider::Github => "repo read:org",
            Provider::Slack => "channels:read chat:write",
            Provider::Google => "https://www.googleapis.com/auth/calendar.readonly",
            Provider::Jira => "read:jira-work offline_access",
        }
    }

    /// Path under the public base URL where the provider redirects back.
    pub fn callback_path(self) -> &'static str {
        match self {
            Provider::Github => "/integrations/github/callback",
            Provider::Slack => "/integrations/slack/callback",
            Provider::Google => "/integrations/google/callback",
            Provider::Jira => "/integrations/jira/callback",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProvider {
                slug: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_slug_roundtrip() {
        for provider in Provider::ALL {
            let parsed: Provider = provider.slug().parse().expect("slug parses back");
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let parsed: Provider = "GitHub".parse().expect("mixed case parses");
        assert_eq!(parsed, Provider::Github);
    }

    #[test]
    fn test_unknown_slug_rejected() {
        let result = "bitbucket".parse::<Provider>();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().slug, "bitbucket");
    }

    #[test]
    fn test_catalog_urls_are_valid() {
        for provider in Provider::ALL {
            Url::parse(provider.authorize_url()).expect("authorize URL parses");
            Url::parse(provider.token_url()).expect("token URL parses");
            assert!(!provider.default_scopes().is_empty());
            assert!(provider.callback_path().starts_with('/'));
        }
    }
}
