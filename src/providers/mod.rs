//! Providers module
//!
//! The provider catalog, the token exchange seam, and one exchanger per
//! supported provider, selected through the [`ExchangerRegistry`].

pub mod catalog;
pub mod exchange;
pub mod github;
pub mod google;
pub mod jira;
pub mod registry;
pub mod slack;

pub use catalog::{Provider, UnknownProvider};
pub use exchange::{ExchangeError, TokenExchanger, TokenGrant};
pub use github::GithubExchanger;
pub use google::GoogleExchanger;
pub use jira::JiraExchanger;
pub use registry::{ExchangerRegistry, RegistryError};
pub use slack::SlackExchanger;
