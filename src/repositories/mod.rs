//! Repositories over the generic keyed store.

pub mod config;
pub mod token;

pub use config::ConfigRepository;
pub use token::TokenStore;
