//! OAuth authentication module
//!
//! - [`token`] - The token pair stored in the session
//! - [`client`] - Provider client trait and its HTTP implementation
//! - [`provider`] - Login, callback, logout and expiry handling

pub mod client;
pub mod provider;
pub mod token;

pub use client::{HttpOAuthClient, OAuthClient, OAuthClientConfig, ProviderEndpoints};
pub use provider::{extract_path, AuthState, OAuth2Provider, OAuthPaths};
pub use token::{Token, TOKEN_KEY};

use thiserror::Error;

/// OAuth flow errors
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Token exchange failed: {0}")]
    Exchange(String),
    #[error("Token refresh failed: {0}")]
    Refresh(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
