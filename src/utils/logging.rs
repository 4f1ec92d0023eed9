// Centralized logging for the login flow; token values and keys are never logged
use log::{debug, info, warn};

use crate::oauth::{OAuthError, Token};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a redirect to the provider's authorization endpoint
    pub fn log_login_redirect(next: &str) {
        info!("🔐 Redirecting to OAuth provider (next: {next})");
    }

    /// Log OAuth URL building
    pub fn log_oauth_url_built(provider: &str, scopes: &[String]) {
        debug!("🔍 Built {provider} OAuth URL with scopes: {}", scopes.join(" "));
    }

    /// Log token exchange start
    pub fn log_token_exchange_start(provider: &str) {
        info!("🔄 Exchanging authorization code for tokens with {provider}");
    }

    /// Log the shape of a token endpoint response
    pub fn log_token_response_raw(provider: &str, status: u16, body_length: usize) {
        debug!("{provider} token endpoint answered {status} ({body_length} bytes)");
    }

    /// Log token exchange summary
    pub fn log_token_exchange_summary(token: &Token) {
        info!(
            "🔍 Token exchange summary: token_type={}, refresh_token={}, expires_at={}, extra_fields={}",
            token.token_type,
            if token.can_refresh() { "present" } else { "missing" },
            token.expiry.to_rfc3339(),
            token.extra.len()
        );
    }

    pub fn log_token_exchange_failed(error: &OAuthError) {
        warn!("❌ OAuth token exchange failed: {error}");
    }

    pub fn log_token_refresh(success: bool) {
        if success {
            info!("🔄 Refreshed expired OAuth token");
        } else {
            warn!("❌ OAuth token refresh failed, discarding token");
        }
    }

    /// Log session persistence after login
    pub fn log_session_persisted(id_length: usize) {
        info!("✅ Session persisted after login (id length: {id_length})");
    }

    pub fn log_session_cleared() {
        info!("👋 OAuth token removed from session");
    }

    /// Log store initialisation at startup
    pub fn log_store_initialized(collection: &str, max_age: i64, key_count: usize) {
        info!(
            "🗄️  Session store ready: collection={collection}, max_age={max_age}s, keys={key_count}"
        );
    }
}
