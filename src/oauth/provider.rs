//! OAuth2 authorization-code flow over the request session
//!
//! The provider owns three routes (login, callback, logout) and an expiry
//! check that runs on every other request passing through the session
//! middleware. The in-flight state between login and callback is the `next`
//! path, carried through the provider as the `state` parameter.

use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error, warn};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use super::client::OAuthClient;
use super::token::{Token, TOKEN_KEY};
use crate::context::RequestContext;
use crate::session::Session;
use crate::utils::logging::LoggingHelper;
use crate::utils::response_builder::ResponseBuilder;

/// Route paths owned by the login flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthPaths {
    pub login: String,
    pub logout: String,
    pub callback: String,
    /// Host-owned page users land on when login fails
    pub error: String,
}

impl Default for OAuthPaths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            logout: "/logout".to_string(),
            callback: "/oauth2callback".to_string(),
            error: "/oauth2error".to_string(),
        }
    }
}

/// Authentication state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
    Expired,
}

impl AuthState {
    #[must_use]
    pub fn of(session: &Session) -> Self {
        match Token::from_session(session) {
            None => Self::Anonymous,
            Some(token) if token.is_expired() => Self::Expired,
            Some(_) => Self::Authenticated,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FlowQuery {
    next: Option<String>,
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl FlowQuery {
    fn from_request(req: &HttpRequest) -> Self {
        web::Query::<Self>::from_query(req.query_string())
            .map(web::Query::into_inner)
            .unwrap_or_default()
    }
}

/// Reduce a `next` target to a local path
///
/// Absolute URLs keep only their path; relative references must start with `/`.
/// Anything else, including empty input, becomes `/`. Repeated leading slashes
/// are collapsed so the result can never be read as a network-path reference.
#[must_use]
pub fn extract_path(next: &str) -> String {
    let parsed = match Url::parse(next) {
        Ok(url) => Some(url),
        Err(_) if next.starts_with('/') => Url::parse("http://localhost/")
            .and_then(|base| base.join(next))
            .ok(),
        Err(_) => None,
    };

    parsed
        .map(|url| url.path().to_string())
        .filter(|path| path.starts_with('/'))
        .map(|path| format!("/{}", path.trim_start_matches(['/', '\\'])))
        .unwrap_or_else(|| "/".to_string())
}

pub struct OAuth2Provider {
    client: Arc<dyn OAuthClient>,
    paths: OAuthPaths,
}

impl OAuth2Provider {
    #[must_use]
    pub fn new(client: Arc<dyn OAuthClient>) -> Self {
        Self {
            client,
            paths: OAuthPaths::default(),
        }
    }

    #[must_use]
    pub fn with_paths(mut self, paths: OAuthPaths) -> Self {
        self.paths = paths;
        self
    }

    #[must_use]
    pub fn paths(&self) -> &OAuthPaths {
        &self.paths
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn OAuthClient> {
        &self.client
    }

    /// Handle the request if it targets one of the flow's routes
    ///
    /// Returns `None` for anything else, including non-GET requests to those paths.
    pub async fn route(&self, ctx: &mut RequestContext, req: &HttpRequest) -> Option<HttpResponse> {
        if req.method() != Method::GET {
            return None;
        }

        let path = req.path();
        if path == self.paths.login {
            Some(self.login(ctx, req))
        } else if path == self.paths.callback {
            Some(self.callback(ctx, req).await)
        } else if path == self.paths.logout {
            Some(self.logout(ctx, req))
        } else {
            None
        }
    }

    /// Send anonymous users to the provider; authenticated users go straight to `next`
    pub fn login(&self, ctx: &RequestContext, req: &HttpRequest) -> HttpResponse {
        let query = FlowQuery::from_request(req);
        let next = extract_path(query.next.as_deref().unwrap_or_default());

        if Token::from_session(&ctx.session).is_some() {
            debug!("Login requested with a token already present, redirecting to {next}");
            return ResponseBuilder::redirect(&next);
        }

        LoggingHelper::log_login_redirect(&next);
        ResponseBuilder::redirect(&self.client.authorization_url(&next))
    }

    /// Exchange the authorization code and persist the token
    pub async fn callback(&self, ctx: &mut RequestContext, req: &HttpRequest) -> HttpResponse {
        let query = FlowQuery::from_request(req);
        let next = extract_path(query.state.as_deref().unwrap_or_default());

        if let Some(reason) = query.error {
            warn!("Provider reported an error on callback: {reason}");
            return ResponseBuilder::redirect(&self.paths.error);
        }
        let Some(code) = query.code.filter(|code| !code.is_empty()) else {
            warn!("Callback received without an authorization code");
            return ResponseBuilder::redirect(&self.paths.error);
        };

        let token = match self.client.exchange(&code).await {
            Ok(token) => token,
            Err(e) => {
                LoggingHelper::log_token_exchange_failed(&e);
                return ResponseBuilder::redirect(&self.paths.error);
            }
        };
        LoggingHelper::log_token_exchange_summary(&token);

        let previous = ctx.session.clone();
        let persisted = match token.store_in(&mut ctx.session) {
            Ok(()) => ctx.save_session().await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = persisted {
            error!("Failed to persist session after login: {e}");
            ctx.session = previous;
            return ResponseBuilder::redirect(&self.paths.error);
        }

        LoggingHelper::log_session_persisted(ctx.session.id().len());
        ResponseBuilder::redirect(&next)
    }

    /// Drop the token; the session middleware persists the change
    pub fn logout(&self, ctx: &mut RequestContext, req: &HttpRequest) -> HttpResponse {
        let query = FlowQuery::from_request(req);
        let next = extract_path(query.next.as_deref().unwrap_or_default());

        if ctx.session.remove(TOKEN_KEY).is_some() {
            LoggingHelper::log_session_cleared();
        }
        ResponseBuilder::redirect(&next)
    }

    /// Renew or discard an expired token
    ///
    /// Tokens with a refresh token are renewed through the client; tokens without
    /// one, failed renewals, and undecodable entries are removed. Any change is
    /// persisted immediately.
    pub async fn check_expiry(&self, ctx: &mut RequestContext) {
        if !ctx.session.contains(TOKEN_KEY) {
            return;
        }

        match Token::from_session(&ctx.session) {
            None => {
                warn!("Discarding undecodable token from session");
                ctx.session.remove(TOKEN_KEY);
            }
            Some(token) if !token.is_expired() => return,
            Some(token) if !token.can_refresh() => {
                debug!("Token expired without a refresh token, discarding");
                ctx.session.remove(TOKEN_KEY);
            }
            Some(token) => match self.client.refresh(&token.refresh_token).await {
                Ok(renewed) => {
                    LoggingHelper::log_token_refresh(true);
                    if let Err(e) = renewed.store_in(&mut ctx.session) {
                        error!("Failed to store refreshed token: {e}");
                        ctx.session.remove(TOKEN_KEY);
                    }
                }
                Err(e) => {
                    LoggingHelper::log_token_refresh(false);
                    debug!("Token refresh failed: {e}");
                    ctx.session.remove(TOKEN_KEY);
                }
            },
        }

        if let Err(e) = ctx.save_session().await {
            warn!("Failed to persist session after expiry check: {e}");
        }
    }

    /// Redirect to login unless the session holds a live token
    #[must_use]
    pub fn require_login(&self, session: &Session, req: &HttpRequest) -> Option<HttpResponse> {
        if AuthState::of(session) == AuthState::Authenticated {
            return None;
        }

        let target = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.path(), |pq| pq.as_str());
        Some(ResponseBuilder::redirect(&format!(
            "{}?next={}",
            self.paths.login,
            urlencoding::encode(target)
        )))
    }
}
