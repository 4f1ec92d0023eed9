//! Per-request context
//!
//! The session middleware builds one [`RequestContext`] per request and parks it
//! in the request extensions for the duration of the downstream call. Handlers
//! reach it through the [`SessionHandle`] extractor.

use actix_web::cookie::Cookie;
use actix_web::dev::Payload;
use actix_web::error::ErrorInternalServerError;
use actix_web::{FromRequest, HttpMessage, HttpRequest, HttpResponse};
use log::warn;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::oauth::{AuthState, OAuthClient, Token, TOKEN_KEY};
use crate::render::Renderer;
use crate::session::{Session, SessionStore, StoreError};
use crate::utils::logging::LoggingHelper;

/// Session and collaborators for a single request
#[derive(Clone)]
pub struct RequestContext {
    pub session: Session,
    store: Arc<dyn SessionStore>,
    oauth_client: Option<Arc<dyn OAuthClient>>,
    renderer: Option<Arc<dyn Renderer>>,
    pending_cookie: Option<Cookie<'static>>,
}

impl RequestContext {
    #[must_use]
    pub fn new(session: Session, store: Arc<dyn SessionStore>) -> Self {
        Self {
            session,
            store,
            oauth_client: None,
            renderer: None,
            pending_cookie: None,
        }
    }

    #[must_use]
    pub fn with_oauth_client(mut self, client: Arc<dyn OAuthClient>) -> Self {
        self.oauth_client = Some(client);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn oauth_client(&self) -> Option<&Arc<dyn OAuthClient>> {
        self.oauth_client.as_ref()
    }

    #[must_use]
    pub fn renderer(&self) -> Option<&Arc<dyn Renderer>> {
        self.renderer.as_ref()
    }

    /// Cookie produced by the last successful save, not yet sent
    #[must_use]
    pub fn pending_cookie(&self) -> Option<&Cookie<'static>> {
        self.pending_cookie.as_ref()
    }

    /// Persist the session now
    ///
    /// # Errors
    ///
    /// Returns the store's error; the pending cookie is left untouched in that case.
    pub async fn save_session(&mut self) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let cookie = store.save_session(&mut self.session).await?;
        self.pending_cookie = Some(cookie);
        Ok(())
    }

    /// Save a dirty session and attach the pending cookie to `response`
    pub async fn finish<B>(&mut self, response: &mut HttpResponse<B>) {
        if self.session.is_dirty() {
            if let Err(e) = self.save_session().await {
                warn!("Failed to persist session at end of request: {e}");
            }
        }

        if let Some(cookie) = self.pending_cookie.take() {
            if let Err(e) = response.add_cookie(&cookie) {
                warn!("Failed to attach session cookie: {e}");
            }
        }
    }
}

pub(crate) type SharedContext = Rc<RefCell<RequestContext>>;

/// Extractor giving handlers access to the request's session
///
/// Borrows of the underlying context are confined to each method call.
#[derive(Clone)]
pub struct SessionHandle(SharedContext);

impl SessionHandle {
    pub(crate) fn new(shared: SharedContext) -> Self {
        Self(shared)
    }

    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0.borrow().session.get(key)
    }

    /// Store `value` under `key`; the middleware persists it after the handler returns
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON
    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), serde_json::Error> {
        self.0.borrow_mut().session.insert(key, value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().session.remove(key)
    }

    #[must_use]
    pub fn session_id(&self) -> String {
        self.0.borrow().session.id().to_string()
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.0.borrow().session.is_new()
    }

    /// Read-only view of the whole session
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.0.borrow().session)
    }

    #[must_use]
    pub fn token(&self) -> Option<Token> {
        Token::from_session(&self.0.borrow().session)
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        AuthState::of(&self.0.borrow().session)
    }

    /// Whether the session holds an unexpired token
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }

    /// Provider-supplied identity fields of a live token
    #[must_use]
    pub fn identity(&self) -> Option<HashMap<String, String>> {
        self.token()
            .filter(|token| !token.is_expired())
            .map(|token| token.extra)
    }

    /// Drop the token and mark the session for deletion
    pub fn expire(&self) {
        let mut ctx = self.0.borrow_mut();
        if ctx.session.remove(TOKEN_KEY).is_some() {
            LoggingHelper::log_session_cleared();
        }
        ctx.session.expire();
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(self.0.borrow().store())
    }

    #[must_use]
    pub fn oauth_client(&self) -> Option<Arc<dyn OAuthClient>> {
        self.0.borrow().oauth_client().cloned()
    }

    #[must_use]
    pub fn renderer(&self) -> Option<Arc<dyn Renderer>> {
        self.0.borrow().renderer().cloned()
    }

    /// Persist the session immediately instead of at the end of the request
    ///
    /// # Errors
    ///
    /// Returns the store's error
    pub async fn save(&self) -> Result<(), StoreError> {
        let (store, mut session) = {
            let ctx = self.0.borrow();
            (Arc::clone(ctx.store()), ctx.session.clone())
        };

        let cookie = store.save_session(&mut session).await?;

        let mut ctx = self.0.borrow_mut();
        ctx.session = session;
        ctx.pending_cookie = Some(cookie);
        Ok(())
    }
}

impl FromRequest for SessionHandle {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<SharedContext>()
                .cloned()
                .map(Self::new)
                .ok_or_else(|| ErrorInternalServerError("session middleware is not installed")),
        )
    }
}
