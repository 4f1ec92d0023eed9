//! Fake collaborators for isolated tests

use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::constants::TEST_AUTH_URL;
use crate::oauth::{OAuthClient, OAuthError, Token};
use crate::session::document::new_session_id;
use crate::session::{cookie_value, session_cookie, Session, SessionOptions, SessionStore, StoreError};

/// OAuth client with scripted results; records every code and refresh token it sees
pub struct MockOAuthClient {
    exchange_result: Option<Token>,
    refresh_result: Option<Token>,
    exchanged_codes: Mutex<Vec<String>>,
    refreshed_tokens: Mutex<Vec<String>>,
}

impl Default for MockOAuthClient {
    fn default() -> Self {
        Self {
            exchange_result: None,
            refresh_result: None,
            exchanged_codes: Mutex::new(Vec::new()),
            refreshed_tokens: Mutex::new(Vec::new()),
        }
    }
}

impl MockOAuthClient {
    /// Exchanges succeed with `token`; without this they fail
    #[must_use]
    pub fn with_exchange(mut self, token: Token) -> Self {
        self.exchange_result = Some(token);
        self
    }

    /// Refreshes succeed with `token`; without this they fail
    #[must_use]
    pub fn with_refresh(mut self, token: Token) -> Self {
        self.refresh_result = Some(token);
        self
    }

    /// Codes passed to `exchange`
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn exchanged_codes(&self) -> Vec<String> {
        self.exchanged_codes.lock().unwrap().clone()
    }

    /// Refresh tokens passed to `refresh`
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn refreshed_tokens(&self) -> Vec<String> {
        self.refreshed_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl OAuthClient for MockOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        format!("{TEST_AUTH_URL}?state={}", urlencoding::encode(state))
    }

    async fn exchange(&self, code: &str) -> Result<Token, OAuthError> {
        if let Ok(mut codes) = self.exchanged_codes.lock() {
            codes.push(code.to_string());
        }
        self.exchange_result
            .clone()
            .ok_or_else(|| OAuthError::Exchange("mock exchange rejected".to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, OAuthError> {
        if let Ok(mut tokens) = self.refreshed_tokens.lock() {
            tokens.push(refresh_token.to_string());
        }
        self.refresh_result
            .clone()
            .ok_or_else(|| OAuthError::Refresh("mock refresh rejected".to_string()))
    }
}

/// Session store keeping values in memory with the raw id as cookie value
#[derive(Default)]
pub struct MemoryStore {
    options: SessionOptions,
    sessions: Mutex<HashMap<String, HashMap<String, Value>>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn with_options(options: SessionOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Make every following lookup fail with a backend error
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every following save fail with a backend error
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of stored sessions
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored values for `id`
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    #[must_use]
    pub fn values(&self, id: &str) -> Option<HashMap<String, Value>> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Seed a stored session and return its id
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned
    pub fn insert(&self, values: HashMap<String, Value>) -> String {
        let id = new_session_id();
        self.sessions.lock().unwrap().insert(id.clone(), values);
        id
    }

    fn backend_error(e: impl std::fmt::Display) -> StoreError {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait(?Send)]
impl SessionStore for MemoryStore {
    fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn get_session(&self, req: &HttpRequest, name: &str) -> Result<Session, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("lookups are disabled".to_string()));
        }
        let stored = cookie_value(req, name).and_then(|id| {
            let sessions = self.sessions.lock().ok()?;
            sessions.get(&id).cloned().map(|values| (id, values))
        });

        Ok(match stored {
            Some((id, values)) => Session::restore(name, id, values, self.options.clone()),
            None => Session::new(name, self.options.clone()),
        })
    }

    async fn save_session(&self, session: &mut Session) -> Result<Cookie<'static>, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("saves are disabled".to_string()));
        }
        let mut sessions = self.sessions.lock().map_err(Self::backend_error)?;

        if session.options.max_age < 0 {
            sessions.remove(session.id());
            session.mark_removed();
            return Ok(session_cookie(session.name(), String::new(), &session.options));
        }

        if session.id().is_empty() {
            session.assign_id(new_session_id());
        }
        sessions.insert(session.id().to_string(), session.values().clone());
        session.mark_saved();
        Ok(session_cookie(session.name(), session.id().to_string(), &session.options))
    }
}
