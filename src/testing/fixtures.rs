//! Test fixtures providing pre-built test objects

use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use super::constants::{TEST_BLOCK_KEY, TEST_COOKIE_NAME, TEST_HASH_KEY};
use super::mock::{MemoryStore, MockOAuthClient};
use crate::middleware::SessionGate;
use crate::oauth::{OAuth2Provider, Token};
use crate::session::{
    DocumentSessionStore, KeyPair, MemoryCollection, Session, SessionOptions, SessionStore,
};
use crate::settings::{GateSettings, KeyPairSettings};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Signing and encryption keys shared by fixture stores
    #[must_use]
    pub fn key_pairs() -> Vec<KeyPair> {
        vec![KeyPair::new(TEST_HASH_KEY, Some(TEST_BLOCK_KEY.to_vec()))]
    }

    /// Cookie options that work over plain HTTP in tests
    #[must_use]
    pub fn session_options() -> SessionOptions {
        SessionOptions {
            secure: false,
            ..SessionOptions::default()
        }
    }

    /// Settings with fixed key material and an explicit provider
    #[must_use]
    pub fn settings() -> GateSettings {
        let mut settings = GateSettings::default();
        settings.session.cookie_name = TEST_COOKIE_NAME.to_string();
        settings.session.key_pairs = vec![KeyPairSettings {
            hash_key: general_purpose::STANDARD.encode(TEST_HASH_KEY),
            block_key: Some(general_purpose::STANDARD.encode(TEST_BLOCK_KEY)),
        }];
        settings.cookies.secure = false;
        settings.oauth.client_id = "test-client".to_string();
        settings.oauth.client_secret = "test-secret".to_string();
        settings
    }

    /// Token valid for an hour with no refresh token
    #[must_use]
    pub fn live_token() -> Token {
        Token::new("T", "", 3600)
    }

    /// Token that expired a minute ago and cannot be refreshed
    #[must_use]
    pub fn expired_token() -> Token {
        Token::new("T-old", "", -60)
    }

    /// Token that expired a minute ago but carries a refresh token
    #[must_use]
    pub fn refreshable_expired_token() -> Token {
        Token::new("T-old", "R", -60)
    }

    /// Fresh session holding `token`
    ///
    /// # Panics
    ///
    /// Panics if the token cannot be serialized
    #[must_use]
    pub fn session_with_token(token: &Token) -> Session {
        let mut session = Session::new(TEST_COOKIE_NAME, Self::session_options());
        token.store_in(&mut session).unwrap();
        session
    }

    /// Document-backed store over a fresh in-memory collection
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be created
    pub async fn document_store(max_age: i64) -> DocumentSessionStore<MemoryCollection> {
        DocumentSessionStore::new(MemoryCollection::new(), max_age, true, &Self::key_pairs())
            .await
            .unwrap()
            .with_options(Self::session_options())
    }

    /// In-memory store with plain-HTTP cookie options
    #[must_use]
    pub fn memory_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_options(Self::session_options()))
    }

    /// Gate over `store` with the login flow driven by `client`
    #[must_use]
    pub fn gate(store: Arc<dyn SessionStore>, client: Arc<MockOAuthClient>) -> SessionGate {
        SessionGate::new(store, TEST_COOKIE_NAME).with_provider(OAuth2Provider::new(client))
    }
}
