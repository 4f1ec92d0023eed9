//! Session store backed by a document collection
//!
//! The cookie carries only the codec-encoded session id. Values live in the
//! collection as `{_id, data, modified}` where `data` is the codec-encoded value
//! map and `modified` anchors the collection's TTL expiry.

use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::codec::{CodecSet, KeyPair};
use super::cookie::{cookie_value, session_cookie};
use super::model::{Session, SessionOptions, MODIFIED_KEY};
use super::store::{SessionStore, StoreError};

/// Persisted form of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub data: String,
    pub modified: DateTime<Utc>,
}

/// Minimal driver surface the session store needs from a document database
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn upsert_by_id(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Remove the record, returning whether one existed
    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;

    /// Ensure records are removed in the background once `field` is older than `max_age`
    async fn ensure_ttl_index(&self, field: &str, max_age: Duration) -> Result<(), StoreError>;
}

/// Generate a new session id (32 lowercase hex characters)
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Whether `id` has the shape produced by [`new_session_id`]
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == 32
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub struct DocumentSessionStore<C> {
    collection: C,
    codecs: CodecSet,
    record_codecs: CodecSet,
    options: SessionOptions,
}

impl<C: DocumentCollection> DocumentSessionStore<C> {
    /// Create a store over `collection`
    ///
    /// When `ensure_ttl` is set and `max_age` is positive, a TTL index on
    /// `modified` is requested from the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL index cannot be created.
    pub async fn new(
        collection: C,
        max_age: i64,
        ensure_ttl: bool,
        key_pairs: &[KeyPair],
    ) -> Result<Self, StoreError> {
        if ensure_ttl && max_age > 0 {
            let ttl = Duration::from_secs(u64::try_from(max_age).unwrap_or_default());
            collection.ensure_ttl_index(MODIFIED_KEY, ttl).await?;
            debug!("Ensured TTL index on '{MODIFIED_KEY}' with max age {max_age}s");
        }

        let codecs = CodecSet::from_key_pairs(key_pairs).with_max_age(max_age.max(0));
        let record_codecs = codecs.clone().with_max_length(0);

        Ok(Self {
            collection,
            codecs,
            record_codecs,
            options: SessionOptions {
                max_age,
                ..SessionOptions::default()
            },
        })
    }

    /// Replace the cookie options handed to new sessions; `max_age` is kept
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        let max_age = self.options.max_age;
        self.options = SessionOptions { max_age, ..options };
        self
    }

    #[must_use]
    pub fn collection(&self) -> &C {
        &self.collection
    }

    #[must_use]
    pub fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Load and authenticate the values stored for `id`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] for malformed ids, [`StoreError::NotFound`]
    /// when no record exists, and codec or backend errors otherwise. Partially
    /// decoded data is never returned.
    pub async fn load(&self, name: &str, id: &str) -> Result<HashMap<String, Value>, StoreError> {
        if !is_valid_session_id(id) {
            return Err(StoreError::InvalidId);
        }

        let record = self
            .collection
            .find_by_id(id)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(self.record_codecs.decode(name, &record.data)?)
    }

    async fn upsert(&self, session: &Session) -> Result<(), StoreError> {
        if !is_valid_session_id(session.id()) {
            return Err(StoreError::InvalidId);
        }

        let modified = match session.get_raw(MODIFIED_KEY) {
            Some(value) => serde_json::from_value::<DateTime<Utc>>(value.clone())
                .map_err(|_| StoreError::InvalidModified)?,
            None => Utc::now(),
        };

        let data = self.record_codecs.encode(session.name(), session.values())?;

        self.collection
            .upsert_by_id(SessionRecord {
                id: session.id().to_string(),
                data,
                modified,
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Ok(());
        }
        if !is_valid_session_id(id) {
            return Err(StoreError::InvalidId);
        }

        if !self.collection.delete_by_id(id).await? {
            debug!("Session record {id} was already gone");
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl<C: DocumentCollection> SessionStore for DocumentSessionStore<C> {
    fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn get_session(&self, req: &HttpRequest, name: &str) -> Result<Session, StoreError> {
        let fresh = Session::new(name, self.options.clone());

        let Some(cookie) = cookie_value(req, name) else {
            return Ok(fresh);
        };

        let id: String = match self.codecs.decode(name, &cookie) {
            Ok(id) => id,
            Err(e) => {
                debug!("Ignoring session cookie '{name}': {e}");
                return Ok(fresh);
            }
        };

        match self.load(name, &id).await {
            Ok(values) => Ok(Session::restore(name, id, values, self.options.clone())),
            Err(e) => {
                warn!("Failed to load session record, starting a fresh session: {e}");
                Ok(fresh)
            }
        }
    }

    async fn save_session(&self, session: &mut Session) -> Result<Cookie<'static>, StoreError> {
        if session.options.max_age < 0 {
            self.delete(session.id()).await?;
            session.mark_removed();
            return Ok(session_cookie(session.name(), String::new(), &session.options));
        }

        if session.id().is_empty() {
            session.assign_id(new_session_id());
        }

        self.upsert(session).await?;

        let encoded = self.codecs.encode(session.name(), session.id())?;
        session.mark_saved();
        Ok(session_cookie(session.name(), encoded, &session.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::MemoryCollection;
    use actix_web::test::TestRequest;
    use serde_json::json;

    const NAME: &str = "sid";

    fn keys() -> Vec<KeyPair> {
        vec![KeyPair::new(
            b"test-hash-key".to_vec(),
            Some(b"test-block-key".to_vec()),
        )]
    }

    async fn store(max_age: i64, ensure_ttl: bool) -> DocumentSessionStore<MemoryCollection> {
        DocumentSessionStore::new(MemoryCollection::new(), max_age, ensure_ttl, &keys())
            .await
            .unwrap()
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        assert!(is_valid_session_id(&id));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("zz"));
        assert!(!is_valid_session_id(&id.to_uppercase()));
        assert_ne!(new_session_id(), new_session_id());
    }

    #[actix_web::test]
    async fn test_request_without_cookie_gets_fresh_session() {
        let store = store(3600, false).await;
        let req = TestRequest::default().to_http_request();

        let session = store.get_session(&req, NAME).await.unwrap();
        assert!(session.is_new());
        assert!(session.values().is_empty());
        assert!(session.id().is_empty());
    }

    #[actix_web::test]
    async fn test_forged_cookie_gets_fresh_session() {
        let store = store(3600, false).await;
        let req = TestRequest::default()
            .cookie(Cookie::new(NAME, "forged-value"))
            .to_http_request();

        let session = store.get_session(&req, NAME).await.unwrap();
        assert!(session.is_new());
    }

    #[actix_web::test]
    async fn test_save_then_load_roundtrip() {
        let store = store(3600, false).await;
        let mut session = Session::new(NAME, store.options().clone());
        session.insert("user", json!({"name": "ada"})).unwrap();

        let cookie = store.save_session(&mut session).await.unwrap();
        assert!(is_valid_session_id(session.id()));
        assert!(!session.is_dirty());
        assert!(!session.is_new());
        assert_eq!(cookie.name(), NAME);
        assert!(!cookie.value().is_empty());

        let req = TestRequest::default().cookie(cookie).to_http_request();
        let loaded = store.get_session(&req, NAME).await.unwrap();
        assert!(!loaded.is_new());
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.get_raw("user"), Some(&json!({"name": "ada"})));
    }

    #[actix_web::test]
    async fn test_save_reuses_existing_id() {
        let store = store(3600, false).await;
        let mut session = Session::new(NAME, store.options().clone());
        store.save_session(&mut session).await.unwrap();
        let first_id = session.id().to_string();

        session.insert("k", 1).unwrap();
        store.save_session(&mut session).await.unwrap();
        assert_eq!(session.id(), first_id);
        assert_eq!(store.collection().len().await, 1);
    }

    #[actix_web::test]
    async fn test_negative_max_age_deletes_record_and_clears_cookie() {
        let store = store(3600, false).await;
        let mut session = Session::new(NAME, store.options().clone());
        session.insert("k", "v").unwrap();
        store.save_session(&mut session).await.unwrap();
        let id = session.id().to_string();
        assert!(store.collection().find_by_id(&id).await.unwrap().is_some());

        session.options.max_age = -1;
        let cookie = store.save_session(&mut session).await.unwrap();

        assert!(store.collection().find_by_id(&id).await.unwrap().is_none());
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age().unwrap().whole_seconds(), -1);
    }

    #[actix_web::test]
    async fn test_deleting_missing_record_is_not_an_error() {
        let store = store(3600, false).await;
        let mut session = Session::restore(
            NAME,
            new_session_id(),
            HashMap::new(),
            store.options().clone(),
        );
        session.expire();
        assert!(store.save_session(&mut session).await.is_ok());
    }

    #[actix_web::test]
    async fn test_modified_value_is_used_as_ttl_anchor() {
        let store = store(3600, false).await;
        let anchor = Utc::now() - chrono::Duration::minutes(5);
        let mut session = Session::new(NAME, store.options().clone());
        session.insert(MODIFIED_KEY, anchor).unwrap();
        store.save_session(&mut session).await.unwrap();

        let record = store
            .collection()
            .find_by_id(session.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.modified.timestamp(), anchor.timestamp());
    }

    #[actix_web::test]
    async fn test_mistyped_modified_value_aborts_save() {
        let store = store(3600, false).await;
        let mut session = Session::new(NAME, store.options().clone());
        session.insert(MODIFIED_KEY, 42).unwrap();

        let result = store.save_session(&mut session).await;
        assert!(matches!(result, Err(StoreError::InvalidModified)));
        assert!(store.collection().is_empty().await);
        assert!(session.is_dirty());
    }

    #[actix_web::test]
    async fn test_load_rejects_malformed_id() {
        let store = store(3600, false).await;
        assert!(matches!(
            store.load(NAME, "../etc/passwd").await,
            Err(StoreError::InvalidId)
        ));
        assert!(matches!(
            store.load(NAME, &new_session_id()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[actix_web::test]
    async fn test_load_rejects_tampered_record() {
        let store = store(3600, false).await;
        let mut session = Session::new(NAME, store.options().clone());
        session.insert("k", "v").unwrap();
        store.save_session(&mut session).await.unwrap();

        let mut record = store
            .collection()
            .find_by_id(session.id())
            .await
            .unwrap()
            .unwrap();
        record.data.push('A');
        store.collection().upsert_by_id(record).await.unwrap();

        assert!(matches!(
            store.load(NAME, session.id()).await,
            Err(StoreError::Codec(_))
        ));
    }

    #[actix_web::test]
    async fn test_ttl_index_requested_only_when_enabled() {
        let with_ttl = store(600, true).await;
        assert_eq!(
            with_ttl.collection().ttl_index().await,
            Some((MODIFIED_KEY.to_string(), Duration::from_secs(600)))
        );

        let without_ttl = store(600, false).await;
        assert_eq!(without_ttl.collection().ttl_index().await, None);
    }

    #[actix_web::test]
    async fn test_expired_record_unreachable_after_purge() {
        let store = store(60, true).await;
        let mut session = Session::new(NAME, store.options().clone());
        session
            .insert(MODIFIED_KEY, Utc::now() - chrono::Duration::seconds(120))
            .unwrap();
        store.save_session(&mut session).await.unwrap();
        assert!(store.load(NAME, session.id()).await.is_ok());

        let purged = store.collection().purge_expired().await;
        assert_eq!(purged, 1);
        assert!(matches!(
            store.load(NAME, session.id()).await,
            Err(StoreError::NotFound)
        ));
    }
}
