use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Reserved value key holding the bookkeeping timestamp used as the TTL anchor
pub const MODIFIED_KEY: &str = "modified";

/// Cookie emission policy for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub path: String,
    pub domain: Option<String>,
    /// Seconds to live. Negative deletes the session, zero emits a browser-session cookie.
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: 86_400 * 30,
            secure: true,
            http_only: true,
        }
    }
}

/// Server-side session state addressed by an id carried in a cookie
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    name: String,
    values: HashMap<String, Value>,
    pub options: SessionOptions,
    is_new: bool,
    dirty: bool,
}

impl Session {
    /// Create an empty, unsaved session for the cookie `name`
    #[must_use]
    pub fn new(name: &str, options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            name: name.to_string(),
            values: HashMap::new(),
            options,
            is_new: true,
            dirty: false,
        }
    }

    /// Rebuild a session from persisted state
    #[must_use]
    pub fn restore(
        name: &str,
        id: String,
        values: HashMap<String, Value>,
        options: SessionOptions,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            values,
            options,
            is_new: false,
            dirty: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw value stored under `key`
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed value stored under `key`; `None` if absent or of another shape
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Store `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON
    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.insert_raw(key, value);
        Ok(())
    }

    pub fn insert_raw(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
        self.dirty = true;
    }

    /// Remove `key`, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            self.values.clear();
            self.dirty = true;
        }
    }

    /// Mark the session for deletion on the next save
    pub fn expire(&mut self) {
        self.options.max_age = -1;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn mark_saved(&mut self) {
        self.is_new = false;
        self.dirty = false;
    }

    /// The backing record is gone; a later save starts over with a new id
    pub(crate) fn mark_removed(&mut self) {
        self.id.clear();
        self.is_new = true;
        self.dirty = false;
    }
}
