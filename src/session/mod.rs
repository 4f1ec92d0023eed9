//! Session Management Module
//!
//! Server-side sessions addressed by a signed id carried in a cookie.
//!
//! # Modules
//!
//! - [`codec`] - Authenticated (optionally encrypted) value codec with key rotation
//! - [`model`] - The [`Session`] value map and its cookie options
//! - [`cookie`] - Cookie construction helpers
//! - [`store`] - The [`SessionStore`] contract
//! - [`document`] - Store backed by a document collection
//! - [`memory`] - In-process document collection with TTL expiry

pub mod codec;
pub mod cookie;
pub mod document;
pub mod memory;
pub mod model;
pub mod store;

pub use codec::{CodecError, CodecSet, KeyPair, SecureCookie};
pub use cookie::{cookie_value, expired_session_cookie, session_cookie, COOKIE_NAME};
pub use document::{DocumentCollection, DocumentSessionStore, SessionRecord};
pub use memory::MemoryCollection;
pub use model::{Session, SessionOptions, MODIFIED_KEY};
pub use store::{SessionStore, StoreError};
