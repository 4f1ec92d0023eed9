//! Testing utilities for sessiongate
//!
//! Compiled for unit tests and, through the `testing` feature, for the
//! integration tests under `tests/`.
//!
//! - [`fixtures`] - Pre-built keys, tokens, sessions, stores and gates
//! - [`mock`] - A scriptable [`MockOAuthClient`] and an in-memory [`MemoryStore`]

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixtures;
pub use mock::{MemoryStore, MockOAuthClient};

/// Common test constants
pub mod constants {
    /// Cookie name used by fixtures
    pub const TEST_COOKIE_NAME: &str = "sid";

    /// Authorization endpoint of the mock provider
    pub const TEST_AUTH_URL: &str = "https://provider.example/authorize";

    /// Hash key shared by fixture stores
    pub const TEST_HASH_KEY: &[u8] = b"sessiongate-test-hash-key-0123456789abcdef";

    /// Block key shared by fixture stores
    pub const TEST_BLOCK_KEY: &[u8] = b"sessiongate-test-block-key";
}
