#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the sessiongate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod context;
pub mod handlers;
pub mod middleware;
pub mod oauth;
pub mod render;
pub mod session;
pub mod settings;
pub mod utils;

// Testing utilities - available for unit tests and integration tests with feature flag
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use context::{RequestContext, SessionHandle};
pub use handlers::{health, oauth2_error, whoami};
pub use middleware::{login_required, session_middleware, SessionGate};
pub use oauth::{OAuth2Provider, OAuthClient, Token};
pub use session::{DocumentSessionStore, MemoryCollection, Session, SessionStore};
pub use settings::GateSettings;
