// HTTP handlers owned by the host application
pub mod health;
pub mod pages;

pub use health::{health, HealthResponse};
pub use pages::{oauth2_error, whoami};
