use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use async_trait::async_trait;
use thiserror::Error;

use super::codec::CodecError;
use super::model::{Session, SessionOptions};
use crate::utils::response_builder::ResponseBuilder;

/// Errors raised while loading or persisting a session
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session: invalid session id")]
    InvalidId,
    #[error("session: invalid modified value")]
    InvalidModified,
    #[error("session: record not found")]
    NotFound,
    #[error("session: {0}")]
    Codec(#[from] CodecError),
    #[error("session backend error: {0}")]
    Backend(String),
}

impl ResponseError for StoreError {
    fn error_response(&self) -> HttpResponse {
        ResponseBuilder::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Session storage is unavailable",
        )
    }
}

/// Persistence contract for sessions
///
/// `get_session` never fails because of a missing or forged cookie; such
/// requests get a fresh session with `is_new() == true`. `save_session`
/// returns the cookie to attach to the response, and produces no cookie when
/// persistence fails.
#[async_trait(?Send)]
pub trait SessionStore: Send + Sync {
    /// Cookie options given to sessions this store creates
    fn options(&self) -> &SessionOptions;

    /// Resolve the session named `name` for this request
    ///
    /// # Errors
    ///
    /// Implementations may surface backend failures; the bundled stores degrade
    /// to a fresh session instead.
    async fn get_session(&self, req: &HttpRequest, name: &str) -> Result<Session, StoreError>;

    /// Persist `session` (or delete it when its `max_age` is negative)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend or the codec fails. No cookie is produced
    /// in that case.
    async fn save_session(&self, session: &mut Session) -> Result<Cookie<'static>, StoreError>;
}
