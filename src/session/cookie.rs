use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

use super::model::SessionOptions;

/// Default name of the session cookie
pub const COOKIE_NAME: &str = "sessiongate";

/// Build the `Set-Cookie` value for a session from its options
///
/// A negative `max_age` emits the same negative `Max-Age`, which browsers treat
/// as an instruction to drop the cookie. Zero omits `Max-Age` entirely.
#[must_use]
pub fn session_cookie(name: &str, value: String, options: &SessionOptions) -> Cookie<'static> {
    let mut builder = Cookie::build(name.to_owned(), value)
        .path(options.path.clone())
        .http_only(options.http_only)
        .secure(options.secure)
        .same_site(SameSite::Lax);

    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if options.max_age != 0 {
        builder = builder.max_age(Duration::seconds(options.max_age));
    }

    builder.finish()
}

/// Cookie that clears the session on the client
#[must_use]
pub fn expired_session_cookie(name: &str, options: &SessionOptions) -> Cookie<'static> {
    let mut options = options.clone();
    if options.max_age >= 0 {
        options.max_age = -1;
    }
    session_cookie(name, String::new(), &options)
}

/// Value of the cookie `name`, if the request carries a non-empty one
#[must_use]
pub fn cookie_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.cookie(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
