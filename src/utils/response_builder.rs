use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Create a `302 Found` redirect
    #[must_use]
    pub fn redirect(location: &str) -> HttpResponse {
        HttpResponse::Found()
            .append_header((header::LOCATION, location))
            .finish()
    }

    /// Create a JSON error body in the shape `{"error", "message"}`
    #[must_use]
    pub fn json_error(status: StatusCode, error: &str, message: &str) -> HttpResponse {
        HttpResponse::build(status).json(serde_json::json!({
            "error": error,
            "message": message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_is_302_with_location() {
        let response = ResponseBuilder::redirect("/next");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/next");
    }

    #[test]
    fn test_json_error_status() {
        let response = ResponseBuilder::json_error(StatusCode::NOT_FOUND, "not_found", "gone");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
