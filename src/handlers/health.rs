use actix_web::{HttpResponse, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Health check endpoint
///
/// # Errors
/// Never fails; the signature matches the other handlers
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "sessiongate is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};

    #[actix_web::test]
    async fn test_health_reports_ok() {
        let app = test::init_service(App::new().route("/ping", web::get().to(health))).await;
        let req = test::TestRequest::get().uri("/ping").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.status, "ok");
    }
}
