use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::context::SessionHandle;
use crate::middleware::SessionGate;
use crate::oauth::{AuthState, OAuthPaths};
use crate::render::{Renderer, TemplateRenderer};

/// Template rendered by [`oauth2_error`]
pub const ERROR_TEMPLATE: &str = "oauth2error";

const DEFAULT_ERROR_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{{title}}</title>
</head>
<body>
    <h1>{{title}}</h1>
    <p>{{message}}</p>
    <p><a href="{{login_path}}">Try again</a></p>
</body>
</html>
"#;

fn render_page(renderer: Option<&dyn Renderer>, template: &str, data: &HashMap<String, String>) -> String {
    if let Some(renderer) = renderer {
        match renderer.render(template, data) {
            Ok(html) => return html,
            Err(e) => debug!("Falling back to built-in page: {e}"),
        }
    }

    TemplateRenderer::new()
        .with_template(template, DEFAULT_ERROR_PAGE)
        .render(template, data)
        .unwrap_or_else(|_| data.get("message").cloned().unwrap_or_default())
}

/// Landing page after a failed login; provider details are not exposed
pub async fn oauth2_error(session: SessionHandle, gate: web::Data<SessionGate>) -> HttpResponse {
    let login_path = gate
        .provider()
        .map_or_else(|| OAuthPaths::default().login, |p| p.paths().login.clone());

    let data = HashMap::from([
        ("title".to_string(), "Sign-in failed".to_string()),
        (
            "message".to_string(),
            "We could not complete the sign-in with your identity provider.".to_string(),
        ),
        ("login_path".to_string(), login_path),
    ]);

    let renderer = session.renderer();
    let body = render_page(renderer.as_deref(), ERROR_TEMPLATE, &data);
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub authenticated: bool,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub identity: HashMap<String, String>,
}

/// Identity carried by the current session
pub async fn whoami(session: SessionHandle) -> HttpResponse {
    let token = session.token();
    HttpResponse::Ok().json(WhoAmIResponse {
        authenticated: session.is_authenticated(),
        expired: session.auth_state() == AuthState::Expired,
        expires_at: token.as_ref().map(|t| t.expiry),
        identity: session.identity().unwrap_or_default(),
    })
}
