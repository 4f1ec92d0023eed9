//! OAuth2 provider client
//!
//! [`OAuthClient`] is the seam between the login flow and the identity
//! provider. [`HttpOAuthClient`] talks to a real authorization server using the
//! authorization-code grant and the refresh-token grant.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

use super::token::{Token, DEFAULT_TOKEN_LIFETIME_SECONDS};
use super::OAuthError;
use crate::utils::logging::LoggingHelper;

#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// URL the user agent is sent to, carrying `state` back to the callback
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a token
    async fn exchange(&self, code: &str) -> Result<Token, OAuthError>;

    /// Obtain a fresh token using a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<Token, OAuthError>;
}

/// Authorization and token endpoints of a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl ProviderEndpoints {
    #[must_use]
    pub fn new(auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            token_url: token_url.into(),
        }
    }

    #[must_use]
    pub fn google() -> Self {
        Self::new(
            "https://accounts.google.com/o/oauth2/auth",
            "https://accounts.google.com/o/oauth2/token",
        )
    }

    #[must_use]
    pub fn github() -> Self {
        Self::new(
            "https://github.com/login/oauth/authorize",
            "https://github.com/login/oauth/access_token",
        )
    }

    #[must_use]
    pub fn facebook() -> Self {
        Self::new(
            "https://www.facebook.com/dialog/oauth",
            "https://graph.facebook.com/oauth/access_token",
        )
    }

    #[must_use]
    pub fn linkedin() -> Self {
        Self::new(
            "https://www.linkedin.com/uas/oauth2/authorization",
            "https://www.linkedin.com/uas/oauth2/accessToken",
        )
    }

    /// Endpoints of a well-known provider by name
    #[must_use]
    pub fn preset(provider: &str) -> Option<Self> {
        match provider.to_ascii_lowercase().as_str() {
            "google" => Some(Self::google()),
            "github" => Some(Self::github()),
            "facebook" => Some(Self::facebook()),
            "linkedin" => Some(Self::linkedin()),
            _ => None,
        }
    }
}

/// Client registration with a provider
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub endpoints: ProviderEndpoints,
    pub extra_auth_params: HashMap<String, String>,
}

pub struct HttpOAuthClient {
    config: OAuthClientConfig,
    auth_url: Url,
    http_client: reqwest::Client,
}

impl HttpOAuthClient {
    /// Create a client for `config`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Configuration`] if the authorization URL is invalid
    /// or the client id is missing.
    pub fn new(config: OAuthClientConfig) -> Result<Self, OAuthError> {
        if config.client_id.is_empty() {
            return Err(OAuthError::Configuration(format!(
                "Client ID not configured for provider {}",
                config.provider
            )));
        }
        let auth_url = Url::parse(&config.endpoints.auth_url).map_err(|e| {
            OAuthError::Configuration(format!("Invalid authorization URL: {e}"))
        })?;

        Ok(Self {
            config,
            auth_url,
            http_client: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Map<String, Value>, OAuthError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        form.push(("client_secret", self.config.client_secret.as_str()));

        let response = self
            .http_client
            .post(&self.config.endpoints.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;
        LoggingHelper::log_token_response_raw(&self.config.provider, status.as_u16(), body.len());

        if !status.is_success() {
            return Err(OAuthError::InvalidResponse(format!(
                "token endpoint returned {status}"
            )));
        }

        parse_token_body(&body)
    }
}

/// Parse a token endpoint body, JSON or form-encoded
fn parse_token_body(body: &str) -> Result<Map<String, Value>, OAuthError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return Ok(map);
    }

    let map: Map<String, Value> = url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    if map.is_empty() {
        return Err(OAuthError::InvalidResponse(
            "token response is neither JSON nor form-encoded".to_string(),
        ));
    }
    Ok(map)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a [`Token`] from a parsed token endpoint response
///
/// # Errors
///
/// Returns [`OAuthError::InvalidResponse`] when the provider reported an error
/// or omitted the access token.
pub fn token_from_response(mut fields: Map<String, Value>) -> Result<Token, OAuthError> {
    if let Some(error) = fields.remove("error") {
        return Err(OAuthError::InvalidResponse(format!(
            "provider returned error '{}'",
            value_to_string(&error)
        )));
    }

    let access_token = fields
        .remove("access_token")
        .map(|v| value_to_string(&v))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidResponse("missing access_token".to_string()))?;
    let token_type = fields
        .remove("token_type")
        .map_or_else(|| "Bearer".to_string(), |v| value_to_string(&v));
    let refresh_token = fields
        .remove("refresh_token")
        .map(|v| value_to_string(&v))
        .unwrap_or_default();

    // Facebook reports the lifetime as `expires`
    let expires_in = fields
        .remove("expires_in")
        .or_else(|| fields.remove("expires"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .filter(|seconds| *seconds > 0)
        .map_or(DEFAULT_TOKEN_LIFETIME_SECONDS, |seconds| seconds.min(i64::from(u32::MAX)));

    Ok(Token {
        access_token,
        token_type,
        refresh_token,
        expiry: Utc::now() + Duration::seconds(expires_in),
        extra: fields
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
    })
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_url)
                .append_pair("response_type", "code");
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            query.append_pair("state", state);
            for (key, value) in &self.config.extra_auth_params {
                query.append_pair(key, value);
            }
        }
        LoggingHelper::log_oauth_url_built(&self.config.provider, &self.config.scopes);
        url.to_string()
    }

    async fn exchange(&self, code: &str) -> Result<Token, OAuthError> {
        LoggingHelper::log_token_exchange_start(&self.config.provider);
        let fields = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;
        token_from_response(fields).map_err(|e| OAuthError::Exchange(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, OAuthError> {
        let fields = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(|e| OAuthError::Refresh(e.to_string()))?;
        let mut token =
            token_from_response(fields).map_err(|e| OAuthError::Refresh(e.to_string()))?;

        // Providers may omit the refresh token when it is unchanged
        if token.refresh_token.is_empty() {
            token.refresh_token = refresh_token.to_string();
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> OAuthClientConfig {
        OAuthClientConfig {
            provider: "google".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_url: "http://localhost:8080/oauth2callback".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            endpoints: ProviderEndpoints::google(),
            extra_auth_params: HashMap::from([("access_type".to_string(), "offline".to_string())]),
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_authorization_url_carries_state_and_registration() {
        let client = HttpOAuthClient::new(config()).unwrap();
        let url = Url::parse(&client.authorization_url("/dashboard")).unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(pairs.get("scope").map(String::as_str), Some("openid email"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("/dashboard"));
        assert_eq!(pairs.get("access_type").map(String::as_str), Some("offline"));
        assert!(!pairs.contains_key("client_secret"));
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let mut missing_id = config();
        missing_id.client_id.clear();
        assert!(matches!(
            HttpOAuthClient::new(missing_id),
            Err(OAuthError::Configuration(_))
        ));

        let mut bad_url = config();
        bad_url.endpoints.auth_url = "not a url".to_string();
        assert!(matches!(
            HttpOAuthClient::new(bad_url),
            Err(OAuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_presets() {
        assert_eq!(ProviderEndpoints::preset("GitHub"), Some(ProviderEndpoints::github()));
        assert!(ProviderEndpoints::preset("facebook").is_some());
        assert!(ProviderEndpoints::preset("linkedin").is_some());
        assert_eq!(ProviderEndpoints::preset("custom"), None);
    }

    #[test]
    fn test_token_from_json_response() {
        let token = token_from_response(object(json!({
            "access_token": "T",
            "token_type": "Bearer",
            "refresh_token": "R",
            "expires_in": 120,
            "id_token": "header.payload.sig"
        })))
        .unwrap();

        assert_eq!(token.access_token, "T");
        assert_eq!(token.refresh_token, "R");
        assert_eq!(token.extra.get("id_token").map(String::as_str), Some("header.payload.sig"));
        let remaining = token.expiry - Utc::now();
        assert!(remaining.num_seconds() > 100 && remaining.num_seconds() <= 120);
    }

    #[test]
    fn test_missing_expiry_defaults_to_one_hour() {
        let token = token_from_response(object(json!({"access_token": "T"}))).unwrap();
        let remaining = token.expiry - Utc::now();
        assert!(remaining.num_seconds() > DEFAULT_TOKEN_LIFETIME_SECONDS - 10);
        assert_eq!(token.token_type, "Bearer");
        assert!(token.refresh_token.is_empty());
    }

    #[test]
    fn test_form_encoded_response() {
        let fields = parse_token_body("access_token=T&expires=3600&scope=email").unwrap();
        let token = token_from_response(fields).unwrap();
        assert_eq!(token.access_token, "T");
        assert_eq!(token.extra.get("scope").map(String::as_str), Some("email"));
    }

    #[test]
    fn test_error_response_is_rejected() {
        let result = token_from_response(object(json!({"error": "bad_verification_code"})));
        assert!(matches!(result, Err(OAuthError::InvalidResponse(_))));

        let result = token_from_response(object(json!({"token_type": "Bearer"})));
        assert!(matches!(result, Err(OAuthError::InvalidResponse(_))));
    }
}
