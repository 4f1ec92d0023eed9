use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::oauth::{OAuthClientConfig, OAuthPaths, ProviderEndpoints};
use crate::session::{KeyPair, SessionOptions, COOKIE_NAME};
use crate::utils::crypto::generate_secret;

/// Environment variable naming a directory with an overriding `Settings.toml`
pub const SECRETS_DIR_ENV: &str = "SESSIONGATE_SECRETS_DIR";

/// Length in bytes of generated hash keys
const GENERATED_HASH_KEY_LENGTH: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GateSettings {
    pub application: ApplicationSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub oauth: OAuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Folder with HTML templates; pages fall back to built-in markup when absent
    pub templates_folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub cookie_name: String,
    /// Name of the backing document collection; drivers for external databases
    /// open this collection, the in-process collection only reports it at startup
    pub collection: String,
    /// Negative deletes sessions on save, zero issues browser-session cookies
    pub max_age_seconds: i64,
    pub ensure_ttl: bool,
    /// How often expired records are swept from the collection
    pub ttl_sweep_seconds: u64,
    /// Base64 key material, newest first
    pub key_pairs: Vec<KeyPairSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyPairSettings {
    pub hash_key: String,
    pub block_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub enabled: bool,
    /// Preset name (google, github, facebook, linkedin) or any name with explicit endpoints
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub extra_auth_params: HashMap<String, String>,
    pub login_path: String,
    pub logout_path: String,
    pub callback_path: String,
    pub error_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            templates_folder: "templates".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: COOKIE_NAME.to_string(),
            collection: "sessions".to_string(),
            max_age_seconds: 86_400 * 30,
            ensure_ttl: true,
            ttl_sweep_seconds: 60,
            key_pairs: Vec::new(), // Generated if empty
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            path: options.path,
            domain: options.domain,
            secure: options.secure,
            http_only: options.http_only,
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        let paths = OAuthPaths::default();
        Self {
            enabled: true,
            provider: "google".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://localhost:8080/oauth2callback".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string(), "profile".to_string()],
            auth_url: None,
            token_url: None,
            extra_auth_params: HashMap::new(),
            login_path: paths.login,
            logout_path: paths.logout,
            callback_path: paths.callback,
            error_path: paths.error,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl GateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Priority, highest first: environment variables, `Settings.toml` in
    /// `SESSIONGATE_SECRETS_DIR`, `Settings.toml` in the working directory,
    /// defaults. A `.env` file is read into the environment first, and the
    /// logger is initialised once settings are known.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    pub fn load() -> Result<Self> {
        Self::load_env_file(Path::new(".env"));

        let secrets_dir = std::env::var(SECRETS_DIR_ENV).ok().map(PathBuf::from);
        let mut settings =
            Self::load_base_settings(Path::new("Settings.toml"), secrets_dir.as_deref())?;
        settings.apply_env_overrides();
        settings.init_logging();

        Ok(settings)
    }

    /// Read `base` and then `secrets_dir/Settings.toml`; the later file replaces the earlier
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed
    pub fn load_base_settings(base: &Path, secrets_dir: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        if base.exists() {
            settings = Self::from_file(base)?;
            println!("✓ Loaded base settings from {}", base.display());
        }

        if let Some(dir) = secrets_dir {
            let secrets_path = dir.join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ {SECRETS_DIR_ENV} set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        basic_toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply environment variable overrides, then fill in missing key material
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.application.host = host;
        }
        apply_parsed_env_override("PORT", &mut self.application.port);

        if let Ok(name) = std::env::var("SESSION_COOKIE_NAME") {
            if !name.is_empty() {
                self.session.cookie_name = name;
            }
        }
        apply_parsed_env_override("SESSION_MAX_AGE", &mut self.session.max_age_seconds);
        self.apply_key_env_overrides();

        apply_parsed_env_override("COOKIE_SECURE", &mut self.cookies.secure);

        if let Ok(client_id) = std::env::var("OAUTH_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = client_secret;
        }
        if let Ok(redirect_url) = std::env::var("OAUTH_REDIRECT_URL") {
            self.oauth.redirect_url = redirect_url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    fn apply_key_env_overrides(&mut self) {
        let hash_key = std::env::var("SESSION_HASH_KEY").ok().filter(|k| !k.is_empty());
        let block_key = std::env::var("SESSION_BLOCK_KEY").ok().filter(|k| !k.is_empty());

        if (hash_key.is_some() || block_key.is_some()) && self.session.key_pairs.is_empty() {
            self.session.key_pairs.push(KeyPairSettings::default());
        }
        if let Some(primary) = self.session.key_pairs.first_mut() {
            if let Some(hash_key) = hash_key {
                primary.hash_key = hash_key;
            }
            if block_key.is_some() {
                primary.block_key = block_key;
            }
        }

        let needs_generated_key = self
            .session
            .key_pairs
            .first()
            .is_none_or(|primary| primary.hash_key.is_empty());
        if needs_generated_key {
            let generated = generate_secret(GENERATED_HASH_KEY_LENGTH);
            match self.session.key_pairs.first_mut() {
                Some(primary) => primary.hash_key = generated,
                None => self.session.key_pairs.push(KeyPairSettings {
                    hash_key: generated,
                    block_key: None,
                }),
            }
            warn_about_generated_key();
        }
    }

    /// Initialise `env_logger` with the configured level unless `RUST_LOG` says otherwise
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.logging.level.as_str());
        if env_logger::Builder::from_env(env).try_init().is_err() {
            debug!("Logger already initialised");
        }
    }

    /// Load environment variables from a `.env` file, if present
    pub fn load_env_file(path: &Path) {
        if let Ok(contents) = fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Decode the configured key material
    ///
    /// # Errors
    ///
    /// Returns an error if a key is not valid base64 or no key pair is configured
    pub fn key_pairs(&self) -> Result<Vec<KeyPair>> {
        if self.session.key_pairs.is_empty() {
            anyhow::bail!("No session key pairs configured");
        }

        self.session
            .key_pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| {
                let hash_key = general_purpose::STANDARD
                    .decode(&pair.hash_key)
                    .with_context(|| format!("Invalid base64 in session hash key #{index}"))?;
                let block_key = pair
                    .block_key
                    .as_deref()
                    .filter(|key| !key.is_empty())
                    .map(|key| general_purpose::STANDARD.decode(key))
                    .transpose()
                    .with_context(|| format!("Invalid base64 in session block key #{index}"))?;
                Ok(KeyPair::new(hash_key, block_key))
            })
            .collect()
    }

    /// Cookie options for new sessions
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            path: self.cookies.path.clone(),
            domain: self.cookies.domain.clone().filter(|d| !d.is_empty()),
            max_age: self.session.max_age_seconds,
            secure: self.cookies.secure,
            http_only: self.cookies.http_only,
        }
    }

    #[must_use]
    pub fn oauth_paths(&self) -> OAuthPaths {
        OAuthPaths {
            login: self.oauth.login_path.clone(),
            logout: self.oauth.logout_path.clone(),
            callback: self.oauth.callback_path.clone(),
            error: self.oauth.error_path.clone(),
        }
    }

    /// Client registration for the configured provider
    ///
    /// Explicit `auth_url`/`token_url` take precedence over the provider preset.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown and no endpoints are configured
    pub fn oauth_client_config(&self) -> Result<OAuthClientConfig> {
        let oauth = &self.oauth;
        let preset = ProviderEndpoints::preset(&oauth.provider);

        let auth_url = oauth
            .auth_url
            .clone()
            .or_else(|| preset.as_ref().map(|p| p.auth_url.clone()))
            .with_context(|| format!("Provider {} missing auth_url", oauth.provider))?;
        let token_url = oauth
            .token_url
            .clone()
            .or_else(|| preset.as_ref().map(|p| p.token_url.clone()))
            .with_context(|| format!("Provider {} missing token_url", oauth.provider))?;

        Ok(OAuthClientConfig {
            provider: oauth.provider.clone(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            redirect_url: oauth.redirect_url.clone(),
            scopes: oauth.scopes.clone(),
            endpoints: ProviderEndpoints::new(auth_url, token_url),
            extra_auth_params: oauth.extra_auth_params.clone(),
        })
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}

fn apply_parsed_env_override<T: std::str::FromStr>(env_var: &str, target: &mut T) {
    if let Ok(value) = std::env::var(env_var) {
        if let Ok(parsed) = value.parse::<T>() {
            *target = parsed;
        }
    }
}

fn warn_about_generated_key() {
    eprintln!("⚠️  WARNING: Using an auto-generated session hash key");
    eprintln!("🔒 For production use, set the SESSION_HASH_KEY environment variable");
    eprintln!("   or configure session.key_pairs in Settings.toml");
    eprintln!("💡 Sessions will not survive a restart unless a key is configured");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEY_VARS: [&str; 2] = ["SESSION_HASH_KEY", "SESSION_BLOCK_KEY"];

    fn clear_env() {
        for var in KEY_VARS
            .iter()
            .chain(&["SESSION_MAX_AGE", "COOKIE_SECURE", "OAUTH_CLIENT_ID", "PORT"])
        {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let settings = GateSettings::default();
        assert_eq!(settings.session.cookie_name, COOKIE_NAME);
        assert_eq!(settings.get_bind_address(), "0.0.0.0:8080");
        assert_eq!(settings.oauth_paths(), OAuthPaths::default());
        assert!(settings.session_options().secure);
    }

    #[test]
    fn test_secrets_dir_replaces_base_file() {
        let base_dir = tempfile::tempdir().unwrap();
        let base = base_dir.path().join("Settings.toml");
        fs::write(&base, "[application]\nport = 9000\n").unwrap();

        let settings = GateSettings::load_base_settings(&base, None).unwrap();
        assert_eq!(settings.application.port, 9000);
        assert_eq!(settings.application.host, "0.0.0.0");

        let secrets_dir = tempfile::tempdir().unwrap();
        fs::write(
            secrets_dir.path().join("Settings.toml"),
            "[session]\ncookie_name = \"sid\"\nmax_age_seconds = 600\n",
        )
        .unwrap();

        let settings = GateSettings::load_base_settings(&base, Some(secrets_dir.path())).unwrap();
        assert_eq!(settings.application.port, 8080);
        assert_eq!(settings.session.cookie_name, "sid");
        assert_eq!(settings.session.max_age_seconds, 600);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Settings.toml");
        fs::write(&base, "[application\nport = ").unwrap();
        assert!(GateSettings::load_base_settings(&base, None).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("SESSION_MAX_AGE", "120");
        std::env::set_var("COOKIE_SECURE", "false");
        std::env::set_var("OAUTH_CLIENT_ID", "from-env");
        std::env::set_var("PORT", "not-a-port");

        let mut settings = GateSettings::default();
        settings.apply_env_overrides();
        clear_env();

        assert_eq!(settings.session.max_age_seconds, 120);
        assert!(!settings.cookies.secure);
        assert_eq!(settings.oauth.client_id, "from-env");
        assert_eq!(settings.application.port, 8080);
    }

    #[test]
    #[serial]
    fn test_missing_hash_key_is_generated() {
        clear_env();
        let mut settings = GateSettings::default();
        settings.apply_env_overrides();

        let pairs = settings.key_pairs().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].hash_key.len(), GENERATED_HASH_KEY_LENGTH);
        assert!(pairs[0].block_key.is_none());
    }

    #[test]
    #[serial]
    fn test_env_keys_override_primary_pair() {
        clear_env();
        let hash = general_purpose::STANDARD.encode(b"env-hash-key");
        let block = general_purpose::STANDARD.encode([7u8; 32]);
        std::env::set_var("SESSION_HASH_KEY", &hash);
        std::env::set_var("SESSION_BLOCK_KEY", &block);

        let mut settings = GateSettings::default();
        settings.session.key_pairs = vec![
            KeyPairSettings {
                hash_key: general_purpose::STANDARD.encode(b"old-primary"),
                block_key: None,
            },
            KeyPairSettings {
                hash_key: general_purpose::STANDARD.encode(b"older"),
                block_key: None,
            },
        ];
        settings.apply_env_overrides();
        clear_env();

        let pairs = settings.key_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].hash_key, b"env-hash-key");
        assert_eq!(pairs[0].block_key.as_deref(), Some(&[7u8; 32][..]));
        assert_eq!(pairs[1].hash_key, b"older");
    }

    #[test]
    fn test_invalid_key_material_is_rejected() {
        let mut settings = GateSettings::default();
        settings.session.key_pairs = vec![KeyPairSettings {
            hash_key: "***".to_string(),
            block_key: None,
        }];
        assert!(settings.key_pairs().is_err());
    }

    #[test]
    fn test_oauth_client_config_uses_presets_and_overrides() {
        let mut settings = GateSettings::default();
        settings.oauth.provider = "github".to_string();
        let config = settings.oauth_client_config().unwrap();
        assert_eq!(config.endpoints, ProviderEndpoints::github());

        settings.oauth.token_url = Some("https://sso.example/token".to_string());
        let config = settings.oauth_client_config().unwrap();
        assert_eq!(config.endpoints.auth_url, ProviderEndpoints::github().auth_url);
        assert_eq!(config.endpoints.token_url, "https://sso.example/token");

        settings.oauth.provider = "custom".to_string();
        settings.oauth.token_url = None;
        assert!(settings.oauth_client_config().is_err());
    }

    #[test]
    #[serial]
    fn test_env_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "# comment\nSESSIONGATE_TEST_VALUE = loaded\n").unwrap();

        GateSettings::load_env_file(&path);
        assert_eq!(
            std::env::var("SESSIONGATE_TEST_VALUE").as_deref(),
            Ok("loaded")
        );
        std::env::remove_var("SESSIONGATE_TEST_VALUE");
    }
}
