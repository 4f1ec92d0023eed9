#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::middleware::{from_fn, Logger};
use actix_web::{web, App, HttpServer};
use log::info;
use sessiongate::{
    handlers::{health, oauth2_error, whoami},
    login_required,
    oauth::{HttpOAuthClient, OAuth2Provider},
    render::{Renderer, TemplateRenderer},
    session::{DocumentSessionStore, MemoryCollection, SessionStore},
    session_middleware,
    settings::GateSettings,
    utils::logging::LoggingHelper,
    SessionGate,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = GateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e:#}")))?;

    let gate = build_gate(&settings).await?;
    start_server(gate, settings).await
}

/// Wire the session store, OAuth provider and renderer from settings
///
/// # Errors
///
/// Returns an error if key material or provider configuration is invalid
async fn build_gate(settings: &GateSettings) -> std::io::Result<SessionGate> {
    let key_pairs = settings
        .key_pairs()
        .map_err(|e| std::io::Error::other(format!("Invalid session keys: {e:#}")))?;

    let collection = MemoryCollection::new();
    let store = DocumentSessionStore::new(
        collection.clone(),
        settings.session.max_age_seconds,
        settings.session.ensure_ttl,
        &key_pairs,
    )
    .await
    .map_err(|e| std::io::Error::other(format!("Failed to initialize session store: {e}")))?
    .with_options(settings.session_options());
    LoggingHelper::log_store_initialized(
        &settings.session.collection,
        settings.session.max_age_seconds,
        key_pairs.len(),
    );

    if settings.session.ensure_ttl {
        let period = Duration::from_secs(settings.session.ttl_sweep_seconds.max(1));
        // Runs for the lifetime of the process
        drop(collection.spawn_ttl_monitor(period));
    }

    let store: Arc<dyn SessionStore> = Arc::new(store);
    let mut gate = SessionGate::new(store, &settings.session.cookie_name);

    if settings.oauth.enabled {
        let config = settings
            .oauth_client_config()
            .map_err(|e| std::io::Error::other(format!("Invalid OAuth configuration: {e:#}")))?;
        let client = HttpOAuthClient::new(config)
            .map_err(|e| std::io::Error::other(format!("Failed to initialize OAuth client: {e}")))?;
        gate = gate.with_provider(OAuth2Provider::new(Arc::new(client)).with_paths(settings.oauth_paths()));
    }

    match TemplateRenderer::from_dir(Path::new(&settings.application.templates_folder)) {
        Ok(renderer) if !renderer.is_empty() => {
            info!("Loaded {} templates", renderer.len());
            let renderer: Arc<dyn Renderer> = Arc::new(renderer);
            gate = gate.with_renderer(renderer);
        }
        Ok(_) => info!("No templates found, using built-in pages"),
        Err(e) => info!("Templates unavailable, using built-in pages: {e:#}"),
    }

    Ok(gate)
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(gate: SessionGate, settings: GateSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let gate = web::Data::new(gate);
    let error_path = settings.oauth.error_path.clone();

    HttpServer::new(move || {
        let error_path = error_path.clone();
        App::new()
            .app_data(gate.clone())
            .wrap(from_fn(session_middleware))
            .wrap(Logger::default())
            .configure(move |cfg| configure_services(cfg, &error_path))
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn configure_services(cfg: &mut web::ServiceConfig, error_path: &str) {
    cfg
        // Host-owned login failure page
        .route(error_path, web::get().to(oauth2_error))
        // Identity of the signed-in user
        .service(
            web::scope("/me")
                .wrap(from_fn(login_required))
                .route("", web::get().to(whoami)),
        )
        // Health endpoint
        .route("/ping", web::get().to(health));
}

fn print_startup_info(bind_address: &str, settings: &GateSettings) {
    println!("Starting sessiongate {} on http://{bind_address}", sessiongate::VERSION);
    println!("Session cookie: {}", settings.session.cookie_name);
    println!();
    if settings.oauth.enabled {
        println!("OAuth2 endpoints ({}):", settings.oauth.provider);
        println!("  GET  {} - Start login", settings.oauth.login_path);
        println!("  GET  {} - Clear the token", settings.oauth.logout_path);
        println!("  GET  {} - Provider callback", settings.oauth.callback_path);
        println!("  GET  {} - Login failure page", settings.oauth.error_path);
        println!();
        println!("OAuth callback URL for identity providers:");
        println!("  {}", settings.oauth.redirect_url);
        println!();
    }
    println!("System endpoints:");
    println!("  GET  /me   - Signed-in identity (login required)");
    println!("  GET  /ping - Health check");
}
