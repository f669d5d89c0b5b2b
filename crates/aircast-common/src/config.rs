//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for
//! production. Precedence: env vars > .env file > config.toml > defaults.

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call aircast_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("cors.allowed_origins", "*")?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (AIRCAST__SERVER__HOST, AIRCAST__CORS__ALLOWED_ORIGINS, ...)
        .add_source(
            config::Environment::with_prefix("AIRCAST")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Interface the relay binds to.
    pub host: String,
    /// Port for the WebSocket relay and status API. TLS termination, if any,
    /// happens in front of the process.
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins, or `*` for any origin.
    pub allowed_origins: String,
}
