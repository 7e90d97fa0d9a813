/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE` or `DATABASE_URL`: PostgreSQL connection string; a
///   `<PASSWORD>` placeholder is replaced by `DATABASE_PASSWORD`
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `PORT`: Port to bind to (default: 8000)
/// - `PUBLIC_URL`: externally visible base URL (default: http://localhost:<port>)
/// - `CORS_ORIGINS`: comma-separated origins or `*` (default: *)
/// - `PRODUCTION`: enables HSTS and secure cookies (default: false)
/// - `JWT_SECRET`: Secret key for JWT signing (required)
/// - `JWT_EXPIRES_IN_DAYS`, `JWT_COOKIE_EXPIRES_IN_DAYS` (default: 90)
/// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET` (required)
/// - `STRIPE_API_BASE` (default: https://api.stripe.com)
/// - `RUST_LOG`: Log level
///
/// # Example
///
/// ```no_run
/// use tourbook_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use std::env;
use std::str::FromStr;
use tourbook_shared::{
    db::pool::resolve_database_url,
    payments::stripe::{StripeConfig, DEFAULT_API_BASE},
};

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Payment provider configuration
    pub stripe: StripeConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Base URL used in checkout redirects and image links
    pub public_url: String,

    /// Allowed CORS origins (`*` allows any)
    pub cors_origins: Vec<String>,

    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Token lifetime
    pub expires_in_days: i64,

    /// `jwt` cookie lifetime
    pub cookie_expires_in_days: i64,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// `config.env` and `.env` are read first when present (for
    /// development); real environment variables win.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::from_filename("config.env").ok();
        dotenvy::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8000u16)?;
        let public_url = lookup("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let production = parse_or(&lookup, "PRODUCTION", false)?;

        let raw_url = lookup("DATABASE")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or_else(|| anyhow::anyhow!("DATABASE or DATABASE_URL environment variable is required"))?;
        let url = resolve_database_url(&raw_url, lookup("DATABASE_PASSWORD").as_deref());
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let secret = required(&lookup, "JWT_SECRET")?;
        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }
        let expires_in_days = parse_or(&lookup, "JWT_EXPIRES_IN_DAYS", 90i64)?;
        let cookie_expires_in_days = parse_or(&lookup, "JWT_COOKIE_EXPIRES_IN_DAYS", 90i64)?;
        if expires_in_days <= 0 || cookie_expires_in_days <= 0 {
            anyhow::bail!("JWT expiry settings must be positive");
        }

        let stripe = StripeConfig {
            secret_key: required(&lookup, "STRIPE_SECRET_KEY")?,
            webhook_secret: required(&lookup, "STRIPE_WEBHOOK_SECRET")?,
            api_base: lookup("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        };

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                public_url,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url,
                max_connections,
            },
            jwt: JwtConfig {
                secret,
                expires_in_days,
                cookie_expires_in_days,
            },
            stripe,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin is allowed
    pub fn cors_allows_any(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}
