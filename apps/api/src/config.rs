use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Optional integrations (Google, Anthropic, VAPID) stay disabled when their
/// variables are absent; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` means no database is configured and memos live in process memory.
    pub database_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub anthropic_api_key: Option<String>,
    pub google: Option<GoogleConfig>,
    pub mail_recipient: Option<String>,
    pub vapid: Option<VapidConfig>,
    pub outbound: OutboundConfig,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub private_key_path: String,
    /// Base64url-encoded uncompressed public key handed to browsers.
    pub public_key: String,
    pub subject: String,
}

/// Limits applied to every call leaving the process.
#[derive(Debug, Clone, Copy)]
pub struct OutboundConfig {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 2,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let port = optional_env("PORT")
            .unwrap_or_else(|| "5000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let google = match (
            optional_env("GOOGLE_CLIENT_ID"),
            optional_env("GOOGLE_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri: optional_env("GOOGLE_REDIRECT_URI").unwrap_or_else(|| {
                    format!("http://localhost:{port}/google_callback")
                }),
            }),
            _ => None,
        };

        let vapid = match optional_env("VAPID_PRIVATE_KEY_PATH") {
            Some(private_key_path) => Some(VapidConfig {
                private_key_path,
                public_key: require_env("VAPID_PUBLIC_KEY")?,
                subject: optional_env("VAPID_SUBJECT")
                    .unwrap_or_else(|| "mailto:admin@example.com".to_string()),
            }),
            None => None,
        };

        let mut outbound = OutboundConfig::default();
        if let Some(secs) = optional_env("OUTBOUND_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .context("OUTBOUND_TIMEOUT_SECS must be a whole number of seconds")?;
            outbound.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = optional_env("OUTBOUND_MAX_RETRIES") {
            outbound.max_retries = retries
                .parse::<u32>()
                .context("OUTBOUND_MAX_RETRIES must be a non-negative integer")?;
        }

        Ok(Config {
            database_url: database_url_from_env(),
            port,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            google,
            mail_recipient: optional_env("MAIL_RECIPIENT"),
            vapid,
            outbound,
        })
    }
}

/// `DATABASE_URL` wins; otherwise the discrete `POSTGRES_*` variables are
/// assembled into a connection string when all of them are present.
fn database_url_from_env() -> Option<String> {
    if let Some(url) = optional_env("DATABASE_URL") {
        return Some(url);
    }
    let user = optional_env("POSTGRES_USER")?;
    let password = optional_env("POSTGRES_PASSWORD")?;
    let host = optional_env("POSTGRES_HOST")?;
    let port = optional_env("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());
    let db = optional_env("POSTGRES_DB")?;
    Some(postgres_url(&user, &password, &host, &port, &db))
}

fn postgres_url(user: &str, password: &str, host: &str, port: &str, db: &str) -> String {
    format!("postgresql://{user}:{password}@{host}:{port}/{db}")
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn require_env(key: &str) -> Result<String> {
    optional_env(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
