mod config;
mod db;
mod errors;
mod llm_client;
mod memos;
mod models;
mod notify;
mod oauth;
mod outbound;
mod routes;
mod state;
mod summarize;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::LlmClient;
use crate::memos::memory::InMemoryMemoRepository;
use crate::memos::pg::PgMemoRepository;
use crate::memos::views::Views;
use crate::memos::MemoRepository;
use crate::notify::mail::{GmailTransport, Mailer};
use crate::notify::push::{PushSender, PushService, SubscriptionRegistry, WebPushSender};
use crate::notify::Notifier;
use crate::oauth::credentials::{
    CredentialRepository, InMemoryCredentialRepository, PgCredentialRepository, TokenProvider,
};
use crate::oauth::session::SessionStore;
use crate::oauth::{GoogleOAuthClient, TokenExchanger};
use crate::outbound::{http_client, RetryPolicy};
use crate::routes::build_router;
use crate::state::AppState;
use crate::summarize::Summarizer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Memos v{}", env!("CARGO_PKG_VERSION"));

    // Record store and credential store
    let (memos, credentials): (Arc<dyn MemoRepository>, Arc<dyn CredentialRepository>) =
        match &config.database_url {
            Some(url) => {
                let db = create_pool(url).await?;
                ensure_schema(&db).await?;
                (
                    Arc::new(PgMemoRepository::new(db.clone())),
                    Arc::new(PgCredentialRepository::new(db)),
                )
            }
            None => {
                warn!("No database configured; memos and credentials are kept in memory only");
                (
                    Arc::new(InMemoryMemoRepository::new()),
                    Arc::new(InMemoryCredentialRepository::new()),
                )
            }
        };

    // Shared outbound HTTP client
    let http = http_client(&config.outbound)?;
    let retry = RetryPolicy::from_config(&config.outbound);

    // Google OAuth
    let google = config
        .google
        .clone()
        .map(|g| GoogleOAuthClient::new(http.clone(), g, retry));
    match &google {
        Some(_) => info!("Google sign-in enabled"),
        None => warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; Google sign-in disabled"),
    }
    let exchanger = google
        .clone()
        .map(|g| Arc::new(g) as Arc<dyn TokenExchanger>);
    let tokens = TokenProvider::new(credentials, exchanger);

    // Notifier: Web Push + Gmail
    let push_sender: Option<Arc<dyn PushSender>> = match &config.vapid {
        Some(vapid) => {
            let pem = tokio::fs::read(&vapid.private_key_path)
                .await
                .with_context(|| format!("Failed to read VAPID key {}", vapid.private_key_path))?;
            let sender: Arc<dyn PushSender> = Arc::new(WebPushSender::new(
                pem,
                vapid.subject.clone(),
                config.outbound.timeout,
            )?);
            info!("Web Push enabled");
            Some(sender)
        }
        None => {
            warn!("VAPID_PRIVATE_KEY_PATH not set; push notifications disabled");
            None
        }
    };
    let mailer = Mailer::new(
        Arc::new(GmailTransport::new(http.clone(), retry)),
        tokens.clone(),
        config.mail_recipient.clone(),
    );
    let notifier = Notifier::new(
        PushService::new(SubscriptionRegistry::new(), push_sender),
        mailer,
    );

    // AI summarizer
    let summarizer = match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone(), http.clone(), retry);
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Summarizer::new(Arc::new(llm))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; summaries disabled");
            Summarizer::disabled()
        }
    };

    let views = Arc::new(Views::new()?);

    // Build app state
    let state = AppState {
        memos,
        sessions: SessionStore::new(),
        google,
        tokens,
        notifier,
        summarizer,
        views,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
