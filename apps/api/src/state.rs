use std::sync::Arc;

use crate::config::Config;
use crate::memos::views::Views;
use crate::memos::MemoRepository;
use crate::notify::Notifier;
use crate::oauth::credentials::TokenProvider;
use crate::oauth::session::SessionStore;
use crate::oauth::GoogleOAuthClient;
use crate::summarize::Summarizer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub memos: Arc<dyn MemoRepository>,
    pub sessions: SessionStore,
    /// `None` when the Google client id/secret are not configured.
    pub google: Option<GoogleOAuthClient>,
    /// Stored credentials plus the code exchange / refresh backend.
    pub tokens: TokenProvider,
    pub notifier: Notifier,
    pub summarizer: Summarizer,
    pub views: Arc<Views>,
    pub config: Config,
}
