use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::session::{ensure_session, session_id, OAuthState};
use super::{account_from_id_token, OAuthError};
use crate::errors::AppError;
use crate::state::AppState;

/// GET /google_login
pub async fn handle_google_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let google = state.google.as_ref().ok_or(OAuthError::NotConfigured)?;
    let (jar, sid) = ensure_session(jar);
    let token = state.sessions.begin_login(sid, Utc::now()).await;
    let url = google.authorize_url(&token)?;
    info!("Redirecting session {sid} to Google sign-in");
    Ok((jar, Redirect::to(&url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// GET /google_callback
pub async fn handle_google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Html<String>, AppError> {
    let sid = session_id(&jar);
    // Consume the pending login first so a denied or forged callback cannot be replayed.
    let verified = state
        .sessions
        .verify_callback(sid, params.state.as_deref(), Utc::now())
        .await;

    if let Some(error) = params.error {
        return Err(OAuthError::ProviderDenied(error).into());
    }
    verified?;

    let sid = sid.ok_or(OAuthError::NoPendingLogin)?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| OAuthError::ProviderDenied("no authorization code".to_string()))?;
    let exchanger = state.tokens.exchanger().ok_or(OAuthError::NotConfigured)?;

    let grant = exchanger.exchange_code(&code).await.map_err(|e| {
        warn!("Authorization code exchange failed: {e}");
        e
    })?;
    let account = grant
        .id_token
        .as_deref()
        .ok_or(OAuthError::MissingIdentity)
        .and_then(account_from_id_token)?;

    let credential = grant.into_credential(account.clone(), Utc::now());
    state.tokens.store(&credential).await?;
    state.sessions.authenticate(sid, account.clone()).await;

    info!("Session {sid} signed in as {account}");
    state
        .views
        .message("Signed in", &format!("Signed in with Google as {account}."))
}

/// GET /logout
/// Clears the session and forgets the stored credential.
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Redirect, AppError> {
    if let Some(sid) = session_id(&jar) {
        if let Some(OAuthState::Authenticated { account }) = state.sessions.clear(sid).await {
            state.tokens.forget(&account).await?;
            info!("Signed out {account}");
        }
    }
    Ok(Redirect::to("/"))
}
