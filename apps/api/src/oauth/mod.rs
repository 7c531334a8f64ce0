// Google OAuth: authorization-code flow, credential persistence and refresh.
// The session state machine lives in `session`, stored tokens in `credentials`.

pub mod credentials;
pub mod handlers;
pub mod session;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GoogleConfig;
use crate::errors::AppError;
use crate::models::credential::OAuthCredential;
use crate::outbound::{is_transient_status, RetryPolicy};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Identity (for the account key) plus permission to send mail.
pub const GOOGLE_SCOPES: &str = "openid email https://www.googleapis.com/auth/gmail.send";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("Not signed in with Google")]
    NotAuthenticated,

    #[error("No sign-in is in progress for this session")]
    NoPendingLogin,

    #[error("Sign-in state token does not match")]
    StateMismatch,

    #[error("Sign-in request expired")]
    StateExpired,

    #[error("Google sign-in was refused: {0}")]
    ProviderDenied(String),

    #[error("Token endpoint rejected the request (status {status}): {message}")]
    Exchange { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token response did not identify the account")]
    MissingIdentity,

    #[error("Stored credential expired and cannot be refreshed")]
    Expired,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Credential storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<OAuthError> for AppError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::Storage(e) => e.into(),
            OAuthError::InvalidUrl(e) => AppError::Internal(e.into()),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

/// Tokens returned by Google's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in)
    }

    /// Builds the stored credential for a first sign-in.
    pub fn into_credential(self, account: String, now: DateTime<Utc>) -> OAuthCredential {
        OAuthCredential {
            account,
            expires_at: self.expires_at(now),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope.unwrap_or_else(|| GOOGLE_SCOPES.to_string()),
            updated_at: now,
        }
    }

    /// Applies a refresh grant. Google usually omits the refresh token on
    /// refresh, in which case the old one stays valid.
    pub fn refresh_credential(self, previous: OAuthCredential, now: DateTime<Utc>) -> OAuthCredential {
        OAuthCredential {
            expires_at: self.expires_at(now),
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous.refresh_token),
            scope: self.scope.unwrap_or(previous.scope),
            updated_at: now,
            account: previous.account,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Reads the account identity from an ID token. The token came straight from
/// the token endpoint over TLS, so the signature is not re-verified here.
pub fn account_from_id_token(id_token: &str) -> Result<String, OAuthError> {
    let payload = id_token.split('.').nth(1).ok_or(OAuthError::MissingIdentity)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| OAuthError::MissingIdentity)?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&bytes).map_err(|_| OAuthError::MissingIdentity)?;
    Ok(claims.email.unwrap_or(claims.sub))
}

/// Token endpoint operations, split out so the credential lifecycle can be
/// exercised without Google.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError>;
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: Client,
    config: GoogleConfig,
    retry: RetryPolicy,
}

impl GoogleOAuthClient {
    pub fn new(http: Client, config: GoogleConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            config,
            retry,
        }
    }

    /// URL the browser is redirected to; `state` comes back on the callback.
    pub fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = url::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, OAuthError> {
        let response = self.http.post(GOOGLE_TOKEN_URL).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorBody>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {desc}", e.error),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err(OAuthError::Exchange {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<TokenGrant>().await?)
    }
}

fn is_retryable(e: &OAuthError) -> bool {
    match e {
        OAuthError::Http(e) => e.is_timeout() || e.is_connect(),
        OAuthError::Exchange { status, .. } => reqwest::StatusCode::from_u16(*status)
            .map(is_transient_status)
            .unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl TokenExchanger for GoogleOAuthClient {
    /// Authorization codes are single-use, so this is never retried.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        let grant = self
            .post_token(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        info!("Exchanged authorization code for Google tokens");
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        let form = [
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let result = self
            .retry
            .run("Google token refresh", is_retryable, || self.post_token(&form))
            .await;
        if let Err(e) = &result {
            warn!("Google token refresh failed: {e}");
        }
        result
    }
}
