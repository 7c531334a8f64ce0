use std::collections::HashMap;
use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::OAuthError;

pub const SESSION_COOKIE: &str = "memo_sid";
/// A login that is not completed within this window has to start over.
const PENDING_LOGIN_TTL_MINS: i64 = 10;

/// Where a browser session is in the Google sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OAuthState {
    #[default]
    Unauthenticated,
    AuthorizationPending {
        state: String,
        issued_at: DateTime<Utc>,
    },
    Authenticated {
        account: String,
    },
}

/// Server-side sessions keyed by the `memo_sid` cookie. Process memory only.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, OAuthState>>>,
}

/// Session id from the cookie jar, if the browser sent a valid one.
pub fn session_id(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

/// Returns the existing session id or mints a new one and sets the cookie.
pub fn ensure_session(jar: CookieJar) -> (CookieJar, Uuid) {
    if let Some(sid) = session_id(&jar) {
        return (jar, sid);
    }
    let sid = Uuid::new_v4();
    let cookie = Cookie::build((SESSION_COOKIE, sid.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), sid)
}

fn is_stale_pending(state: &OAuthState, now: DateTime<Utc>) -> bool {
    matches!(
        state,
        OAuthState::AuthorizationPending { issued_at, .. }
            if now - *issued_at > Duration::minutes(PENDING_LOGIN_TTL_MINS)
    )
}

/// Fresh one-time anti-forgery token for the authorization redirect.
fn new_state_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, sid: Uuid) -> OAuthState {
        self.sessions
            .read()
            .await
            .get(&sid)
            .cloned()
            .unwrap_or_default()
    }

    /// Signed-in account for this session, if any.
    pub async fn account(&self, sid: Option<Uuid>) -> Option<String> {
        match self.state(sid?).await {
            OAuthState::Authenticated { account } => Some(account),
            _ => None,
        }
    }

    /// Unauthenticated (or anything else) → AuthorizationPending.
    /// Returns the state token to send to the provider. Abandoned pending
    /// logins older than the TTL are dropped here.
    pub async fn begin_login(&self, sid: Uuid, now: DateTime<Utc>) -> String {
        let state = new_state_token();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !is_stale_pending(s, now));
        sessions.insert(
            sid,
            OAuthState::AuthorizationPending {
                state: state.clone(),
                issued_at: now,
            },
        );
        state
    }

    /// Consumes a pending login. Only a session in AuthorizationPending is
    /// touched: it leaves that state whatever the outcome, so a mismatched
    /// token also cancels the login and the user has to start over. Sessions
    /// in any other state, and unknown ids, are left as they are.
    pub async fn verify_callback(
        &self,
        sid: Option<Uuid>,
        presented: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), OAuthError> {
        let sid = sid.ok_or(OAuthError::NoPendingLogin)?;
        let mut sessions = self.sessions.write().await;
        let (state, issued_at) = match sessions.get(&sid) {
            Some(OAuthState::AuthorizationPending { state, issued_at }) => {
                (state.clone(), *issued_at)
            }
            _ => return Err(OAuthError::NoPendingLogin),
        };
        sessions.remove(&sid);
        drop(sessions);

        if now - issued_at > Duration::minutes(PENDING_LOGIN_TTL_MINS) {
            return Err(OAuthError::StateExpired);
        }
        match presented {
            Some(presented) if presented == state => Ok(()),
            _ => Err(OAuthError::StateMismatch),
        }
    }

    /// Completes the flow after the code exchange succeeded.
    pub async fn authenticate(&self, sid: Uuid, account: String) {
        self.sessions
            .write()
            .await
            .insert(sid, OAuthState::Authenticated { account });
    }

    /// Drops the session entirely, returning what it held.
    pub async fn clear(&self, sid: Uuid) -> Option<OAuthState> {
        self.sessions.write().await.remove(&sid)
    }
}
