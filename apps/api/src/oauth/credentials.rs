use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

use super::{OAuthError, TokenExchanger};
use crate::models::credential::OAuthCredential;

/// Durable home of Google credentials, one per account.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn get(&self, account: &str) -> Result<Option<OAuthCredential>>;

    /// Insert or replace the row for `credential.account`.
    async fn save(&self, credential: &OAuthCredential) -> Result<()>;

    async fn delete(&self, account: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct PgCredentialRepository {
    pool: PgPool,
}

impl PgCredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn get(&self, account: &str) -> Result<Option<OAuthCredential>> {
        Ok(sqlx::query_as::<_, OAuthCredential>(
            "SELECT * FROM oauth_credentials WHERE account = $1",
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn save(&self, credential: &OAuthCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_credentials
                (account, access_token, refresh_token, expires_at, scope, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (account) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                scope = EXCLUDED.scope,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&credential.account)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.scope)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_credentials WHERE account = $1")
            .bind(account)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: RwLock<HashMap<String, OAuthCredential>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get(&self, account: &str) -> Result<Option<OAuthCredential>> {
        Ok(self.credentials.read().await.get(account).cloned())
    }

    async fn save(&self, credential: &OAuthCredential) -> Result<()> {
        self.credentials
            .write()
            .await
            .insert(credential.account.clone(), credential.clone());
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<bool> {
        Ok(self.credentials.write().await.remove(account).is_some())
    }
}

/// Hands out usable access tokens: checks expiry before every use and
/// refreshes (and re-persists) when needed.
#[derive(Clone)]
pub struct TokenProvider {
    credentials: Arc<dyn CredentialRepository>,
    exchanger: Option<Arc<dyn TokenExchanger>>,
}

impl TokenProvider {
    pub fn new(
        credentials: Arc<dyn CredentialRepository>,
        exchanger: Option<Arc<dyn TokenExchanger>>,
    ) -> Self {
        Self {
            credentials,
            exchanger,
        }
    }

    pub fn exchanger(&self) -> Option<&Arc<dyn TokenExchanger>> {
        self.exchanger.as_ref()
    }

    pub async fn store(&self, credential: &OAuthCredential) -> Result<(), OAuthError> {
        self.credentials.save(credential).await?;
        info!("Stored Google credential for {}", credential.account);
        Ok(())
    }

    pub async fn forget(&self, account: &str) -> Result<(), OAuthError> {
        if self.credentials.delete(account).await? {
            info!("Removed Google credential for {account}");
        }
        Ok(())
    }

    pub async fn access_token(&self, account: Option<&str>) -> Result<String, OAuthError> {
        let account = account.ok_or(OAuthError::NotAuthenticated)?;
        let credential = self
            .credentials
            .get(account)
            .await?
            .ok_or(OAuthError::NotAuthenticated)?;

        let now = Utc::now();
        if !credential.needs_refresh(now) {
            return Ok(credential.access_token);
        }

        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or(OAuthError::Expired)?;
        let exchanger = self.exchanger.as_ref().ok_or(OAuthError::NotConfigured)?;
        let grant = exchanger.refresh(&refresh_token).await?;
        let refreshed = grant.refresh_credential(credential, now);
        self.credentials.save(&refreshed).await?;
        info!("Refreshed Google access token for {account}");
        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::TokenGrant;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExchanger {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TokenExchanger for FakeExchanger {
        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, OAuthError> {
            unreachable!("not used by the token provider")
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
            assert_eq!(refresh_token, "r1");
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(TokenGrant {
                access_token: "fresh".to_string(),
                expires_in: 3600,
                refresh_token: None,
                scope: None,
                id_token: None,
            })
        }
    }

    fn credential(expires_in_secs: i64, refresh_token: Option<&str>) -> OAuthCredential {
        OAuthCredential {
            account: "me@example.com".to_string(),
            access_token: "stale".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
            scope: "email".to_string(),
            updated_at: Utc::now(),
        }
    }

    fn provider(
        repo: Arc<InMemoryCredentialRepository>,
    ) -> (TokenProvider, Arc<FakeExchanger>) {
        let exchanger = Arc::new(FakeExchanger {
            refreshes: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn TokenExchanger> = exchanger.clone();
        (TokenProvider::new(repo, Some(as_dyn)), exchanger)
    }

    #[tokio::test]
    async fn test_no_account_is_not_authenticated() {
        let (tokens, _) = provider(Arc::new(InMemoryCredentialRepository::new()));
        let err = tokens.access_token(None).await.unwrap_err();
        assert!(matches!(err, OAuthError::NotAuthenticated));
        let err = tokens.access_token(Some("me@example.com")).await.unwrap_err();
        assert!(matches!(err, OAuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_valid_token_is_used_as_is() {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        repo.save(&credential(3600, Some("r1"))).await.unwrap();
        let (tokens, exchanger) = provider(repo);

        let token = tokens.access_token(Some("me@example.com")).await.unwrap();
        assert_eq!(token, "stale");
        assert_eq!(exchanger.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        repo.save(&credential(-60, Some("r1"))).await.unwrap();
        let (tokens, exchanger) = provider(repo.clone());

        let token = tokens.access_token(Some("me@example.com")).await.unwrap();
        assert_eq!(token, "fresh");
        assert_eq!(exchanger.refreshes.load(Ordering::SeqCst), 1);

        let stored = repo.get("me@example.com").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
        assert!(!stored.needs_refresh(Utc::now()));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        repo.save(&credential(-60, None)).await.unwrap();
        let (tokens, _) = provider(repo);
        let err = tokens.access_token(Some("me@example.com")).await.unwrap_err();
        assert!(matches!(err, OAuthError::Expired));
    }

    #[tokio::test]
    async fn test_forget_removes_credential() {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        let (tokens, _) = provider(repo.clone());
        tokens.store(&credential(3600, None)).await.unwrap();
        tokens.forget("me@example.com").await.unwrap();
        assert!(repo.get("me@example.com").await.unwrap().is_none());
    }
}
