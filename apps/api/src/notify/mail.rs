use std::sync::Arc;

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::errors::AppError;
use crate::models::memo::Memo;
use crate::oauth::credentials::TokenProvider;
use crate::oauth::OAuthError;
use crate::outbound::{is_transient_status, RetryPolicy};

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

#[derive(Debug, Error)]
pub enum MailError {
    #[error(transparent)]
    Auth(#[from] OAuthError),

    #[error("No mail recipient configured")]
    NoRecipient,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gmail rejected the message (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<MailError> for AppError {
    fn from(e: MailError) -> Self {
        match e {
            MailError::Auth(e) => e.into(),
            other => AppError::ExternalProvider(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Fixed notification template for a memo.
    pub fn for_memo(memo: &Memo, to: &str) -> Self {
        let deadline = memo
            .deadline
            .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "none".to_string());
        let content = if memo.content.trim().is_empty() {
            "(no content)"
        } else {
            memo.content.as_str()
        };
        Self {
            to: to.to_string(),
            subject: format!("[Memo] {}", memo.title),
            body: format!(
                "Memo: {}\nDeadline: {deadline}\n\n{content}\n",
                memo.title
            ),
        }
    }

    pub fn test(to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "[Memo] Test mail".to_string(),
            body: "Mail delivery from the memo app is working.\n".to_string(),
        }
    }

    /// RFC 2822 message with a UTF-8 subject and base64 body.
    pub fn to_rfc2822(&self) -> String {
        format!(
            "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n{}\r\n",
            self.to,
            encode_header_words(&self.subject),
            wrap_base64(&self.body),
        )
    }

    /// The `raw` field of a Gmail `messages.send` request.
    pub fn gmail_raw(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_rfc2822())
    }
}

/// Longest base64 body line (RFC 2045).
const BODY_LINE_LEN: usize = 76;
/// Raw bytes per encoded-word: 45 bytes become 60 base64 chars, which with
/// the `=?UTF-8?B?` and `?=` delimiters stays under 75 (RFC 2047).
const HEADER_WORD_BYTES: usize = 45;

fn wrap_base64(text: &str) -> String {
    let encoded = STANDARD.encode(text);
    encoded
        .as_bytes()
        .chunks(BODY_LINE_LEN)
        .map(|line| String::from_utf8_lossy(line))
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Splits on char boundaries so every word decodes to valid UTF-8 by itself.
/// Continuation words go on folded lines.
fn encode_header_words(text: &str) -> String {
    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > HEADER_WORD_BYTES {
            words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() || words.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
    }
    words.join("\r\n ")
}

/// Sends one message on behalf of the holder of `access_token`.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, access_token: &str, message: &MailMessage) -> Result<(), MailError>;
}

pub struct GmailTransport {
    http: Client,
    retry: RetryPolicy,
}

impl GmailTransport {
    pub fn new(http: Client, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    async fn post(&self, access_token: &str, raw: &str) -> Result<(), MailError> {
        let response = self
            .http
            .post(GMAIL_SEND_URL)
            .bearer_auth(access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

fn is_retryable(e: &MailError) -> bool {
    match e {
        MailError::Http(e) => e.is_timeout() || e.is_connect(),
        MailError::Rejected { status, .. } => reqwest::StatusCode::from_u16(*status)
            .map(is_transient_status)
            .unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn send(&self, access_token: &str, message: &MailMessage) -> Result<(), MailError> {
        let raw = message.gmail_raw();
        self.retry
            .run("Gmail send", is_retryable, || self.post(access_token, &raw))
            .await
    }
}

/// Mail channel: resolves a credential for the signed-in account, then sends.
#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    tokens: TokenProvider,
    recipient: Option<String>,
}

impl Mailer {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        tokens: TokenProvider,
        recipient: Option<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            recipient,
        }
    }

    /// Configured recipient, else the signed-in account itself.
    fn recipient_for(&self, account: Option<&str>) -> Result<String, MailError> {
        self.recipient
            .clone()
            .or_else(|| account.filter(|a| a.contains('@')).map(str::to_string))
            .ok_or(MailError::NoRecipient)
    }

    /// Credential first, so a signed-out caller always gets auth guidance.
    async fn deliver(
        &self,
        account: Option<&str>,
        compose: impl FnOnce(&str) -> MailMessage,
    ) -> Result<String, MailError> {
        let access_token = self.tokens.access_token(account).await?;
        let message = compose(&self.recipient_for(account)?);
        self.transport.send(&access_token, &message).await?;
        info!("Sent mail \"{}\" to {}", message.subject, message.to);
        Ok(message.to)
    }

    /// Returns the address the memo was sent to.
    pub async fn send_memo(&self, account: Option<&str>, memo: &Memo) -> Result<String, MailError> {
        self.deliver(account, |to| MailMessage::for_memo(memo, to)).await
    }

    pub async fn send_test(&self, account: Option<&str>) -> Result<String, MailError> {
        self.deliver(account, MailMessage::test).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::OAuthCredential;
    use crate::oauth::credentials::{CredentialRepository, InMemoryCredentialRepository};
    use chrono::{Duration, TimeZone, Utc};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, MailMessage)>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, access_token: &str, message: &MailMessage) -> Result<(), MailError> {
            self.sent
                .lock()
                .await
                .push((access_token.to_string(), message.clone()));
            Ok(())
        }
    }

    fn memo() -> Memo {
        Memo {
            id: Uuid::new_v4(),
            title: "家賃".to_string(),
            content: "Pay before Friday".to_string(),
            deadline: Some(Utc.with_ymd_and_hms(2026, 10, 23, 12, 0, 0).unwrap()),
            completed: false,
            summary: None,
            created_at: Utc::now(),
        }
    }

    async fn mailer(
        recipient: Option<&str>,
        signed_in: bool,
    ) -> (Mailer, Arc<RecordingTransport>) {
        let repo = Arc::new(InMemoryCredentialRepository::new());
        if signed_in {
            repo.save(&OAuthCredential {
                account: "me@example.com".to_string(),
                access_token: "ya29.valid".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
                scope: "email".to_string(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let transport = Arc::new(RecordingTransport::default());
        let as_dyn: Arc<dyn MailTransport> = transport.clone();
        let mailer = Mailer::new(
            as_dyn,
            TokenProvider::new(repo, None),
            recipient.map(str::to_string),
        );
        (mailer, transport)
    }

    #[test]
    fn test_memo_template_mentions_title_deadline_and_content() {
        let message = MailMessage::for_memo(&memo(), "you@example.com");
        assert_eq!(message.subject, "[Memo] 家賃");
        assert!(message.body.contains("2026-10-23 12:00 UTC"));
        assert!(message.body.contains("Pay before Friday"));
    }

    #[test]
    fn test_rfc2822_encodes_utf8_subject() {
        let message = MailMessage::for_memo(&memo(), "you@example.com");
        let raw = message.to_rfc2822();
        assert!(raw.starts_with("To: you@example.com\r\n"));
        assert!(raw.contains(&format!("Subject: =?UTF-8?B?{}?=", STANDARD.encode("[Memo] 家賃"))));
        let decoded = URL_SAFE_NO_PAD.decode(message.gmail_raw()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), raw);
    }

    #[test]
    fn test_long_subject_and_body_respect_line_limits() {
        let mut long = memo();
        long.title = "締め切り前に家賃と光熱費をまとめて支払うこと".repeat(3);
        long.content = "Remember the receipts. ".repeat(20);
        let message = MailMessage::for_memo(&long, "you@example.com");
        let raw = message.to_rfc2822();

        let (headers, body) = raw.split_once("\r\n\r\n").unwrap();
        let subject: Vec<&str> = headers
            .split("\r\n")
            .skip_while(|l| !l.starts_with("Subject: "))
            .take_while(|l| l.starts_with("Subject: ") || l.starts_with(' '))
            .collect();
        assert!(subject.len() > 1);

        let mut decoded = Vec::new();
        for line in &subject {
            let word = line.trim_start_matches("Subject: ").trim_start();
            assert!(word.len() <= 75, "encoded-word too long: {word}");
            let inner = word
                .strip_prefix("=?UTF-8?B?")
                .and_then(|w| w.strip_suffix("?="))
                .unwrap();
            let bytes = STANDARD.decode(inner).unwrap();
            assert!(String::from_utf8(bytes.clone()).is_ok());
            decoded.extend(bytes);
        }
        assert_eq!(String::from_utf8(decoded).unwrap(), message.subject);

        let lines: Vec<&str> = body.trim_end().split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 76));
        let body_bytes = STANDARD.decode(lines.concat()).unwrap();
        assert_eq!(String::from_utf8(body_bytes).unwrap(), message.body);
    }

    #[tokio::test]
    async fn test_send_without_sign_in_is_auth_failure() {
        let (mailer, transport) = mailer(Some("you@example.com"), false).await;
        let err = mailer.send_memo(None, &memo()).await.unwrap_err();
        assert!(matches!(err, MailError::Auth(OAuthError::NotAuthenticated)));
        assert!(matches!(AppError::from(err), AppError::Unauthorized(_)));
        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_uses_stored_token_and_configured_recipient() {
        let (mailer, transport) = mailer(Some("you@example.com"), true).await;
        let to = mailer
            .send_memo(Some("me@example.com"), &memo())
            .await
            .unwrap();
        assert_eq!(to, "you@example.com");
        let sent = transport.sent.lock().await;
        assert_eq!(sent[0].0, "ya29.valid");
        assert_eq!(sent[0].1.to, "you@example.com");
    }

    #[tokio::test]
    async fn test_signed_out_without_recipient_still_gets_auth_guidance() {
        let (mailer, _) = mailer(None, false).await;
        let err = mailer.send_test(None).await.unwrap_err();
        assert!(matches!(err, MailError::Auth(_)));
    }

    #[tokio::test]
    async fn test_recipient_falls_back_to_account() {
        let (mailer, _) = mailer(None, true).await;
        let to = mailer.send_test(Some("me@example.com")).await.unwrap();
        assert_eq!(to, "me@example.com");
    }
}
