// External Notifier: best-effort fan-out after a memo is created.
// Push and mail failures are logged here and never reach the memo mutation.

pub mod handlers;
pub mod mail;
pub mod push;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::memo::Memo;
use mail::Mailer;
use push::{PushMessage, PushReport, PushService};

#[derive(Debug, Default, Serialize)]
pub struct NotifyReport {
    pub push: Option<PushReport>,
    /// Recipient on success, `None` when mail was skipped or failed.
    pub mailed_to: Option<String>,
}

#[derive(Clone)]
pub struct Notifier {
    push: PushService,
    mailer: Mailer,
}

impl Notifier {
    pub fn new(push: PushService, mailer: Mailer) -> Self {
        Self { push, mailer }
    }

    pub fn push(&self) -> &PushService {
        &self.push
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    /// Push goes to every subscriber; mail only when the creating session is
    /// signed in with Google.
    pub async fn memo_created(&self, memo: &Memo, account: Option<&str>) -> NotifyReport {
        let message = PushMessage {
            title: "New memo".to_string(),
            body: memo.title.clone(),
        };
        let push = match self.push.broadcast(&message).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Push notification for memo {} failed: {e}", memo.id);
                None
            }
        };

        let mailed_to = match account {
            None => {
                debug!("Mail for memo {} skipped: not signed in", memo.id);
                None
            }
            Some(account) => match self.mailer.send_memo(Some(account), memo).await {
                Ok(to) => Some(to),
                Err(e) => {
                    warn!("Mail notification for memo {} failed: {e}", memo.id);
                    None
                }
            },
        };

        NotifyReport { push, mailed_to }
    }
}
