use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

/// Seconds a push service may hold an undelivered message.
const PUSH_TTL_SECS: u32 = 60 * 60 * 24;

/// Browser `PushSubscription.toJSON()` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// What the service worker shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum PushError {
    /// The push service no longer knows this endpoint; drop it.
    #[error("subscription is gone")]
    Gone,

    #[error("push delivery failed: {0}")]
    Delivery(String),

    #[error("push delivery timed out")]
    Timeout,

    #[error("push payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<WebPushError> for PushError {
    fn from(e: WebPushError) -> Self {
        match e.short_description() {
            "endpoint_not_valid" | "endpoint_not_found" => PushError::Gone,
            _ => PushError::Delivery(e.to_string()),
        }
    }
}

/// Delivers one encrypted payload to one subscriber.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), PushError>;
}

/// Web Push (RFC 8291 payload encryption, VAPID authentication).
pub struct WebPushSender {
    client: IsahcWebPushClient,
    private_key_pem: Vec<u8>,
    subject: String,
    timeout: Duration,
}

impl WebPushSender {
    pub fn new(
        private_key_pem: Vec<u8>,
        subject: String,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        Ok(Self {
            client: IsahcWebPushClient::new()?,
            private_key_pem,
            subject,
            timeout,
        })
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), PushError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.keys.p256dh.clone(),
            subscription.keys.auth.clone(),
        );

        let mut signature = VapidSignatureBuilder::from_pem(self.private_key_pem.as_slice(), &info)?;
        signature.add_claim("sub", self.subject.as_str());

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature.build()?);
        builder.set_ttl(PUSH_TTL_SECS);
        let message = builder.build()?;

        tokio::time::timeout(self.timeout, self.client.send(message))
            .await
            .map_err(|_| PushError::Timeout)??;
        Ok(())
    }
}

/// Subscribed endpoints for the life of the process. Re-subscribing the same
/// endpoint replaces its keys.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Arc<Mutex<HashMap<String, PushSubscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the endpoint was not registered before.
    pub async fn register(&self, subscription: PushSubscription) -> bool {
        self.subscriptions
            .lock()
            .await
            .insert(subscription.endpoint.clone(), subscription)
            .is_none()
    }

    pub async fn remove(&self, endpoint: &str) -> bool {
        self.subscriptions.lock().await.remove(endpoint).is_some()
    }

    pub async fn snapshot(&self) -> Vec<PushSubscription> {
        self.subscriptions.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.lock().await.len()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub subscribers: usize,
    pub delivered: usize,
    pub failed: usize,
    pub pruned: usize,
}

#[derive(Clone)]
pub struct PushService {
    registry: SubscriptionRegistry,
    sender: Option<Arc<dyn PushSender>>,
}

impl PushService {
    pub fn new(registry: SubscriptionRegistry, sender: Option<Arc<dyn PushSender>>) -> Self {
        Self { registry, sender }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Attempts every subscriber independently; one failure never stops the rest.
    pub async fn broadcast(&self, message: &PushMessage) -> Result<PushReport, PushError> {
        let subscribers = self.registry.snapshot().await;
        let mut report = PushReport {
            subscribers: subscribers.len(),
            ..Default::default()
        };
        if subscribers.is_empty() {
            debug!("Push broadcast skipped: no subscribers");
            return Ok(report);
        }

        let Some(sender) = &self.sender else {
            warn!(
                "Push broadcast to {} subscribers skipped: VAPID keys not configured",
                subscribers.len()
            );
            report.failed = subscribers.len();
            return Ok(report);
        };

        let payload = serde_json::to_vec(message)?;
        for subscription in &subscribers {
            match sender.send(subscription, &payload).await {
                Ok(()) => report.delivered += 1,
                Err(PushError::Gone) => {
                    info!("Pruning expired push subscription {}", subscription.endpoint);
                    self.registry.remove(&subscription.endpoint).await;
                    report.failed += 1;
                    report.pruned += 1;
                }
                Err(e) => {
                    warn!("Push to {} failed: {e}", subscription.endpoint);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Push broadcast: {}/{} delivered",
            report.delivered, report.subscribers
        );
        Ok(report)
    }
}
