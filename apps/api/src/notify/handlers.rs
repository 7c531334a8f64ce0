use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::push::{PushMessage, PushReport, PushSubscription};
use crate::errors::AppError;
use crate::oauth::session::session_id;
use crate::state::AppState;

/// POST /subscribe
pub async fn handle_subscribe(
    State(state): State<AppState>,
    Json(subscription): Json<PushSubscription>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if subscription.endpoint.trim().is_empty() {
        return Err(AppError::Validation("endpoint is required".to_string()));
    }
    let registry = state.notifier.push().registry();
    let created = registry.register(subscription).await;
    let total = registry.len().await;
    info!("Push subscription registered ({total} total)");
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "subscribed": true, "subscribers": total }))))
}

/// POST /send_push
pub async fn handle_send_push(
    State(state): State<AppState>,
    Json(message): Json<PushMessage>,
) -> Result<Json<PushReport>, AppError> {
    let report = state
        .notifier
        .push()
        .broadcast(&message)
        .await
        .map_err(|e| AppError::ExternalProvider(e.to_string()))?;
    Ok(Json(report))
}

/// GET /vapid_public_key
pub async fn handle_vapid_public_key(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let vapid = state
        .config
        .vapid
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Push notifications are not configured".to_string()))?;
    Ok(Json(json!({ "public_key": vapid.public_key })))
}

/// GET /send_test_mail
pub async fn handle_send_test_mail(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, AppError> {
    let account = state.sessions.account(session_id(&jar)).await;
    let to = state
        .notifier
        .mailer()
        .send_test(account.as_deref())
        .await?;
    state
        .views
        .message("Mail sent", &format!("A test mail was sent to {to}."))
}

/// POST /memo/:id/send_mail
pub async fn handle_send_memo_mail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    jar: CookieJar,
) -> Result<Html<String>, AppError> {
    let memo = state
        .memos
        .get(id)
        .await?
        .ok_or_else(|| AppError::memo_not_found(id))?;
    let account = state.sessions.account(session_id(&jar)).await;
    let to = state
        .notifier
        .mailer()
        .send_memo(account.as_deref(), &memo)
        .await?;
    state.views.message(
        "Mail sent",
        &format!("\"{}\" was sent to {to}.", memo.title),
    )
}
