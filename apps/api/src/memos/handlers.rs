use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::forms::{MemoForm, SpeechRequest, ToggleForm};
use super::query::{ListParams, ListQuery};
use crate::errors::AppError;
use crate::models::memo::Memo;
use crate::oauth::session::session_id;
use crate::state::AppState;

async fn load(state: &AppState, id: Uuid) -> Result<Memo, AppError> {
    state
        .memos
        .get(id)
        .await?
        .ok_or_else(|| AppError::memo_not_found(id))
}

/// Hands the new memo to the notifier on a background task so the response
/// does not wait on push or mail providers.
async fn notify_created(state: &AppState, jar: &CookieJar, memo: &Memo) {
    let account = state.sessions.account(session_id(jar)).await;
    let notifier = state.notifier.clone();
    let memo = memo.clone();
    tokio::spawn(async move {
        notifier.memo_created(&memo, account.as_deref()).await;
    });
}

/// `/` with the list view parameters preserved.
fn index_location(sort: Option<&str>, filter: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    if let Some(sort) = sort.filter(|s| !s.is_empty()) {
        query.append_pair("sort", sort);
    }
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        query.append_pair("filter", filter);
    }
    let query = query.finish();
    if query.is_empty() {
        "/".to_string()
    } else {
        format!("/?{query}")
    }
}

/// GET /
pub async fn handle_index(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Html<String>, AppError> {
    let query = ListQuery::from(&params);
    let memos = state.memos.list(query, Utc::now()).await?;
    state.views.index(&memos, query)
}

/// GET /create
pub async fn handle_show_create(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    state.views.create_form()
}

/// POST /create
pub async fn handle_create(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<MemoForm>,
) -> Result<Redirect, AppError> {
    let memo = state.memos.create(form.into_new_memo()?).await?;
    notify_created(&state, &jar, &memo).await;
    Ok(Redirect::to("/"))
}

/// GET /memo/:id
pub async fn handle_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let memo = load(&state, id).await?;
    state.views.memo(&memo)
}

/// GET /memo/:id/edit
pub async fn handle_edit_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let memo = load(&state, id).await?;
    state.views.edit_form(&memo)
}

/// POST /memo/:id/edit
pub async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<MemoForm>,
) -> Result<Redirect, AppError> {
    let update = form.into_update()?;
    state
        .memos
        .update(id, update)
        .await?
        .ok_or_else(|| AppError::memo_not_found(id))?;
    Ok(Redirect::to(&format!("/memo/{id}")))
}

/// POST /memo/:id/delete
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    if !state.memos.delete(id).await? {
        return Err(AppError::memo_not_found(id));
    }
    Ok(Redirect::to("/"))
}

/// POST /memo/:id/toggle_complete
pub async fn handle_toggle_complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<ToggleForm>,
) -> Result<Redirect, AppError> {
    state
        .memos
        .set_completed(id, form.completed())
        .await?
        .ok_or_else(|| AppError::memo_not_found(id))?;
    Ok(Redirect::to(&index_location(
        form.sort.as_deref(),
        form.filter.as_deref(),
    )))
}

/// POST /memo/:id/summarize
pub async fn handle_summarize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    let memo = load(&state, id).await?;
    let summary = state.summarizer.summarize(&memo.content).await;
    state
        .memos
        .set_summary(id, &summary)
        .await?
        .ok_or_else(|| AppError::memo_not_found(id))?;
    info!("Stored summary for memo {id}");
    Ok(Redirect::to(&format!("/memo/{id}")))
}

#[derive(Debug, Serialize)]
pub struct SpeechMemoResponse {
    pub memo_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// POST /speech
/// Creates a memo from a voice transcript.
pub async fn handle_speech(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SpeechRequest>,
) -> Result<Json<SpeechMemoResponse>, AppError> {
    let memo = state.memos.create(req.into_new_memo()?).await?;
    notify_created(&state, &jar, &memo).await;
    Ok(Json(SpeechMemoResponse {
        memo_id: memo.id,
        title: memo.title,
        created_at: memo.created_at,
    }))
}

/// GET /api/memos
pub async fn handle_api_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Memo>>, AppError> {
    let memos = state
        .memos
        .list(ListQuery::from(&params), Utc::now())
        .await?;
    Ok(Json(memos))
}

/// GET /api/memos/:id
pub async fn handle_api_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Memo>, AppError> {
    Ok(Json(load(&state, id).await?))
}
