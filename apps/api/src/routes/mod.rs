pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::memos::handlers as memos;
use crate::notify::handlers as notify;
use crate::oauth::handlers as oauth;
use crate::state::AppState;

const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Record Store (HTML)
        .route("/", get(memos::handle_index))
        .route(
            "/create",
            get(memos::handle_show_create).post(memos::handle_create),
        )
        .route("/memo/:id", get(memos::handle_view))
        .route(
            "/memo/:id/edit",
            get(memos::handle_edit_form).post(memos::handle_update),
        )
        .route("/memo/:id/delete", post(memos::handle_delete))
        .route(
            "/memo/:id/toggle_complete",
            post(memos::handle_toggle_complete),
        )
        .route("/memo/:id/summarize", post(memos::handle_summarize))
        .route("/memo/:id/send_mail", post(notify::handle_send_memo_mail))
        .route("/speech", post(memos::handle_speech))
        // Record Store (JSON)
        .route("/api/memos", get(memos::handle_api_list))
        .route("/api/memos/:id", get(memos::handle_api_get))
        // Push
        .route("/subscribe", post(notify::handle_subscribe))
        .route("/send_push", post(notify::handle_send_push))
        .route("/vapid_public_key", get(notify::handle_vapid_public_key))
        // Google sign-in and mail
        .route("/google_login", get(oauth::handle_google_login))
        .route("/google_callback", get(oauth::handle_google_callback))
        .route("/logout", get(oauth::handle_logout))
        .route("/send_test_mail", get(notify::handle_send_test_mail))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::{Config, GoogleConfig, OutboundConfig};
    use crate::memos::memory::InMemoryMemoRepository;
    use crate::memos::views::Views;
    use crate::models::memo::NewMemo;
    use crate::notify::mail::{GmailTransport, Mailer};
    use crate::notify::push::{PushService, SubscriptionRegistry};
    use crate::notify::Notifier;
    use crate::oauth::credentials::{InMemoryCredentialRepository, TokenProvider};
    use crate::oauth::session::{SessionStore, SESSION_COOKIE};
    use crate::oauth::{GoogleOAuthClient, TokenExchanger};
    use crate::outbound::RetryPolicy;
    use crate::summarize::{Summarizer, NO_CONTENT_SUMMARY};

    fn google_config() -> GoogleConfig {
        GoogleConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:5000/google_callback".to_string(),
        }
    }

    fn test_state(with_google: bool) -> AppState {
        let outbound = OutboundConfig::default();
        let retry = RetryPolicy::from_config(&outbound);
        let http = reqwest::Client::new();

        let google =
            with_google.then(|| GoogleOAuthClient::new(http.clone(), google_config(), retry));
        let exchanger = google
            .clone()
            .map(|g| Arc::new(g) as Arc<dyn TokenExchanger>);
        let tokens = TokenProvider::new(Arc::new(InMemoryCredentialRepository::new()), exchanger);

        let mailer = Mailer::new(
            Arc::new(GmailTransport::new(http, retry)),
            tokens.clone(),
            None,
        );
        let notifier = Notifier::new(PushService::new(SubscriptionRegistry::new(), None), mailer);

        AppState {
            memos: Arc::new(InMemoryMemoRepository::new()),
            sessions: SessionStore::new(),
            google,
            tokens,
            notifier,
            summarizer: Summarizer::disabled(),
            views: Arc::new(Views::new().unwrap()),
            config: Config {
                database_url: None,
                port: 5000,
                rust_log: "info".to_string(),
                anthropic_api_key: None,
                google: with_google.then(google_config),
                mail_recipient: None,
                vapid: None,
                outbound,
            },
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> Response {
        build_router(state.clone()).oneshot(request).await.unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn form_req(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_req(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap()
    }

    async fn seed(state: &AppState, title: &str, content: &str) -> Uuid {
        state
            .memos
            .create(NewMemo {
                title: title.to_string(),
                content: content.to_string(),
                deadline: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_health_reports_disabled_integrations() {
        let state = test_state(false);
        let response = send(&state, get_req("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["integrations"]["google"], false);
    }

    #[tokio::test]
    async fn test_create_then_list_contains_memo() {
        let state = test_state(false);
        let response = send(
            &state,
            form_req("/create", "title=Buy+milk&content=2L&deadline=2026-10-20T09:30"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let list = body_json(send(&state, get_req("/api/memos")).await).await;
        let memos = list.as_array().unwrap();
        assert_eq!(memos.len(), 1);
        assert_eq!(memos[0]["title"], "Buy milk");
        assert_eq!(memos[0]["completed"], false);
        assert_eq!(memos[0]["deadline"], "2026-10-20T09:30:00Z");

        let page = send(&state, get_req("/")).await;
        assert_eq!(page.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_without_title_is_rejected() {
        let state = test_state(false);
        let response = send(&state, form_req("/create", "title=++&content=x")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let list = body_json(send(&state, get_req("/api/memos")).await).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_memo_is_not_found() {
        let state = test_state(false);
        let id = seed(&state, "Temp", "").await;

        let response = send(&state, form_req(&format!("/memo/{id}/delete"), "")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = send(&state, get_req(&format!("/api/memos/{id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&state, get_req(&format!("/memo/{id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&state, form_req(&format!("/memo/{id}/delete"), "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_keeps_identity() {
        let state = test_state(false);
        let id = seed(&state, "Draft", "old").await;

        let response = send(
            &state,
            form_req(&format!("/memo/{id}/edit"), "title=Final&content=new&deadline="),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/memo/{id}"));

        let memo = state.memos.get(id).await.unwrap().unwrap();
        assert_eq!(memo.title, "Final");
        assert_eq!(memo.content, "new");
        assert_eq!(memo.deadline, None);
    }

    #[tokio::test]
    async fn test_toggle_complete_redirects_with_view_params() {
        let state = test_state(false);
        let id = seed(&state, "Laundry", "").await;

        let response = send(
            &state,
            form_req(
                &format!("/memo/{id}/toggle_complete"),
                "completed=True&sort=deadline_asc&filter=week",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/?sort=deadline_asc&filter=week");
        assert!(state.memos.get(id).await.unwrap().unwrap().completed);

        send(&state, form_req(&format!("/memo/{id}/toggle_complete"), "")).await;
        assert!(!state.memos.get(id).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn test_summarize_empty_memo_stores_placeholder() {
        let state = test_state(false);
        let id = seed(&state, "Empty", "   ").await;

        let response = send(&state, form_req(&format!("/memo/{id}/summarize"), "")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let memo = state.memos.get(id).await.unwrap().unwrap();
        assert_eq!(memo.summary.as_deref(), Some(NO_CONTENT_SUMMARY));
        assert_eq!(memo.title, "Empty");
    }

    #[tokio::test]
    async fn test_speech_creates_memo() {
        let state = test_state(false);
        let response = send(&state, json_req("/speech", r#"{"text":"call the dentist"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "call the dentist");

        let id: Uuid = body["memo_id"].as_str().unwrap().parse().unwrap();
        assert!(state.memos.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_subscribe_then_resubscribe() {
        let state = test_state(false);
        let body = r#"{"endpoint":"https://push.example/abc","keys":{"p256dh":"k","auth":"a"}}"#;

        let response = send(&state, json_req("/subscribe", body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = send(&state, json_req("/subscribe", body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["subscribers"], 1);
    }

    #[tokio::test]
    async fn test_send_push_without_subscribers_reports_zero() {
        let state = test_state(false);
        let response = send(&state, json_req("/send_push", r#"{"title":"t","body":"b"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["subscribers"], 0);
        assert_eq!(report["delivered"], 0);
    }

    #[tokio::test]
    async fn test_vapid_key_missing_is_not_found() {
        let state = test_state(false);
        let response = send(&state, get_req("/vapid_public_key")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_test_mail_requires_sign_in() {
        let state = test_state(true);
        let response = send(&state, get_req("/send_test_mail")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("/google_login"));
    }

    #[tokio::test]
    async fn test_google_login_unconfigured_is_unauthorized() {
        let state = test_state(false);
        let response = send(&state, get_req("/google_login")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_callback_with_forged_state_is_rejected() {
        let state = test_state(true);
        let response = send(&state, get_req("/google_login")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).starts_with("https://accounts.google.com/"));

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        let cookie = set_cookie.split(';').next().unwrap().to_string();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));

        let request = Request::builder()
            .uri("/google_callback?state=forged&code=abc")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stray_callback_keeps_signed_in_session() {
        let state = test_state(true);
        let sid = Uuid::new_v4();
        state
            .sessions
            .authenticate(sid, "me@example.com".to_string())
            .await;

        let request = Request::builder()
            .uri("/google_callback?state=whatever&code=abc")
            .header(header::COOKIE, format!("{SESSION_COOKIE}={sid}"))
            .body(Body::empty())
            .unwrap();
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            state.sessions.account(Some(sid)).await.as_deref(),
            Some("me@example.com")
        );
    }

    #[tokio::test]
    async fn test_callback_without_session_is_rejected() {
        let state = test_state(true);
        let response = send(&state, get_req("/google_callback?state=x&code=abc")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
