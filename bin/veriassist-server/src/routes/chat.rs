//! Chat API: one streamed turn per `POST /api/chat`, history cleared by
//! `POST /api/reset`.
//!
//! Each client gets its own conversation, keyed by the `veriassist_session`
//! cookie.  Replies stream as plain UTF-8 text.  A backend failure after
//! streaming has started cannot change the status code any more, so it is
//! reported in-band as a final `\n[Error: <message>]` fragment.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};
use utoipa::OpenApi;
use veriassist_core::FragmentStream;

use crate::error::ServerError;
use crate::schemas::chat::{ChatForm, ErrorResponse, ResetResponse};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "veriassist_session";

const INVALID_METHOD: &str = "Invalid request method";

#[derive(OpenApi)]
#[openapi(
    paths(chat, reset),
    components(schemas(ChatForm, ResetResponse, ErrorResponse))
)]
pub struct ChatApi;

/// Register chat routes (nested under `/api`).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat).fallback(invalid_method))
        .route("/reset", post(reset).fallback(invalid_method))
}

/// Any method other than `POST`.
async fn invalid_method(method: Method) -> ServerError {
    debug!(%method, "rejecting non-POST chat request");
    ServerError::BadRequest(INVALID_METHOD.into())
}

/// Send one message and stream the assistant's reply.
///
/// The body is the reply text, fragment by fragment, as the model produces
/// it.  If the model fails mid-reply the body ends with
/// `\n[Error: <message>]` and the status stays 200.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body(content = ChatForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Reply text, streamed", body = String, content_type = "text/plain"),
        (status = 400, description = "Method other than POST", body = ErrorResponse),
        (status = 503, description = "Model backend not ready", body = ErrorResponse),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Result<Response, ServerError> {
    let message = match form {
        Ok(Form(form)) => form.message.unwrap_or_default(),
        Err(rejection) => {
            warn!(error = %rejection, "unreadable chat form; treating message as empty");
            String::new()
        }
    };

    state.readiness.wait(state.config.ready_wait).await?;

    let lookup = state.sessions.get_or_create(session_token(&headers).as_deref());
    info!(session = %lookup.token, message_len = message.len(), "chat message received");

    let body = Body::from_stream(relay(lookup.handle.generate(message)));
    let mut response = ([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response();
    if lookup.created {
        if let Some(cookie) = session_cookie(&lookup.token) {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

/// Clear the caller's conversation history.
#[utoipa::path(
    post,
    path = "/api/reset",
    tag = "chat",
    responses(
        (status = 200, description = "History cleared", body = ResetResponse),
        (status = 400, description = "Method other than POST", body = ErrorResponse),
    )
)]
pub async fn reset(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<ResetResponse> {
    match session_token(&headers).and_then(|token| state.sessions.get(&token)) {
        Some(handle) => handle.reset().await,
        None => debug!("reset for a client without history; nothing to clear"),
    }
    Json(ResetResponse { reset: true })
}

/// Turn fragments into body chunks; the stream's final error, if any,
/// becomes the in-band error marker.
fn relay(fragments: FragmentStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    fragments.map(|item| {
        let chunk = match item {
            Ok(fragment) => Bytes::from(fragment),
            Err(e) => {
                warn!(error = %e, "chat reply interrupted");
                Bytes::from(format!("\n[Error: {e}]"))
            }
        };
        Ok::<Bytes, Infallible>(chunk)
    })
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn session_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")).ok()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::routes::test_support::{app_in_state, body_text, ready_app};
    use crate::startup::{BackendState, Startup};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use veriassist_core::testing::{Reply, ScriptedBackend};
    use veriassist_core::{ChatMessage, KeepAlive, ProfileSpec, Role};

    const FORM: &str = "application/x-www-form-urlencoded";

    fn post_chat(body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(CONTENT_TYPE, FORM);
        if let Some(token) = cookie {
            builder = builder.header(COOKIE, format!("{SESSION_COOKIE}={token}"));
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    fn post_reset(cookie: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/reset")
            .header(COOKIE, format!("theme=dark; {SESSION_COOKIE}={cookie}"))
            .body(Body::empty())
            .unwrap()
    }

    /// Token from a `Set-Cookie` response header.
    fn issued_token(response: &Response) -> String {
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        let (pair, _) = cookie.split_once(';').unwrap();
        pair.strip_prefix(&format!("{SESSION_COOKIE}=")).unwrap().to_owned()
    }

    #[tokio::test]
    async fn get_is_rejected_without_touching_sessions() {
        let backend = Arc::new(ScriptedBackend::new());
        let (app, state) = ready_app(&backend);

        let response = app
            .oneshot(Request::builder().uri("/api/chat").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "error": "Invalid request method" }));
        assert_eq!(state.sessions.len(), 0);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn get_reset_is_rejected_too() {
        let (app, _) = ready_app(&Arc::new(ScriptedBackend::new()));
        let response = app
            .oneshot(Request::builder().uri("/api/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_streams_the_reply_as_plain_text() {
        let backend = Arc::new(
            ScriptedBackend::new().with_reply(Reply::fragments(&["Hello", ", ", "world"])),
        );
        let (app, state) = ready_app(&backend);

        let response = app.oneshot(post_chat("message=Hi", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        let token = issued_token(&response);
        assert_eq!(body_text(response).await, "Hello, world");

        let history = state.sessions.get(&token).unwrap().history().await;
        assert_eq!(
            history.messages(),
            &[ChatMessage::user("hi"), ChatMessage::assistant("Hello, world")]
        );
        assert_eq!(backend.requests()[0].keep_alive, KeepAlive::Forever);
    }

    #[tokio::test]
    async fn fragments_arrive_before_the_reply_finishes() {
        let backend = Arc::new(ScriptedBackend::new().with_reply(Reply::Hang(vec!["first".into()])));
        let (app, _) = ready_app(&backend);

        let response = app.oneshot(post_chat("message=hi", None)).await.unwrap();
        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from("first"));
    }

    #[tokio::test]
    async fn mid_stream_failure_is_reported_in_band() {
        let backend = Arc::new(
            ScriptedBackend::new().with_reply(Reply::fail_after(&["Partial"], "model crashed")),
        );
        let (app, state) = ready_app(&backend);

        let response = app.oneshot(post_chat("message=hi", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let token = issued_token(&response);
        let body = body_text(response).await;
        assert!(body.starts_with("Partial\n[Error: "), "{body}");
        assert!(body.ends_with("model crashed]"), "{body}");

        let history = state.sessions.get(&token).unwrap().history().await;
        assert_eq!(history.roles().collect::<Vec<_>>(), vec![Role::User]);
    }

    #[tokio::test]
    async fn missing_or_unreadable_message_is_an_empty_turn() {
        let backend = Arc::new(ScriptedBackend::new());
        let (app, _) = ready_app(&backend);

        let requests = [
            post_chat("message=", None),
            post_chat("other=1", None),
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"message":"hi"}"#))
                .unwrap(),
        ];
        for request in requests {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            // The turn runs as the body is read.
            assert_eq!(body_text(response).await, "ok");
        }

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        for request in requests {
            assert_eq!(request.messages, vec![ChatMessage::user("")]);
        }
    }

    #[tokio::test]
    async fn cookie_continues_the_conversation() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_reply(Reply::fragments(&["UVM is a methodology."]))
                .with_reply(Reply::fragments(&["Sure."])),
        );
        let (app, _) = ready_app(&backend);

        let first = app.clone().oneshot(post_chat("message=What+is+UVM%3F", None)).await.unwrap();
        let token = issued_token(&first);
        body_text(first).await;

        let second = app.oneshot(post_chat("message=Example", Some(&token))).await.unwrap();
        assert!(second.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_text(second).await, "Sure.");

        let requests = backend.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                ChatMessage::user("what is uvm?"),
                ChatMessage::assistant("UVM is a methodology."),
                ChatMessage::user("example"),
            ]
        );
    }

    #[tokio::test]
    async fn clients_do_not_share_history() {
        let backend = Arc::new(ScriptedBackend::new());
        let (app, state) = ready_app(&backend);

        let a = app.clone().oneshot(post_chat("message=one", None)).await.unwrap();
        let a_token = issued_token(&a);
        body_text(a).await;
        let b = app.oneshot(post_chat("message=two", None)).await.unwrap();
        let b_token = issued_token(&b);
        body_text(b).await;

        assert_ne!(a_token, b_token);
        assert_eq!(state.sessions.len(), 2);
        assert_eq!(backend.requests()[1].messages, vec![ChatMessage::user("two")]);
    }

    #[tokio::test]
    async fn reset_clears_only_the_callers_history() {
        let backend = Arc::new(ScriptedBackend::new());
        let (app, state) = ready_app(&backend);

        let a = app.clone().oneshot(post_chat("message=one", None)).await.unwrap();
        let a_token = issued_token(&a);
        body_text(a).await;
        let b = app.clone().oneshot(post_chat("message=two", None)).await.unwrap();
        let b_token = issued_token(&b);
        body_text(b).await;

        let response = app.clone().oneshot(post_reset(&a_token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "reset": true }));

        assert!(state.sessions.get(&a_token).unwrap().history().await.is_empty());
        assert_eq!(state.sessions.get(&b_token).unwrap().history().await.len(), 2);

        let again = app.oneshot(post_chat("message=three", Some(&a_token))).await.unwrap();
        body_text(again).await;
        assert_eq!(backend.requests()[2].messages, vec![ChatMessage::user("three")]);
    }

    #[tokio::test]
    async fn reset_without_a_session_still_succeeds() {
        let (app, state) = ready_app(&Arc::new(ScriptedBackend::new()));
        let response = app
            .oneshot(Request::builder().method("POST").uri("/api/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.sessions.len(), 0);
    }

    #[tokio::test]
    async fn failed_backend_refuses_chat_with_503() {
        let backend = Arc::new(ScriptedBackend::new());
        let (app, _) = app_in_state(&backend, BackendState::Failed("connection refused".into()));

        let response = app.oneshot(post_chat("message=hi", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn chat_recovers_when_the_backend_answers_late() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new().failing_pings(3));
        let (app, state) = app_in_state(&backend, BackendState::Initializing);
        let startup = Startup {
            launcher: None,
            backend: backend.clone(),
            profile: ProfileSpec::new("veriassist", "llama3.2", "You are VeriAssist."),
            artifact_dir: dir.path().to_path_buf(),
            probe_timeout: Duration::from_millis(300),
        };
        let task = tokio::spawn(startup.run(state.readiness.clone()));

        tokio::time::sleep(Duration::from_millis(400)).await;
        let refused = app.clone().oneshot(post_chat("message=hi", None)).await.unwrap();
        assert_eq!(refused.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(backend.requests().is_empty());

        task.await.unwrap();
        let response = app.oneshot(post_chat("message=hi", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
        assert_eq!(backend.requests().last().unwrap().messages, vec![ChatMessage::user("hi")]);
    }

    #[test]
    fn session_token_is_found_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; veriassist_session=abc ; b=2"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));

        headers.insert(COOKIE, HeaderValue::from_static("veriassist_session="));
        assert_eq!(session_token(&headers), None);

        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
