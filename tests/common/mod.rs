//! Shared harness: an in-process stand-in for the remote BirdTag endpoints.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::json;

use birdtag::config::EndpointConfig;
use birdtag::session::{Profile, SessionStore, SessionTokens};

#[derive(Default)]
pub struct StubState {
    pub species_fetches: AtomicUsize,
    pub uploads: AtomicUsize,
    pub settings_saves: AtomicUsize,
}

/// An unexpired identity token of the same shape the provider issues.
pub fn live_token() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let claims = json!({ "exp": chrono::Utc::now().timestamp() + 3600 }).to_string();
    let payload = URL_SAFE_NO_PAD.encode(claims);
    format!("{header}.{payload}.sig")
}

pub fn expired_token() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let claims = json!({ "exp": chrono::Utc::now().timestamp() - 60 }).to_string();
    let payload = URL_SAFE_NO_PAD.encode(claims);
    format!("{header}.{payload}.sig")
}

pub fn sample_profile() -> Profile {
    Profile {
        email: "jane@example.com".to_string(),
        given_name: "Jane".to_string(),
        family_name: "Finch".to_string(),
        address: "1 Wattle St".to_string(),
    }
}

pub fn endpoints_for(base: &str) -> EndpointConfig {
    EndpointConfig {
        auth_url: base.to_string(),
        upload_url: format!("{base}/upload"),
        search_url: format!("{base}/search-s"),
        thumb_search_url: format!("{base}/search-t"),
        edit_url: format!("{base}/edit"),
        delete_url: format!("{base}/delete"),
        settings_url: format!("{base}/settings"),
    }
}

/// A session store holding a live signed-in session.
pub fn signed_in_store(dir: &Path) -> Arc<SessionStore> {
    let store = Arc::new(SessionStore::new(dir.join("session.json")));
    let tokens = SessionTokens {
        access_token: live_token(),
        id_token: live_token(),
    };
    store.set_session(tokens, sample_profile()).unwrap();
    store
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

async fn upload(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty body").into_response();
    }
    state.uploads.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "s3Url": "https://media.example/uploads/bird_observation_001.jpg",
        "s3Key": "uploads/bird_observation_001.jpg",
        "fileId": "file-001",
    }))
    .into_response()
}

async fn search_s(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    if params.is_empty() {
        state.species_fetches.fetch_add(1, Ordering::SeqCst);
        return Json(json!({ "species": ["Crow", "pigeon", "Sparrow", "crow"] })).into_response();
    }
    if params.contains_key("count1") {
        return Json(json!({ "links": ["https://media.example/thumb_counted.jpg"] })).into_response();
    }
    Json(json!({
        "links": [
            "https://media.example/thumb_bird1.jpg?sig=1",
            "https://media.example/song.mp4",
        ]
    }))
    .into_response()
}

async fn search_t(
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    match params.get("turl1") {
        Some(turl) if turl.starts_with("thumb_") => {
            Json(json!({ "links": ["https://media.example/bird1.jpg"] })).into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "At least one thumbnail url is required").into_response(),
    }
}

async fn edit(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    let urls = body.get("url").and_then(|u| u.as_array()).map(|u| u.len()).unwrap_or(0);
    let valid_op = matches!(body.get("operation").and_then(|o| o.as_u64()), Some(0 | 1));
    if urls == 0 || !valid_op {
        return (StatusCode::BAD_REQUEST, "Missing or invalid url/operation/tags").into_response();
    }
    Json(json!({ "message": format!("{urls} item(s) updated") })).into_response()
}

async fn delete_files(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    let links = body.get("links").and_then(|l| l.as_array()).map(|l| l.len()).unwrap_or(0);
    if links == 0 {
        return (StatusCode::BAD_REQUEST, "No URLs provided in the request").into_response();
    }
    Json(json!({ "message": "Deletion process completed" })).into_response()
}

async fn save_settings(State(state): State<Arc<StubState>>, headers: HeaderMap) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    state.settings_saves.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "message": "saved" })).into_response()
}

async fn reset_settings(headers: HeaderMap) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    StatusCode::OK.into_response()
}

async fn login(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    let password = body.get("password").and_then(|p| p.as_str()).unwrap_or_default();
    match password {
        "" | "wrong-password" => {
            (StatusCode::UNAUTHORIZED, "Incorrect username or password.").into_response()
        }
        "temporary-password" => {
            Json(json!({ "challenge": "NEW_PASSWORD_REQUIRED" })).into_response()
        }
        _ => Json(json!({
            "access_token": live_token(),
            "id_token": live_token(),
        }))
        .into_response(),
    }
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    if bearer(&headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }
    Json(json!({
        "email": "jane@example.com",
        "given_name": "Jane",
        "family_name": "Finch",
        "address": "1 Wattle St",
    }))
    .into_response()
}

async fn signup(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    match body.get("email").and_then(|e| e.as_str()) {
        Some(email) if email.contains('@') => StatusCode::OK.into_response(),
        _ => (StatusCode::BAD_REQUEST, "Invalid email address format.").into_response(),
    }
}

async fn confirm(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    match body.get("code").and_then(|c| c.as_str()) {
        Some("123456") => StatusCode::OK.into_response(),
        _ => (StatusCode::BAD_REQUEST, "Invalid verification code provided, please try again.")
            .into_response(),
    }
}

async fn resend() -> impl IntoResponse {
    StatusCode::OK
}

async fn logout() -> impl IntoResponse {
    StatusCode::OK
}

/// Bind the stub API on an ephemeral port and serve it for the rest of the
/// test. Returns the base URL and the counters.
pub async fn spawn_stub_api() -> (String, Arc<StubState>) {
    let state = Arc::new(StubState::default());
    let router = Router::new()
        .route("/upload", post(upload))
        .route("/search-s", get(search_s))
        .route("/search-t", get(search_t))
        .route("/edit", post(edit))
        .route("/delete", post(delete_files))
        .route("/settings", post(save_settings).delete(reset_settings))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/signup", post(signup))
        .route("/confirm", post(confirm))
        .route("/resend", post(resend))
        .route("/logout", post(logout))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), state)
}
