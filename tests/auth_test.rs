mod common;

use std::sync::Arc;

use birdtag::auth::AuthClient;
use birdtag::error::BirdTagError;
use birdtag::session::{SessionStore, SessionTokens};

use common::{endpoints_for, expired_token, live_token, sample_profile, spawn_stub_api};

fn empty_store(dir: &tempfile::TempDir) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(dir.path().join("session.json")))
}

#[tokio::test]
async fn login_stores_tokens_and_profile() {
    let (base, _state) = spawn_stub_api().await;
    let dir = tempfile::tempdir().unwrap();
    let store = empty_store(&dir);
    let auth = AuthClient::new(Arc::new(endpoints_for(&base)), store.clone());

    let profile = auth.login("jane@example.com", "correct-horse").await.unwrap();
    assert_eq!(profile, sample_profile());
    assert!(store.token().is_some());
    assert!(store.access_token().is_some());
    assert_eq!(store.user(), Some(sample_profile()));
    assert!(auth.is_authenticated());
}

#[tokio::test]
async fn login_failure_surfaces_provider_message() {
    let (base, _state) = spawn_stub_api().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = AuthClient::new(Arc::new(endpoints_for(&base)), empty_store(&dir));

    let err = auth.login("jane@example.com", "wrong-password").await.unwrap_err();
    match err {
        BirdTagError::Api { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Incorrect username or password"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn new_password_challenge_is_reported_not_swallowed() {
    let (base, _state) = spawn_stub_api().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = AuthClient::new(Arc::new(endpoints_for(&base)), empty_store(&dir));

    let err = auth.login("jane@example.com", "temporary-password").await.unwrap_err();
    assert!(matches!(err, BirdTagError::UnsupportedChallenge(c) if c == "NEW_PASSWORD_REQUIRED"));
}

#[tokio::test]
async fn signup_and_confirm_flow_tracks_the_pending_email() {
    let (base, _state) = spawn_stub_api().await;
    let dir = tempfile::tempdir().unwrap();
    let store = empty_store(&dir);
    let auth = AuthClient::new(Arc::new(endpoints_for(&base)), store.clone());

    auth.register("jane@example.com", "1 Wattle St", "Jane", "Finch", "hunter22hunter")
        .await
        .unwrap();
    assert_eq!(store.pending_email().as_deref(), Some("jane@example.com"));

    let err = auth.confirm("jane@example.com", "000000").await.unwrap_err();
    assert!(matches!(err, BirdTagError::Api { status: 400, .. }));
    assert_eq!(store.pending_email().as_deref(), Some("jane@example.com"));

    auth.confirm("jane@example.com", "123456").await.unwrap();
    assert_eq!(store.pending_email(), None);
}

#[tokio::test]
async fn registration_rejects_missing_fields_before_any_request() {
    // unreachable endpoint proves validation happens first
    let dir = tempfile::tempdir().unwrap();
    let auth = AuthClient::new(Arc::new(endpoints_for("http://127.0.0.1:1")), empty_store(&dir));

    let err = auth.register("", "1 Wattle St", "Jane", "Finch", "pw").await.unwrap_err();
    assert!(matches!(err, BirdTagError::Validation(_)));
}

#[tokio::test]
async fn logout_clears_the_session_even_when_the_provider_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let store = empty_store(&dir);
    store
        .set_session(
            SessionTokens { access_token: live_token(), id_token: live_token() },
            sample_profile(),
        )
        .unwrap();

    let auth = AuthClient::new(Arc::new(endpoints_for("http://127.0.0.1:1")), store.clone());
    auth.logout().await.unwrap();
    assert_eq!(store.token(), None);
    assert_eq!(store.user(), None);
}

#[tokio::test]
async fn expired_session_is_not_authenticated() {
    let dir = tempfile::tempdir().unwrap();
    let store = empty_store(&dir);
    store
        .set_session(
            SessionTokens { access_token: expired_token(), id_token: expired_token() },
            sample_profile(),
        )
        .unwrap();

    let auth = AuthClient::new(Arc::new(endpoints_for("http://127.0.0.1:1")), store);
    assert!(!auth.is_authenticated());
}
