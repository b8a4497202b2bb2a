//! Integration tests for the session store against a mock auth service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forum_client::{
    AuthClient, AuthError, FileStorage, MemoryStorage, RegistrationError, Role, Session,
    SessionStorage, SessionStore, StorageError,
};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> SessionStore {
    SessionStore::new(
        AuthClient::new(format!("{}/api", server.uri())),
        MemoryStorage::new(),
    )
}

fn carol() -> Session {
    Session {
        token: "old".into(),
        user_id: 3,
        username: "carol".into(),
        role: Role::Member,
    }
}

async fn mount_login(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_commits_full_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "alice", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t1",
            "user": {"id": 7, "role": "member"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let session = store.authenticate("alice", "pw").await.expect("login should succeed");

    let expected = Session {
        token: "t1".into(),
        user_id: 7,
        username: "alice".into(),
        role: Role::Member,
    };
    assert_eq!(session, expected);
    assert_eq!(store.current(), Some(expected));
    assert!(!store.is_admin());
}

#[tokio::test]
async fn admin_role_is_recognised() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "token": "t2",
            "user": {"id": 1, "role": "admin"}
        })),
    )
    .await;

    let store = store_for(&server);
    store.authenticate("root", "pw").await.unwrap();
    assert!(store.is_admin());
}

#[tokio::test]
async fn rejected_login_surfaces_body_and_keeps_state() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(401).set_body_string("invalid credentials\n"),
    )
    .await;

    let store = SessionStore::new(
        AuthClient::new(format!("{}/api", server.uri())),
        MemoryStorage::with_session(carol()),
    );
    let before = store.current();

    let err = store.authenticate("alice", "wrong").await.unwrap_err();
    match err {
        AuthError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid credentials");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert_eq!(store.current(), before);
}

#[tokio::test]
async fn empty_rejection_body_gets_generic_message() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(500)).await;

    let store = store_for(&server);
    let err = store.authenticate("alice", "pw").await.unwrap_err();
    assert_eq!(err.to_string(), "Login failed");
    assert!(store.current().is_none());
}

#[tokio::test]
async fn response_without_user_or_token_is_invalid() {
    let cases = [
        json!({"token": "t1"}),
        json!({"token": "t1", "user": {"role": "member"}}),
        json!({"user": {"id": 7}}),
        json!({"token": "", "user": {"id": 7}}),
    ];
    for body in cases {
        let server = MockServer::start().await;
        mount_login(&server, ResponseTemplate::new(200).set_body_json(body.clone())).await;

        let store = store_for(&server);
        let err = store.authenticate("alice", "pw").await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidResponse(_)),
            "body {body} gave {err:?}"
        );
        assert!(store.current().is_none(), "body {body} mutated the store");
    }
}

#[tokio::test]
async fn non_json_success_body_is_invalid() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;

    let store = store_for(&server);
    let err = store.authenticate("alice", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_auth_service_is_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let store = SessionStore::new(
        AuthClient::new(format!("http://127.0.0.1:{port}/api")),
        MemoryStorage::new(),
    );

    let err = store.authenticate("alice", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::Network(_)));
    assert!(store.current().is_none());
}

#[tokio::test]
async fn logout_during_login_does_not_resurrect_session() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"token": "late", "user": {"id": 9, "role": "member"}}))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    let store = store_for(&server);
    let pending = {
        let store = store.clone();
        tokio::spawn(async move { store.authenticate("dave", "pw").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.logout();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(AuthError::Superseded)));
    assert!(store.current().is_none());
}

#[tokio::test]
async fn logout_always_clears() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"token": "t1", "user": {"id": 7}})),
    )
    .await;

    let store = store_for(&server);
    store.logout();
    assert!(store.current().is_none());

    store.authenticate("alice", "pw").await.unwrap();
    assert!(store.is_logged_in());
    store.logout();
    assert!(store.current().is_none());
    store.logout();
    assert!(store.current().is_none());
}

#[tokio::test]
async fn observers_and_subscribers_see_login_and_logout() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"token": "t1", "user": {"id": 7}})),
    )
    .await;

    let store = store_for(&server);
    let logins = Arc::new(AtomicUsize::new(0));
    let logouts = Arc::new(AtomicUsize::new(0));
    {
        let logins = logins.clone();
        let logouts = logouts.clone();
        store.on_change(move |s| {
            let counter = if s.is_some() { &logins } else { &logouts };
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mut rx = store.subscribe();

    store.authenticate("alice", "pw").await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.user_id), Some(7));

    store.logout();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_none());

    assert_eq!(logins.load(Ordering::SeqCst), 1);
    assert_eq!(logouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn decorate_request_follows_session() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"token": "t1", "user": {"id": 7}})),
    )
    .await;

    let store = store_for(&server);
    assert!(store.decorate_request(HeaderMap::new()).get(AUTHORIZATION).is_none());

    store.authenticate("alice", "pw").await.unwrap();
    let headers = store.decorate_request(HeaderMap::new());
    assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer t1");

    store.logout();
    assert!(store.decorate_request(HeaderMap::new()).get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn session_survives_store_rebuild_with_file_storage() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"token": "t1", "user": {"id": 7, "role": "admin"}})),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let auth = AuthClient::new(format!("{}/api", server.uri()));

    let first = SessionStore::new(auth.clone(), FileStorage::new(&session_path));
    let session = first.authenticate("alice", "pw").await.unwrap();
    drop(first);

    let second = SessionStore::new(auth.clone(), FileStorage::new(&session_path));
    assert_eq!(second.current(), Some(session));

    second.logout();
    assert!(!session_path.exists());
    let third = SessionStore::new(auth, FileStorage::new(&session_path));
    assert!(third.current().is_none());
}

#[tokio::test]
async fn failed_login_leaves_persisted_session_alone() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(403).set_body_string("banned")).await;

    let storage = Arc::new(MemoryStorage::with_session(carol()));
    let store = SessionStore::new(
        AuthClient::new(format!("{}/api", server.uri())),
        storage.clone(),
    );
    assert!(store.authenticate("carol", "pw").await.is_err());
    assert_eq!(storage.load().unwrap(), Some(carol()));
}

/// Holds a session but refuses to persist a new one.
struct ReadOnlyStorage(Session);

impl SessionStorage for ReadOnlyStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        Ok(Some(self.0.clone()))
    }

    fn save(&self, _session: &Session) -> Result<(), StorageError> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    }

    fn clear(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[tokio::test]
async fn persist_failure_leaves_session_unchanged() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"token": "t1", "user": {"id": 7}})),
    )
    .await;

    let store = SessionStore::new(
        AuthClient::new(format!("{}/api", server.uri())),
        ReadOnlyStorage(carol()),
    );
    let notified = Arc::new(AtomicUsize::new(0));
    {
        let notified = notified.clone();
        store.on_change(move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        });
    }
    let rx = store.subscribe();

    let err = store.authenticate("alice", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::Storage(StorageError::Io(_))), "got {err:?}");
    assert_eq!(store.current(), Some(carol()));
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn register_succeeds_without_touching_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_json(json!({
            "email": "e@example.com",
            "username": "erin",
            "password": "pw"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "welcome"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let result = store
        .register("e@example.com", "erin", "pw")
        .await
        .expect("registration should succeed");
    assert_eq!(result.message.as_deref(), Some("welcome"));
    assert!(store.current().is_none());
}

#[tokio::test]
async fn register_rejection_uses_message_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "user exists"})))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.register("e@example.com", "erin", "pw").await.unwrap_err();
    match err {
        RegistrationError::Rejected { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "user exists");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn register_rejection_falls_back_to_body_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Method not allowed"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.register("e@example.com", "erin", "pw").await.unwrap_err();
    assert_eq!(err.to_string(), "Method not allowed");
}
