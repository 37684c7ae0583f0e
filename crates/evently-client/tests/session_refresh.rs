//! HTTP-level tests of the session manager: bearer attachment, the
//! single-flight 401 refresh, one-replay semantics, and state broadcast.

use std::sync::Arc;

use evently_client::{
    ClientConfig, Error, EventsClient, MemoryTokenStore, SessionState, TokenStore,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: server.uri(),
        ..ClientConfig::default()
    }
}

async fn client_with_token(server: &MockServer, token: &str) -> (EventsClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::default());
    store.save(token).await;
    let client = EventsClient::with_store(config_for(server), store.clone())
        .await
        .unwrap();
    (client, store)
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (client, _) = client_with_token(&server, "stale").await;

    // Distinct pages: three dispatches, no cache coalescing in the way.
    let mut tasks = Vec::new();
    for page in 0..3 {
        let client = client.clone();
        tasks.push(tokio::spawn(
            async move { client.events_page("", page).await },
        ));
    }
    for task in tasks {
        let rows = task.await.unwrap().unwrap();
        assert!(rows.is_empty());
    }
    assert_eq!(client.session().state(), SessionState::Authenticated);
}

#[tokio::test]
async fn replay_that_stays_unauthorized_surfaces_auth_expired() {
    let server = MockServer::start().await;

    // Always 401: exactly two hits prove one original send plus one replay.
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "stale").await;
    let error = client.events_page("", 0).await.unwrap_err();

    assert!(matches!(error, Error::AuthExpired));
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert_eq!(store.load().await, None);
}

#[tokio::test]
async fn refresh_failure_ends_the_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "stale").await;
    let error = client.events_page("", 0).await.unwrap_err();

    assert!(matches!(error, Error::AuthExpired));
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert!(!client.session().is_authenticated().await);
    assert_eq!(store.load().await, None);
}

#[tokio::test]
async fn login_persists_the_token_for_the_next_client() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "tok-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::default());
    let client = EventsClient::with_store(config_for(&server), store.clone())
        .await
        .unwrap();
    assert_eq!(client.session().state(), SessionState::Anonymous);

    client.login("organizer@example.com", "secret").await.unwrap();
    assert_eq!(client.session().state(), SessionState::Authenticated);
    assert_eq!(store.load().await.as_deref(), Some("tok-1"));

    // A later process restores the same session from the store.
    let restored = EventsClient::with_store(config_for(&server), store)
        .await
        .unwrap();
    assert_eq!(restored.session().state(), SessionState::Authenticated);
}

#[tokio::test]
async fn rejected_login_is_a_mutation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let client = EventsClient::new(config_for(&server)).await.unwrap();
    let error = client.login("organizer@example.com", "wrong").await.unwrap_err();

    assert!(matches!(error, Error::MutationFailed(_)));
    assert_eq!(client.session().state(), SessionState::Anonymous);
}

#[tokio::test]
async fn session_transitions_are_broadcast() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "tok-1" })))
        .mount(&server)
        .await;

    let client = EventsClient::new(config_for(&server)).await.unwrap();
    let mut states = client.session().subscribe();
    assert_eq!(*states.borrow_and_update(), SessionState::Anonymous);

    client.login("organizer@example.com", "secret").await.unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Authenticated);

    client.logout().await;
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Anonymous);
}
