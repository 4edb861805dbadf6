//! `HttpTicketQuery` against a stub ticket service: bearer auth, one shared
//! token refresh per rejection, and session expiry.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use civic_sync::auth::{AuthSession, HttpTokenRefresher, StaticToken, TokenRefresher};
use civic_sync::error::{ErrorKind, SyncError};
use civic_sync::filter::FilterState;
use civic_sync::query::{FetchRequest, HttpTicketQuery, TicketQuery, build_client};

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

fn page_body() -> serde_json::Value {
    json!({
        "records": [{
            "id": "T-1",
            "title": "Pothole on Main St",
            "status": "open",
            "category": "roads",
            "priority": "high",
            "created_at": "2026-03-01T09:00:00Z",
            "updated_at": "2026-03-01T09:00:00Z"
        }],
        "page_count": 1,
        "total_count": 1
    })
}

fn query_with<R: TokenRefresher>(server: &MockServer, refresher: R) -> HttpTicketQuery<R> {
    let client = build_client(Duration::from_secs(5)).unwrap();
    let session = AuthSession::new(SecretString::from("stale".to_string()), refresher);
    HttpTicketQuery::new(client, &base_url(server), session).unwrap()
}

fn refreshing_query(server: &MockServer) -> HttpTicketQuery<HttpTokenRefresher> {
    let client = build_client(Duration::from_secs(5)).unwrap();
    let refresher = HttpTokenRefresher::new(
        client,
        &base_url(server),
        SecretString::from("refresh-1".to_string()),
    )
    .unwrap();
    query_with(server, refresher)
}

fn request() -> FetchRequest {
    FetchRequest::new(1, FilterState::default())
}

async fn mount_tickets(server: &MockServer, token: &str, status: u16, times: u64) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(page_body())
    } else {
        ResponseTemplate::new(status)
    };
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn fresh_token() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" }))
}

async fn ticket_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/tickets")
        .count()
}

#[tokio::test]
async fn test_filters_travel_as_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .and(header("authorization", "Bearer stale"))
        .and(query_param("sort", "created_at"))
        .and(query_param("order", "desc"))
        .and(query_param("page", "0"))
        .and(query_param("page_size", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body()))
        .expect(1)
        .mount(&server)
        .await;

    let query = query_with(&server, StaticToken);
    let page = query.fetch(&request()).await.unwrap();
    assert_eq!(page.records[0].id, "T-1");
    assert_eq!(page.total_count, Some(1));
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_resent_once() {
    let server = MockServer::start().await;
    mount_tickets(&server, "stale", 401, 1).await;
    mount_tickets(&server, "fresh", 200, 1).await;
    mount_refresh(&server, fresh_token(), 1).await;

    let query = refreshing_query(&server);
    let page = query.fetch(&request()).await.unwrap();

    assert_eq!(page.records.len(), 1);
    assert_eq!(query.session().refresh_count(), 1);
    assert!(!query.session().is_expired());
    assert_eq!(ticket_requests(&server).await, 2);
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let server = MockServer::start().await;
    mount_tickets(&server, "stale", 401, 3).await;
    mount_tickets(&server, "fresh", 200, 3).await;
    mount_refresh(
        &server,
        fresh_token().set_delay(Duration::from_millis(200)),
        1,
    )
    .await;

    let query = refreshing_query(&server);
    let (req_a, req_b, req_c) = (request(), request(), request());
    let (a, b, c) = tokio::join!(
        query.fetch(&req_a),
        query.fetch(&req_b),
        query.fetch(&req_c),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(query.session().refresh_count(), 1);
    // Each request was sent once with the stale token and once with the fresh one
    assert_eq!(ticket_requests(&server).await, 6);
}

#[tokio::test]
async fn test_second_rejection_expires_session() {
    let server = MockServer::start().await;
    mount_tickets(&server, "stale", 401, 1).await;
    mount_tickets(&server, "fresh", 403, 1).await;
    mount_refresh(&server, fresh_token(), 1).await;

    let query = refreshing_query(&server);
    let mut expired = query.session().on_session_expired();
    let result = query.fetch(&request()).await;

    assert!(matches!(result, Err(SyncError::SessionExpired(_))));
    assert!(query.session().is_expired());
    assert!(expired.has_changed().unwrap());
    assert_eq!(query.session().refresh_count(), 1);
    assert_eq!(ticket_requests(&server).await, 2);
}

#[tokio::test]
async fn test_failed_refresh_surfaces_session_expired() {
    let server = MockServer::start().await;
    mount_tickets(&server, "stale", 401, 1).await;
    mount_tickets(&server, "fresh", 200, 0).await;
    mount_refresh(&server, ResponseTemplate::new(401), 1).await;

    let query = refreshing_query(&server);
    let result = query.fetch(&request()).await;

    let err = result.unwrap_err();
    assert!(err.is_session_fatal(), "unexpected error: {err}");
    assert!(query.session().is_expired());
    // No resend without a new token
    assert_eq!(ticket_requests(&server).await, 1);
}

#[tokio::test]
async fn test_static_token_rejection_expires_session() {
    let server = MockServer::start().await;
    mount_tickets(&server, "stale", 401, 1).await;

    let query = query_with(&server, StaticToken);
    let result = query.fetch(&request()).await;

    assert!(matches!(result, Err(SyncError::SessionExpired(_))));
    assert!(query.session().is_expired());
}

#[tokio::test]
async fn test_server_error_does_not_refresh() {
    let server = MockServer::start().await;
    mount_tickets(&server, "stale", 503, 1).await;
    mount_refresh(&server, fresh_token(), 0).await;

    let query = refreshing_query(&server);
    let err = query.fetch(&request()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(!err.is_session_fatal());
    assert_eq!(query.session().refresh_count(), 0);
}

#[tokio::test]
async fn test_undecodable_page_is_a_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let query = query_with(&server, StaticToken);
    let err = query.fetch(&request()).await.unwrap_err();
    assert!(matches!(err, SyncError::MalformedResponse(_)));
    assert_eq!(err.kind(), ErrorKind::Server);
}
