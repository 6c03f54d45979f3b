//! Integration tests for the auth interceptor using wiremock.
//!
//! These tests mock the authentication service and a protected procedure
//! and check what the client sends and what ends up in the session store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use rig_client::auth::{Credential, FileSessionStore, MemorySessionStore, SessionStore, TokenPair};
use rig_client::models::GetResponse;
use rig_client::procedures;
use rig_client::rpc::stream::{encode_envelope, FLAG_END_STREAM};
use rig_client::rpc::{
    Interceptor, RpcClient, RpcError, Spec, StreamType, StreamingHandlerConn, UnaryRequest,
};
use rig_client::{Client, ClientBuilder, ClientConfig, Code, RefreshPolicy};

const USER_CREATE: &str = "/api.v1.user.Service/Create";

/// Unsigned JWT expiring `offset_secs` from now.
fn jwt_expiring_in(offset_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    let payload = URL_SAFE_NO_PAD.encode(json!({"sub": "user-1", "exp": exp}).to_string());
    format!("{}.{}.sig", header, payload)
}

fn token_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token": {"accessToken": access, "refreshToken": refresh}
    }))
}

fn create_test_client(
    server: &MockServer,
    store: Arc<dyn SessionStore>,
    credential: Option<Credential>,
) -> Client {
    create_test_client_with_policy(server, store, credential, RefreshPolicy::default())
}

fn create_test_client_with_policy(
    server: &MockServer,
    store: Arc<dyn SessionStore>,
    credential: Option<Credential>,
    policy: RefreshPolicy,
) -> Client {
    ClientBuilder::from_config(ClientConfig {
        host: server.uri(),
        credential,
    })
    .session_store(store)
    .http_client(reqwest::Client::new())
    .refresh_policy(policy)
    .build()
    .expect("client should build")
}

fn jwt_without_exp() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-1"}"#);
    format!("{}.{}.sig", header, payload)
}

async fn mount_get(server: &MockServer, bearer: &str) {
    Mock::given(method("POST"))
        .and(path(procedures::GET))
        .and(header("authorization", bearer))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"userInfo": {"email": "foo@example.com"}})),
        )
        .expect(1)
        .named("Get")
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, procedure: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == procedure)
        .collect()
}

#[tokio::test]
async fn test_login_with_client_credentials_on_empty_store() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::LOGIN))
        .and(body_json(
            json!({"clientCredentials": {"clientId": "c1", "clientSecret": "s1"}}),
        ))
        .respond_with(token_response("tok1", "ref1"))
        .expect(1)
        .named("Login")
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("unexpected", "unexpected"))
        .expect(0)
        .mount(&server)
        .await;
    mount_get(&server, "Bearer tok1").await;

    let store = Arc::new(MemorySessionStore::new());
    let client = create_test_client(
        &server,
        store.clone(),
        Some(Credential::client_credentials("c1", "s1")),
    );

    let res: GetResponse = client.authentication().get().await.unwrap();
    assert_eq!(res.user_info.unwrap().email, "foo@example.com");
    assert_eq!(store.tokens(), TokenPair::new("tok1", "ref1"));

    // The login request itself went out without credentials
    let logins = requests_to(&server, procedures::LOGIN).await;
    assert!(logins[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_second_call_reuses_session() {
    let server = MockServer::start().await;
    let fresh = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path(procedures::LOGIN))
        .respond_with(token_response(&fresh, "ref1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(USER_CREATE))
        .and(header("authorization", format!("Bearer {}", fresh).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let client = create_test_client(
        &server,
        Arc::new(MemorySessionStore::new()),
        Some(Credential::client_credentials("c1", "s1")),
    );

    for _ in 0..2 {
        let _: serde_json::Value = client.user().call("Create", &json!({})).await.unwrap();
    }
}

#[tokio::test]
async fn test_exempt_procedures_never_exchange_or_mutate_store() {
    let server = MockServer::start().await;

    // Every exempt procedure answers; only the direct calls should arrive.
    for procedure in procedures::AUTH_EXEMPT {
        Mock::given(method("POST"))
            .and(path(procedure))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let store = Arc::new(MemorySessionStore::new());
    let client = create_test_client(
        &server,
        store.clone(),
        Some(Credential::client_credentials("c1", "s1")),
    );

    for procedure in procedures::AUTH_EXEMPT {
        let _: serde_json::Value = client.rpc().unary(procedure, &json!({})).await.unwrap();
    }

    assert!(store.tokens().is_empty());
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), procedures::AUTH_EXEMPT.len());
    assert!(received
        .iter()
        .all(|r| r.headers.get("authorization").is_none()));
}

#[tokio::test]
async fn test_fresh_token_is_not_refreshed() {
    let server = MockServer::start().await;
    let fresh = jwt_expiring_in(120);

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(0)
        .mount(&server)
        .await;
    mount_get(&server, &format!("Bearer {}", fresh)).await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(&fresh, "ref1")));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.tokens(), TokenPair::new(&fresh, "ref1"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .and(body_json(json!({"refreshToken": "ref1"})))
        .respond_with(token_response("tok2", "ref2"))
        .expect(1)
        .named("RefreshToken")
        .mount(&server)
        .await;
    mount_get(&server, "Bearer tok2").await;

    let expired = jwt_expiring_in(-5);
    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(expired, "ref1")));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.tokens(), TokenPair::new("tok2", "ref2"));
}

#[tokio::test]
async fn test_token_at_margin_boundary_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, "Bearer tok2").await;

    let at_margin = jwt_expiring_in(30);
    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(at_margin, "ref1")));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.access_token(), "tok2");
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_token() {
    let server = MockServer::start().await;
    let stale = jwt_expiring_in(-60);

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"code": "unauthenticated", "message": "refresh token revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, &format!("Bearer {}", stale)).await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(&stale, "ref1")));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.tokens(), TokenPair::new(&stale, "ref1"));
}

#[tokio::test]
async fn test_refresh_response_without_token_keeps_stale_token() {
    let server = MockServer::start().await;
    let stale = jwt_expiring_in(-60);

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, &format!("Bearer {}", stale)).await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(&stale, "ref1")));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.access_token(), stale);
}

#[tokio::test]
async fn test_undecodable_token_is_forwarded_without_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(0)
        .mount(&server)
        .await;
    mount_get(&server, "Bearer opaque-token").await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(
        "opaque-token",
        "ref1",
    )));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.tokens(), TokenPair::new("opaque-token", "ref1"));
}

#[tokio::test]
async fn test_token_without_exp_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, "Bearer tok2").await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(
        jwt_without_exp(),
        "ref1",
    )));
    let client = create_test_client(&server, store.clone(), None);

    client.authentication().get().await.unwrap();
    assert_eq!(store.access_token(), "tok2");
}

#[tokio::test]
async fn test_wider_margin_refreshes_earlier() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .and(body_json(json!({"refreshToken": "ref1"})))
        .respond_with(token_response("tok2", "ref2"))
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, "Bearer tok2").await;

    // Outside the default 30 s margin but inside 120 s
    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(
        jwt_expiring_in(60),
        "ref1",
    )));
    let policy = RefreshPolicy {
        margin: chrono::Duration::seconds(120),
        ..RefreshPolicy::default()
    };
    let client = create_test_client_with_policy(&server, store.clone(), None, policy);

    client.authentication().get().await.unwrap();
    assert_eq!(store.tokens(), TokenPair::new("tok2", "ref2"));
}

#[tokio::test]
async fn test_token_without_exp_is_kept_when_policy_says_so() {
    let server = MockServer::start().await;
    let no_exp = jwt_without_exp();

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(0)
        .mount(&server)
        .await;
    mount_get(&server, &format!("Bearer {}", no_exp)).await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(&no_exp, "ref1")));
    let policy = RefreshPolicy {
        refresh_without_expiry: false,
        ..RefreshPolicy::default()
    };
    let client = create_test_client_with_policy(&server, store.clone(), None, policy);

    client.authentication().get().await.unwrap();
    assert_eq!(store.tokens(), TokenPair::new(&no_exp, "ref1"));
}

#[tokio::test]
async fn test_failed_login_forwards_call_and_surfaces_server_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::LOGIN))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"code": "unauthenticated", "message": "bad secret"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(procedures::GET))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"code": "unauthenticated", "message": "missing token"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::new());
    let client = create_test_client(
        &server,
        store.clone(),
        Some(Credential::client_credentials("c1", "wrong")),
    );

    let err = client.authentication().get().await.unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert!(err.to_string().contains("missing token"));
    assert!(store.tokens().is_empty());

    // Still stamped, just without a token
    let gets = requests_to(&server, procedures::GET).await;
    let auth = gets[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert_eq!(auth.trim_end(), "Bearer");
}

#[tokio::test]
async fn test_no_session_and_no_credential_still_forwards() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(USER_CREATE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::new());
    let client = create_test_client(&server, store.clone(), None);

    let _: serde_json::Value = client.user().call("Create", &json!({})).await.unwrap();
    assert!(store.tokens().is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_set_access_token_is_used_for_next_call() {
    let server = MockServer::start().await;
    let fresh = jwt_expiring_in(3600);
    mount_get(&server, &format!("Bearer {}", fresh)).await;

    let client = create_test_client(&server, Arc::new(MemorySessionStore::new()), None);
    client.set_access_token(&fresh, "R");
    assert_eq!(client.tokens(), TokenPair::new(&fresh, "R"));

    client.authentication().get().await.unwrap();
}

#[tokio::test]
async fn test_file_store_keeps_refreshed_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, "Bearer tok2").await;

    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let store = Arc::new(FileSessionStore::new(&session_path));
    store.set_tokens(&jwt_expiring_in(-5), "ref1");

    let client = create_test_client(&server, store, None);
    client.authentication().get().await.unwrap();

    let reopened = FileSessionStore::new(&session_path);
    assert_eq!(reopened.tokens(), TokenPair::new("tok2", "ref2"));
}

#[tokio::test]
async fn test_streaming_client_carries_bearer_before_send() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::LOGIN))
        .respond_with(token_response("tok1", "ref1"))
        .expect(1)
        .mount(&server)
        .await;

    let mut body = Vec::new();
    encode_envelope(0, br#"{"n":1}"#, &mut body).unwrap();
    encode_envelope(0, br#"{"n":2}"#, &mut body).unwrap();
    encode_envelope(
        FLAG_END_STREAM,
        br#"{"metadata":{"x-count":["2"]}}"#,
        &mut body,
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/api.v1.capsule.Service/Logs"))
        .and(header("authorization", "Bearer tok1"))
        .and(header("content-type", "application/connect+json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/connect+json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(
        &server,
        Arc::new(MemorySessionStore::new()),
        Some(Credential::client_credentials("c1", "s1")),
    );

    let mut conn = client
        .capsule()
        .stream("Logs", StreamType::ServerStream)
        .await
        .unwrap();
    assert_eq!(
        conn.request_headers().get("authorization").unwrap(),
        "Bearer tok1"
    );

    conn.send(&json!({"capsuleId": "api"})).unwrap();
    let response = conn.close_and_receive::<serde_json::Value>().await.unwrap();
    assert_eq!(response.messages, vec![json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(response.trailers["x-count"], vec!["2".to_string()]);
}

#[tokio::test]
async fn test_streaming_error_trailer_is_returned() {
    let server = MockServer::start().await;

    let mut body = Vec::new();
    encode_envelope(
        FLAG_END_STREAM,
        br#"{"error":{"code":"unauthenticated","message":"expired"}}"#,
        &mut body,
    )
    .unwrap();
    Mock::given(method("POST"))
        .and(path("/api.v1.capsule.Service/Logs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/connect+json"),
        )
        .mount(&server)
        .await;

    let client = create_test_client(&server, Arc::new(MemorySessionStore::new()), None);
    let conn = client
        .capsule()
        .stream("Logs", StreamType::ServerStream)
        .await
        .unwrap();
    let err = conn
        .close_and_receive::<serde_json::Value>()
        .await
        .unwrap_err();
    assert!(err.is_unauthenticated());
}

#[tokio::test]
async fn test_stream_without_end_message_is_invalid() {
    let server = MockServer::start().await;

    let mut body = Vec::new();
    encode_envelope(0, br#"{"n":1}"#, &mut body).unwrap();
    Mock::given(method("POST"))
        .and(path("/api.v1.capsule.Service/Logs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/connect+json"),
        )
        .mount(&server)
        .await;

    let client = create_test_client(&server, Arc::new(MemorySessionStore::new()), None);
    let conn = client
        .capsule()
        .stream("Logs", StreamType::ServerStream)
        .await
        .unwrap();
    let err = conn
        .close_and_receive::<serde_json::Value>()
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unary_deadline_does_not_cut_off_streams() {
    let server = MockServer::start().await;

    let mut body = Vec::new();
    encode_envelope(FLAG_END_STREAM, b"{}", &mut body).unwrap();
    Mock::given(method("POST"))
        .and(path("/api.v1.capsule.Service/Logs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "application/connect+json")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(USER_CREATE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let rpc = RpcClient::new(reqwest::Client::new(), server.uri())
        .with_unary_timeout(Duration::from_millis(100));

    let err = rpc
        .unary::<_, serde_json::Value>(USER_CREATE, &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);

    let conn = rpc
        .stream("/api.v1.capsule.Service/Logs", StreamType::ServerStream)
        .await
        .unwrap();
    let response = conn.close_and_receive::<serde_json::Value>().await.unwrap();
    assert!(response.messages.is_empty());
}

#[tokio::test]
async fn test_streaming_handler_is_authorized_before_handler_runs() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(token_response("tok2", "ref2"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(
        jwt_expiring_in(-5),
        "ref1",
    )));
    let client = create_test_client(&server, store.clone(), None);

    let mut incoming = Vec::new();
    encode_envelope(0, br#""ping""#, &mut incoming).unwrap();
    let conn = StreamingHandlerConn::new(
        Spec::new("/api.v1.cluster.Service/Watch", StreamType::BidiStream),
        reqwest::header::HeaderMap::new(),
        &incoming,
    )
    .unwrap();

    let (auth, first) = client
        .rpc()
        .handle_stream(conn, |mut conn| async move {
            let auth = conn
                .request_headers()
                .get("authorization")
                .map(|v| v.to_str().unwrap_or_default().to_string());
            let first: Option<String> = conn.receive()?;
            Ok::<_, RpcError>((auth, first))
        })
        .await
        .unwrap();

    assert_eq!(auth.as_deref(), Some("Bearer tok2"));
    assert_eq!(first.as_deref(), Some("ping"));
    assert_eq!(store.access_token(), "tok2");
}

/// Records the authorization header each unary call carries when it
/// reaches this interceptor.
#[derive(Default)]
struct RecordingInterceptor {
    seen: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl Interceptor for RecordingInterceptor {
    async fn intercept_unary(&self, request: &mut UnaryRequest) -> Result<(), RpcError> {
        let auth = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push(auth);
        request
            .headers_mut()
            .insert("x-request-source", "integration-test".parse().unwrap());
        Ok(())
    }
}

#[tokio::test]
async fn test_extra_interceptors_run_after_auth() {
    let server = MockServer::start().await;
    let fresh = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path(procedures::GET))
        .and(header("x-request-source", "integration-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(RecordingInterceptor::default());
    let client = ClientBuilder::from_config(ClientConfig {
        host: server.uri(),
        credential: None,
    })
    .http_client(reqwest::Client::new())
    .interceptor(recorder.clone())
    .build()
    .unwrap();
    client.set_access_token(&fresh, "ref1");

    client.authentication().get().await.unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[Some(format!("Bearer {}", fresh))]);
}

struct RejectingInterceptor;

#[async_trait]
impl Interceptor for RejectingInterceptor {
    async fn intercept_unary(&self, _request: &mut UnaryRequest) -> Result<(), RpcError> {
        Err(RpcError::Status {
            code: Code::PermissionDenied,
            message: "blocked by policy".to_string(),
        })
    }
}

#[tokio::test]
async fn test_interceptor_error_aborts_call() {
    let server = MockServer::start().await;

    let client = ClientBuilder::from_config(ClientConfig {
        host: server.uri(),
        credential: None,
    })
    .http_client(reqwest::Client::new())
    .interceptor(Arc::new(RejectingInterceptor))
    .build()
    .unwrap();

    let err = client.authentication().get().await.unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Concurrent calls that all see an expiring token each refresh; nothing
/// serializes them, and the store keeps whichever pair was written last.
#[tokio::test]
async fn test_concurrent_refreshes_last_writer_wins() {
    const CALLS: usize = 4;

    let server = MockServer::start().await;
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = issued.clone();

    Mock::given(method("POST"))
        .and(path(procedures::REFRESH_TOKEN))
        .respond_with(move |_: &Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            token_response(&format!("tok-{}", n), &format!("ref-{}", n))
                .set_delay(Duration::from_millis(100))
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(procedures::GET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(CALLS as u64)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new(
        jwt_expiring_in(-5),
        "ref0",
    )));
    let client = create_test_client(&server, store.clone(), None);

    let calls = (0..CALLS).map(|_| {
        let client = client.clone();
        async move { client.authentication().get().await }
    });
    let results = futures::future::join_all(calls).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let refreshes = requests_to(&server, procedures::REFRESH_TOKEN).await.len();
    assert!(refreshes > 1, "expected duplicate refreshes, got {refreshes}");
    assert!(refreshes <= CALLS);
    assert_eq!(refreshes, issued.load(Ordering::SeqCst));

    // Whatever pair landed last is complete, never a mix of two responses
    let tokens = store.tokens();
    let n = tokens.access_token.trim_start_matches("tok-");
    assert_eq!(tokens.refresh_token, format!("ref-{}", n));
}
