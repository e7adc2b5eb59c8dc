//! End-to-end tests: full pipeline and handlers in front of a throwaway
//! backend listening on an ephemeral port.

use actix_middleware::GatewayMetrics;
use actix_web::http::StatusCode;
use actix_web::{test, web, App, HttpRequest, HttpResponse, HttpServer};
use api_gateway::config::Config;
use api_gateway::routes::RouteTable;
use api_gateway::{build_pipeline, handlers, GatewayState, SERVICE_NAME};
use async_trait::async_trait;
use crypto_core::{Role, TokenKind, TokenManager};
use redis_utils::{CounterStore, CounterStoreError, MemoryCounterStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const JWT_SECRET: &str = "integration-test-secret";

/// `{"qty":3}` gzip-compressed
const GZIP_BODY: [u8; 29] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xab, 0x56, 0x2a, 0x2c, 0xa9,
    0x54, 0xb2, 0x32, 0xae, 0x05, 0x00, 0x39, 0x55, 0xda, 0xf8, 0x09, 0x00, 0x00, 0x00,
];

/// Sized download spanning many stream chunks
fn large_body() -> Vec<u8> {
    (0..256 * 1024).map(|i| (i % 251) as u8).collect()
}

/// Echoes what the gateway forwarded, reading the payload undecoded
async fn echo(req: HttpRequest, payload: web::Payload) -> HttpResponse {
    if req.path().starts_with("/orders/slow") {
        actix_web::rt::time::sleep(Duration::from_secs(3)).await;
    }

    if req.path().starts_with("/files/large") {
        return HttpResponse::Ok()
            .content_type("application/octet-stream")
            .body(large_body());
    }

    let body = payload.to_bytes().await.unwrap_or_default();

    let status = if req.path().starts_with("/orders/missing") {
        StatusCode::NOT_FOUND
    } else if req.method() == actix_web::http::Method::POST {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let multi: Vec<&str> = req
        .headers()
        .get_all("x-multi")
        .filter_map(|v| v.to_str().ok())
        .collect();

    HttpResponse::build(status)
        .append_header(("X-Backend-Tag", "alpha"))
        .append_header(("X-Backend-Tag", "beta"))
        .json(json!({
            "method": req.method().as_str(),
            "path": req.path(),
            "query": req.query_string(),
            "body": String::from_utf8_lossy(&body),
            "len": body.len(),
            "content_encoding": req
                .headers()
                .get("content-encoding")
                .and_then(|v| v.to_str().ok()),
            "multi": multi,
            "authorization": req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
        }))
}

async fn spawn_backend() -> String {
    let server = HttpServer::new(|| App::new().default_service(web::to(echo)))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{addr}")
}

/// Address with nothing listening on it
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn config(backend: &str, overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("JWT_SECRET".to_string(), JWT_SECRET.to_string()),
        ("COUNTER_STORE".to_string(), "memory".to_string()),
    ]);
    for name in [
        "AUTH", "BUSINESS", "INVENTORY", "TRANSACTION", "FILE", "MENU", "ORDER", "TABLE",
    ] {
        vars.insert(format!("{name}_SERVICE_URL"), backend.to_string());
    }
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn tokens(config: &Config) -> TokenManager {
    config.jwt.token_manager().unwrap()
}

fn bearer(config: &Config, kind: TokenKind, user: Uuid) -> String {
    let token = tokens(config)
        .generate(kind, user, Uuid::new_v4(), Role::Staff)
        .unwrap();
    format!("Bearer {token}")
}

macro_rules! gateway {
    ($config:expr) => {
        gateway!($config, Arc::new(MemoryCounterStore::new()))
    };
    ($config:expr, $store:expr) => {{
        let config: &Config = &$config;
        let metrics = GatewayMetrics::new(SERVICE_NAME).unwrap();
        let routes = Arc::new(RouteTable::from_endpoints(&config.services));
        let state = web::Data::new(
            GatewayState::new(config, routes.clone(), metrics.clone()).unwrap(),
        );
        let store: Arc<dyn CounterStore> = $store;
        let pipeline = build_pipeline(config, tokens(config), store, metrics, routes);
        test::init_service(
            App::new()
                .wrap(pipeline)
                .configure(handlers::configure(state)),
        )
        .await
    }};
}

struct UnavailableStore;

#[async_trait]
impl CounterStore for UnavailableStore {
    async fn increment(&self, _key: &str) -> Result<i64, CounterStoreError> {
        Err(CounterStoreError::Timeout(Duration::from_millis(250)))
    }

    async fn expire(&self, _key: &str, _window: Duration) -> Result<(), CounterStoreError> {
        Err(CounterStoreError::Timeout(Duration::from_millis(250)))
    }
}

#[actix_web::test]
async fn test_health_is_public_and_has_cors_headers() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"status": "ok"}));
}

#[actix_web::test]
async fn test_preflight_answered_without_auth() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/api/v1/orders")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get("access-control-allow-methods").unwrap(),
        "POST, OPTIONS, GET, PUT, DELETE, PATCH"
    );
}

#[actix_web::test]
async fn test_missing_authorization_header() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get().uri("/api/v1/orders/42").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("access-control-allow-origin"));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "authorization header required"}));
}

#[actix_web::test]
async fn test_malformed_authorization_header() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/42")
        .insert_header(("Authorization", "Token abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "invalid authorization header format"}));
}

#[actix_web::test]
async fn test_token_signed_with_wrong_secret() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let foreign = TokenManager::with_derived_refresh(b"some-other-secret")
        .unwrap()
        .generate(TokenKind::Access, Uuid::new_v4(), Uuid::new_v4(), Role::Admin)
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/42")
        .insert_header(("Authorization", format!("Bearer {foreign}")))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "invalid token"}));
}

#[actix_web::test]
async fn test_refresh_token_not_accepted_as_access() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/42")
        .insert_header(("Authorization", bearer(&config, TokenKind::Refresh, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_unknown_service() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/unknown/x")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "service not found"}));
}

#[actix_web::test]
async fn test_unsupported_method_on_api_path() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::HEAD)
        .uri("/api/v1/orders")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[actix_web::test]
async fn test_proxy_passes_request_and_response_through() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[]);
    let app = gateway!(config);
    let auth = bearer(&config, TokenKind::Access, Uuid::new_v4());

    let req = test::TestRequest::post()
        .uri("/api/v1/orders/42?expand=items&tag=a&tag=b")
        .insert_header(("Authorization", auth.clone()))
        .append_header(("X-Multi", "one"))
        .append_header(("X-Multi", "two"))
        .set_payload(r#"{"qty":3}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let tags: Vec<_> = resp
        .headers()
        .get_all("x-backend-tag")
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(tags, vec!["alpha", "beta"]);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/orders/42");
    assert_eq!(body["query"], "expand=items&tag=a&tag=b");
    assert_eq!(body["body"], r#"{"qty":3}"#);
    assert_eq!(body["multi"], json!(["one", "two"]));
    assert_eq!(body["authorization"], auth);
}

#[actix_web::test]
async fn test_backend_error_status_passed_through() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/missing")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["path"], "/orders/missing");
}

#[actix_web::test]
async fn test_public_auth_endpoint_forwarded_without_token() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[("IP_RATE_LIMIT", "1")]);
    let app = gateway!(config);

    // Public paths skip the address limit, so repeated logins are fine
    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_payload(r#"{"email":"a@b.c"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["path"], "/auth/login");
    }
}

#[actix_web::test]
async fn test_unreachable_backend_returns_502() {
    let config = config(&closed_port_url(), &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/tables/7")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "failed to forward request"}));
}

#[actix_web::test]
async fn test_upstream_timeout_returns_502() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[("UPSTREAM_TIMEOUT_SECS", "1")]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/slow")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn test_address_rate_limit() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[("IP_RATE_LIMIT", "3")]);
    let app = gateway!(config);
    let auth = bearer(&config, TokenKind::Access, Uuid::new_v4());

    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/api/v1/menu")
            .insert_header(("Authorization", auth.clone()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/menu")
        .insert_header(("Authorization", auth.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "rate limit exceeded"}));
}

#[actix_web::test]
async fn test_user_rate_limit_spans_addresses() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[("USER_RATE_LIMIT", "2")]);
    let app = gateway!(config);
    let auth = bearer(&config, TokenKind::Access, Uuid::new_v4());

    let statuses: Vec<StatusCode> = {
        let mut statuses = Vec::new();
        for ip in ["198.51.100.1", "198.51.100.2", "198.51.100.3"] {
            let req = test::TestRequest::get()
                .uri("/api/v1/products")
                .insert_header(("Authorization", auth.clone()))
                .insert_header(("X-Forwarded-For", ip))
                .to_request();
            statuses.push(test::call_service(&app, req).await.status());
        }
        statuses
    };

    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[actix_web::test]
async fn test_counter_store_failure_fails_closed() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config, Arc::new(UnavailableStore));

    let req = test::TestRequest::get()
        .uri("/api/v1/orders")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "failed to process rate limit"}));

    // Public paths never touch the store
    let req = test::TestRequest::get().uri("/health").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_metrics_use_route_patterns() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/orders/3f2a9c")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/v1/unknown/1")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains(r#"path="/api/v1/orders/*""#));
    assert!(!text.contains("3f2a9c"));
    assert!(text.contains(r#"path="undefined""#));
    assert!(text.contains(r#"error_type="client_error""#));
    assert!(text.contains("upstream_requests_total"));
}

#[actix_web::test]
async fn test_unknown_top_level_path() {
    let config = config("http://localhost:8081", &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/favicon.ico")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "not found"}));
}

#[actix_web::test]
async fn test_oversized_body_rejected() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[("MAX_BODY_BYTES", "16")]);
    let app = gateway!(config);

    let req = test::TestRequest::post()
        .uri("/api/v1/files/upload")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .set_payload(vec![b'x'; 64])
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "request body too large"}));
}

#[actix_web::test]
async fn test_compressed_body_forwarded_verbatim() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[]);
    let app = gateway!(config);
    let auth = bearer(&config, TokenKind::Access, Uuid::new_v4());

    let req = test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header(("Authorization", auth.clone()))
        .set_payload(GZIP_BODY.to_vec())
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["len"], GZIP_BODY.len());
    assert_eq!(body["content_encoding"], Value::Null);

    let req = test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header(("Authorization", auth))
        .insert_header(("Content-Encoding", "gzip"))
        .set_payload(GZIP_BODY.to_vec())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["len"], GZIP_BODY.len());
    assert_eq!(body["content_encoding"], "gzip");
}

#[actix_web::test]
async fn test_large_sized_response_streamed_through() {
    let backend = spawn_backend().await;
    let config = config(&backend, &[]);
    let app = gateway!(config);

    let req = test::TestRequest::get()
        .uri("/api/v1/files/large")
        .insert_header(("Authorization", bearer(&config, TokenKind::Access, Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let expected = large_body();
    assert_eq!(
        resp.headers().get("content-length").unwrap(),
        expected.len().to_string().as_str()
    );
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert!(resp.headers().contains_key("access-control-allow-origin"));

    let body = test::read_body(resp).await;
    assert_eq!(body.len(), expected.len());
    assert_eq!(body.as_ref(), expected.as_slice());
}
