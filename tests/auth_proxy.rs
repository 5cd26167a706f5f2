mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::TestApp;

#[tokio::test]
async fn login_is_relayed_byte_for_byte() {
    let upstream = MockServer::start().await;
    let raw = r#"{"email":"a@example.com","password":"<secret>"}"#;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_string(raw))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "abc" })))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = TestApp::with_services("http://127.0.0.1:9", &upstream.uri());
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(raw))
        .unwrap();
    let (status, body) = app.send(req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], "abc");
}

#[tokio::test]
async fn upstream_errors_keep_their_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/all"))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "admins only" })))
        .mount(&upstream)
        .await;

    let app = TestApp::with_services("http://127.0.0.1:9", &upstream.uri());
    let req = Request::builder()
        .uri("/auth/all")
        .header("authorization", "Bearer t0k")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "admins only");
}

#[tokio::test]
async fn query_string_and_path_params_survive() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/google/callback"))
        .and(query_param("code", "xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/user-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "user-42" })))
        .mount(&upstream)
        .await;

    let app = TestApp::with_services("http://127.0.0.1:9", &upstream.uri());

    let req = Request::builder()
        .uri("/auth/google/callback?code=xyz")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let req = Request::builder().uri("/auth/user-42").body(Body::empty()).unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "user-42");
}

#[tokio::test]
async fn unreachable_auth_service_is_503() {
    let app = TestApp::with_services("http://127.0.0.1:9", "http://127.0.0.1:9");
    let req = Request::builder()
        .method("POST")
        .uri("/auth/signup")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = app.send(req).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service Unavailable");
    assert_eq!(body["message"], "Authentication service is not available");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = TestApp::new();
    let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
}
