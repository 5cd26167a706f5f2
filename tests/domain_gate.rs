mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::{json_request, TestApp};

fn public_get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn whitelisted_referer_gets_public_view() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &["example.com"]);

    let (status, body) = app
        .send(public_get(
            &format!("/api/public/chatbots/{}", bot.id),
            &[("referer", "https://example.com/pricing")],
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], bot.id);
    assert_eq!(body["data"]["name"], "Support");
    assert!(body["data"].get("systemPrompt").is_none());
    assert!(body["data"].get("userId").is_none());
}

#[tokio::test]
async fn foreign_origin_is_rejected_with_diagnostics() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &["example.com"]);

    let (status, body) = app
        .send(public_get(
            &format!("/api/public/chatbots/{}", bot.id),
            &[("x-parent-url", "https://evil.com/page"), ("referer", "https://example.com/")],
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Domain not whitelisted for this chatbot");
    assert_eq!(body["details"]["requestDomain"], "evil.com");
    assert_eq!(body["details"]["parentUrl"], "https://evil.com/page");
    assert_eq!(body["details"]["allowedDomains"], json!(["example.com"]));
}

#[tokio::test]
async fn wildcard_pattern_admits_subdomains_only_on_dot_boundary() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &["*.example.com"]);
    let uri = format!("/api/public/chatbots/{}", bot.id);

    let (ok, _) = app
        .send(public_get(&uri, &[("origin", "https://shop.example.com")]))
        .await;
    assert_eq!(ok, StatusCode::OK);

    let (denied, _) = app
        .send(public_get(&uri, &[("origin", "https://evilexample.com")]))
        .await;
    assert_eq!(denied, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn non_embeddable_chatbot_is_forbidden_even_when_whitelisted() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", false, &["example.com"]);

    let (status, body) = app
        .send(public_get(
            &format!("/api/public/chatbots/{}", bot.id),
            &[("referer", "https://example.com/")],
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "This chatbot is not embeddable");
}

#[tokio::test]
async fn empty_whitelist_admits_any_origin() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &[]);

    let (status, _) = app
        .send(public_get(&format!("/api/public/chatbots/{}", bot.id), &[]))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unresolvable_origin_is_forbidden_when_whitelist_is_set() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &["example.com"]);

    let (status, body) = app
        .send(public_get(&format!("/api/public/chatbots/{}", bot.id), &[]))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Could not determine request origin");
}

#[tokio::test]
async fn unknown_chatbot_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .send(public_get(
            "/api/public/chatbots/0123456789abcdef01234567",
            &[("referer", "https://example.com/")],
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Chatbot not found");
}

#[tokio::test]
async fn embed_key_route_uses_the_same_gate() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &["localhost:3000"]);
    let uri = format!("/api/public/embed/{}", bot.embed_key);

    let (status, body) = app
        .send(public_get(&uri, &[("referer", "http://localhost:3000/demo")]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["embedKey"], bot.embed_key);

    // Port is part of the host.
    let (status, _) = app
        .send(public_get(&uri, &[("referer", "http://localhost:4000/demo")]))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_token_outlives_the_gate_but_not_embeddability() {
    let app = TestApp::new();
    let bot = app.seed_chatbot("owner-1", true, &["example.com"]);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/public/chatbots/{}/session", bot.id))
        .header("referer", "https://example.com/")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["chatbotId"], bot.id);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/api/public/session/chat",
            Some(&token),
            Some(json!({ "message": "hi" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["response"], "Hello from the bot");

    app.state
        .store
        .update(
            &bot.id,
            botdesk::chatbot::ChatbotPatch {
                is_embeddable: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    let (status, _) = app
        .send(json_request("GET", "/api/public/session/history", Some(&token), None))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_routes_reject_user_tokens() {
    let app = TestApp::new();
    let token = common::user_token("owner-1");
    let (status, _) = app
        .send(json_request("GET", "/api/public/session/history", Some(&token), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
