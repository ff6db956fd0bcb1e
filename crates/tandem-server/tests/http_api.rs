mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn health_needs_no_token() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let (status, body) = app.call(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
    Ok(())
}

#[tokio::test]
async fn protected_routes_reject_missing_or_forged_tokens() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, body) = app.call(Method::GET, "/conversations", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "auth_error");

    let forged = tandem_api::auth::TokenVerifier::new("someone-elses-secret")
        .issue("alice", chrono::Duration::minutes(5))?;
    let request = axum::http::Request::builder()
        .uri("/unread")
        .header("Authorization", format!("Bearer {}", forged))
        .body(axum::body::Body::empty())?;
    let response = tower::ServiceExt::oneshot(app.router.clone(), request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn onboarding_is_idempotent() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _) = app.call(Method::GET, "/identities/me", Some("alice"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = app.register("alice", "Alice").await?;
    let (status, body) = app
        .call(Method::POST, "/identities", Some("alice"), Some(json!({ "display_name": "Other" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["display_name"], "Alice");

    let (status, body) = app
        .call(Method::POST, "/identities", Some("bob"), Some(json!({ "display_name": "b" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = app.call(Method::GET, "/identities/me", Some("alice"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "alice");
    Ok(())
}

#[tokio::test]
async fn message_flow_over_http() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "Alice").await?;
    let bob = app.register("bob", "Bob").await?;

    let (status, sent) = app
        .call(
            Method::POST,
            "/messages",
            Some("alice"),
            Some(json!({ "receiver_subject": "bob", "text": "hi" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["seq"], 1);
    let conversation_id = sent["conversation_id"].as_i64().unwrap();

    let (_, unread) = app.call(Method::GET, "/unread", Some("bob"), None).await?;
    assert_eq!(unread, json!([{ "conversation_id": conversation_id, "count": 1 }]));

    let (_, list) = app.call(Method::GET, "/conversations", Some("alice"), None).await?;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    assert_eq!(list[0]["peer"]["id"], bob);
    assert_eq!(list[0]["unread"], 0);

    let (status, read) = app
        .call(Method::POST, &format!("/conversations/{}/read", conversation_id), Some("bob"), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["unread"], 0);

    for (text, token) in [("there", "t-1"), ("there", "t-1")] {
        app.call(
            Method::POST,
            "/messages",
            Some("alice"),
            Some(json!({ "receiver_subject": "bob", "text": text, "client_token": token })),
        )
        .await?;
    }

    let (_, history) = app
        .call(Method::GET, &format!("/conversations/{}/messages", conversation_id), Some("bob"), None)
        .await?;
    let texts: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["text"].as_str())
        .collect();
    assert_eq!(texts, ["hi", "there"]);

    let (_, page) = app
        .call(
            Method::GET,
            &format!("/conversations/{}/messages?after_seq=1&limit=10", conversation_id),
            Some("bob"),
            None,
        )
        .await?;
    assert_eq!(page[0]["seq"], 2);

    let (_, unread) = app.call(Method::GET, "/unread", Some("bob"), None).await?;
    assert_eq!(unread[0]["count"], 1);
    Ok(())
}

#[tokio::test]
async fn error_statuses_follow_the_failure() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "Alice").await?;
    app.register("bob", "Bob").await?;
    app.register("carol", "Carol").await?;

    let (_, conversation) = app
        .call(Method::POST, "/conversations", Some("alice"), Some(json!({ "peer_subject": "bob" })))
        .await?;
    let id = conversation["id"].as_i64().unwrap();

    let (status, body) = app
        .call(Method::GET, &format!("/conversations/{}/messages", id), Some("carol"), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app.call(Method::GET, "/conversations/424242", Some("alice"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            "/messages",
            Some("alice"),
            Some(json!({ "receiver_subject": "bob", "text": "   " })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/messages",
            Some("alice"),
            Some(json!({ "receiver_subject": "nobody", "text": "hello" })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::POST, "/conversations", Some("alice"), Some(json!({ "peer_subject": "alice" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed input gets the same JSON error body as domain failures.
    let malformed = [
        (Method::POST, "/messages".to_string(), Some(json!({ "receiver_subject": "bob" }))),
        (Method::POST, "/identities".to_string(), Some(json!({ "display_name": 42 }))),
        (Method::POST, "/conversations".to_string(), Some(json!({ "peer": "bob" }))),
        (Method::GET, "/conversations/abc/messages".to_string(), None),
        (Method::POST, "/conversations/abc/read".to_string(), None),
        (Method::GET, format!("/conversations/{}/messages?limit=-3", id), None),
        (Method::GET, format!("/conversations/{}/messages?after_seq=x", id), None),
    ];
    for (method, uri, body) in malformed {
        let (status, body) = app.call(method, &uri, Some("alice"), body).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "invalid_argument", "{}", uri);
        assert!(body["message"].is_string(), "{}", uri);
    }

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/messages")
        .header("Authorization", format!("Bearer {}", app.token("alice")))
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from("{not json"))?;
    let response = tower::ServiceExt::oneshot(app.router.clone(), request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn gateway_authenticates_before_upgrade() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _) = app.call(Method::GET, "/gateway", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(Method::GET, "/gateway?token=garbage", None, None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid credential, but the subject never onboarded.
    let token = app.token("stranger");
    let (status, _) = app
        .call(Method::GET, &format!("/gateway?token={}", token), None, None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
