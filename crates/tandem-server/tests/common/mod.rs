#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tandem_api::auth::TokenVerifier;
use tandem_db::{Database, LogStore, StoreConfig};
use tandem_server::build_router;

pub const SECRET: &str = "integration-test-secret";

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tandem_server_{}_{}.db", tag, uuid::Uuid::new_v4()))
}

pub struct TestApp {
    pub router: Router,
    pub verifier: TokenVerifier,
}

impl TestApp {
    pub fn new() -> anyhow::Result<Self> {
        let config = StoreConfig::default();
        let db = Arc::new(Database::open(&temp_path("rel"), config)?);
        let log = Arc::new(LogStore::open(&temp_path("log"), config)?);
        let verifier = TokenVerifier::new(SECRET);
        Ok(Self {
            router: build_router(db, log, verifier.clone()),
            verifier,
        })
    }

    pub fn token(&self, subject: &str) -> String {
        self.verifier
            .issue(subject, chrono::Duration::minutes(10))
            .expect("token issues")
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        subject: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(subject) = subject {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(subject)));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, value))
    }

    pub async fn register(&self, subject: &str, display_name: &str) -> anyhow::Result<i64> {
        let (status, body) = self
            .call(
                Method::POST,
                "/identities",
                Some(subject),
                Some(serde_json::json!({ "display_name": display_name })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {} {}", status, body);
        body["id"].as_i64().ok_or_else(|| anyhow::anyhow!("no id in {}", body))
    }
}
