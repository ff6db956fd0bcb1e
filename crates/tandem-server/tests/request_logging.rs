mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::http::{Method, StatusCode};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use common::TestApp;

/// Collects formatted log lines in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn gateway_query_token_stays_out_of_request_logs() -> anyhow::Result<()> {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("tandem=debug,tower_http=debug"))
        .with_writer(captured.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = TestApp::new()?;
    app.register("alice", "Alice").await?;

    // Valid token, but a plain request: rejected at the upgrade step.
    let token = app.token("alice");
    let (status, _) = app
        .call(Method::GET, &format!("/gateway?token={}", token), None, None)
        .await?;
    assert_ne!(status, StatusCode::SWITCHING_PROTOCOLS);

    let (status, _) = app
        .call(Method::GET, "/gateway?token=not-a-real-token-value", None, None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let logs = captured.text();
    assert!(logs.contains("/gateway"), "request was not traced: {}", logs);
    assert!(!logs.contains(&token));
    assert!(!logs.contains("not-a-real-token-value"));
    assert!(!logs.contains("token="));
    Ok(())
}
