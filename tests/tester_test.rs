mod common;

use std::net::TcpListener;

use crm_bridge::engine::SyncEngine;
use crm_bridge::storage::Integration;

fn integration_for(login_url: String) -> Integration {
    Integration {
        name: "test-crm".to_string(),
        login_url,
        email: "ops@example.com".to_string(),
        ..Default::default()
    }
}

/// A port nothing listens on.
fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn unreachable_target_reports_a_network_failure() {
    let url = format!("http://127.0.0.1:{}/login", dead_port());
    let engine = SyncEngine::new();

    let result = engine.test_connection(&integration_for(url), "pw").await;

    assert!(!result.success);
    assert!(
        result.message.contains("network failure"),
        "message: {}",
        result.message
    );
}

#[tokio::test]
async fn http_rejection_reports_the_status() {
    let server = common::spawn(|_req| common::response(401, "Unauthorized", &[], "no"));
    let engine = SyncEngine::new();

    let result = engine
        .test_connection(&integration_for(format!("{}/login", server.url)), "pw")
        .await;

    assert!(!result.success);
    assert!(result.message.contains("401"), "message: {}", result.message);
}

#[tokio::test]
async fn missing_csrf_token_reports_the_selector() {
    let server = common::spawn(|_req| common::response(200, "OK", &[], "<html></html>"));
    let engine = SyncEngine::new();

    let mut integration = integration_for(format!("{}/login", server.url));
    integration.csrf_selector = Some(r#"input[name="_token"]"#.to_string());

    let result = engine.test_connection(&integration, "pw").await;

    assert!(!result.success);
    assert!(
        result.message.contains("CSRF token"),
        "message: {}",
        result.message
    );
}

#[tokio::test]
async fn successful_handshake_reports_the_jar_size() {
    let server = common::spawn(|_req| {
        common::response(200, "OK", &["Set-Cookie: sid=1"], "welcome")
    });
    let engine = SyncEngine::new();

    let result = engine
        .test_connection(&integration_for(format!("{}/login", server.url)), "pw")
        .await;

    assert!(result.success, "message: {}", result.message);
    assert!(result.message.contains("1 session cookie"));
    // The tester runs the handshake only: one request, no invoice creation.
    assert_eq!(server.recorded().len(), 1);
}
