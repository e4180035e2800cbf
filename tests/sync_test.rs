mod common;

use std::collections::HashMap;

use crm_bridge::engine::http::build_client;
use crm_bridge::engine::{sync, Session};
use crm_bridge::mapping::{ClientContext, InvoiceContext, SyncContext};
use crm_bridge::storage::Integration;
use crm_bridge::Error;

fn integration_for(url: &str) -> Integration {
    let mut field_mapping = HashMap::new();
    field_mapping.insert("company".to_string(), "{{client.name}}".to_string());
    field_mapping.insert("number".to_string(), "{{invoice.number}}".to_string());

    let mut static_fields = HashMap::new();
    static_fields.insert("kind".to_string(), "vat".to_string());

    Integration {
        name: "test-crm".to_string(),
        create_invoice_url: format!("{}/invoices", url),
        create_invoice_method: "POST".to_string(),
        field_mapping,
        static_fields,
        ..Default::default()
    }
}

fn context() -> SyncContext {
    SyncContext {
        client: ClientContext {
            name: Some("Acme Corp".to_string()),
            ..Default::default()
        },
        invoice: InvoiceContext {
            number: Some("123".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn mapped_body_is_form_encoded_and_submitted() {
    let server = common::spawn(|_req| common::response(200, "OK", &[], r#"{"id":17}"#));

    let client = build_client();
    let mut session = Session::new();
    let result = sync::create_invoice(&client, &integration_for(&server.url), &mut session, &context())
        .await
        .unwrap();

    assert_eq!(result.external_ref.as_deref(), Some("17"));

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].path, "/invoices");
    // static_fields underlay + resolved mapping, form encoded.
    assert_eq!(recorded[0].body, "company=Acme+Corp&kind=vat&number=123");
}

#[tokio::test]
async fn json_content_type_switches_the_body_encoding() {
    let server = common::spawn(|_req| common::response(201, "Created", &[], r#"{"id":9}"#));

    let mut integration = integration_for(&server.url);
    integration
        .headers
        .insert("Content-Type".to_string(), "application/json".to_string());

    let client = build_client();
    let mut session = Session::new();
    sync::create_invoice(&client, &integration, &mut session, &context())
        .await
        .unwrap();

    let recorded = server.recorded();
    assert!(recorded[0].headers.get("content-type").unwrap().contains("json"));
    let body: serde_json::Value = serde_json::from_str(&recorded[0].body).unwrap();
    assert_eq!(body["company"], "Acme Corp");
    assert_eq!(body["kind"], "vat");
    assert_eq!(body["number"], "123");
}

#[tokio::test]
async fn session_cookies_and_csrf_are_replayed() {
    let login_server = common::spawn(|_req| {
        common::response(200, "OK", &["Set-Cookie: sid=s3cr3t"], "ok")
    });
    let create_server = common::spawn(|_req| common::response(200, "OK", &[], "{}"));

    let client = build_client();

    let mut login_integration = Integration {
        login_url: format!("{}/login", login_server.url),
        email: "ops@example.com".to_string(),
        ..Default::default()
    };
    login_integration.csrf_header = Some("X-CSRF-Token".to_string());

    let manager = crm_bridge::engine::SessionManager::new(client.clone());
    let mut session = manager.authenticate(&login_integration, "pw").await.unwrap();
    session.csrf_token = Some("tok-7".to_string());

    let mut integration = integration_for(&create_server.url);
    integration.csrf_header = Some("X-CSRF-Token".to_string());

    sync::create_invoice(&client, &integration, &mut session, &context())
        .await
        .unwrap();

    let recorded = create_server.recorded();
    assert!(recorded[0].headers.get("cookie").unwrap().contains("sid=s3cr3t"));
    assert_eq!(recorded[0].headers.get("x-csrf-token").unwrap(), "tok-7");
}

#[tokio::test]
async fn non_2xx_is_a_sync_error_with_the_status() {
    let server =
        common::spawn(|_req| common::response(422, "Unprocessable Entity", &[], "bad nip"));

    let client = build_client();
    let mut session = Session::new();
    let err = sync::create_invoice(&client, &integration_for(&server.url), &mut session, &context())
        .await
        .unwrap_err();

    match err {
        Error::Sync { status, message } => {
            assert_eq!(status, Some(422));
            assert!(message.contains("bad nip"));
        }
        other => panic!("expected sync error, got {:?}", other),
    }
}

#[tokio::test]
async fn embedded_error_payload_fails_a_2xx_response() {
    let server = common::spawn(|_req| {
        common::response(200, "OK", &[], r#"{"error":"duplicate invoice number"}"#)
    });

    let client = build_client();
    let mut session = Session::new();
    let err = sync::create_invoice(&client, &integration_for(&server.url), &mut session, &context())
        .await
        .unwrap_err();

    match err {
        Error::Sync { message, .. } => assert!(message.contains("duplicate invoice number")),
        other => panic!("expected sync error, got {:?}", other),
    }
}

#[tokio::test]
async fn unresolved_placeholder_aborts_before_any_request() {
    let server = common::spawn(|_req| common::response(200, "OK", &[], "{}"));

    let mut integration = integration_for(&server.url);
    integration
        .field_mapping
        .insert("nip".to_string(), "{{client.nip}}".to_string());

    let client = build_client();
    let mut session = Session::new();
    let err = sync::create_invoice(&client, &integration, &mut session, &context())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Mapping(_)));
    // The remote system never saw a request.
    assert!(server.recorded().is_empty());
}
