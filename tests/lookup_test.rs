mod common;

use crm_bridge::engine::http::build_client;
use crm_bridge::engine::{lookup, Session};
use crm_bridge::storage::Integration;
use crm_bridge::Error;

fn integration_for(url: &str) -> Integration {
    Integration {
        name: "test-crm".to_string(),
        list_invoices_url: Some(format!("{}/invoices", url)),
        invoice_number_prefix: Some("FS/".to_string()),
        invoice_number_suffix: Some("/MCG".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn prefixed_remote_number_matches_the_local_one() {
    let server = common::spawn(|_req| {
        common::response(
            200,
            "OK",
            &[],
            r#"{"data":[
                {"number":"FS/122/MCG","pdf_url":"https://crm.test/pdf/122"},
                {"number":"FS/123/MCG","pdf_url":"https://crm.test/pdf/123"}
            ]}"#,
        )
    });

    let client = build_client();
    let mut session = Session::new();
    let result = lookup::find_invoice_pdf(&client, &integration_for(&server.url), &mut session, "123")
        .await
        .unwrap();

    assert_eq!(result.pdf_url, "https://crm.test/pdf/123");
}

#[tokio::test]
async fn top_level_array_listings_are_accepted() {
    let server = common::spawn(|_req| {
        common::response(
            200,
            "OK",
            &[],
            r#"[{"number":"FS/7/MCG","url":"https://crm.test/doc/7"}]"#,
        )
    });

    let client = build_client();
    let mut session = Session::new();
    let result = lookup::find_invoice_pdf(&client, &integration_for(&server.url), &mut session, "7")
        .await
        .unwrap();

    assert_eq!(result.pdf_url, "https://crm.test/doc/7");
}

#[tokio::test]
async fn zero_matches_is_a_lookup_error() {
    let server = common::spawn(|_req| {
        common::response(200, "OK", &[], r#"{"data":[{"number":"FS/1/MCG","pdf_url":"x"}]}"#)
    });

    let client = build_client();
    let mut session = Session::new();
    let err = lookup::find_invoice_pdf(&client, &integration_for(&server.url), &mut session, "999")
        .await
        .unwrap_err();

    match err {
        Error::Lookup(message) => assert!(message.contains("999")),
        other => panic!("expected lookup error, got {:?}", other),
    }
}

#[tokio::test]
async fn duplicate_matches_prefer_the_most_recent() {
    let server = common::spawn(|_req| {
        common::response(
            200,
            "OK",
            &[],
            r#"{"rows":[
                {"number":"FS/5/MCG","created_at":"2024-05-01T10:00:00Z","pdf_url":"https://crm.test/old"},
                {"number":"FS/5/MCG","created_at":"2024-06-01T10:00:00Z","pdf_url":"https://crm.test/new"}
            ]}"#,
        )
    });

    let client = build_client();
    let mut session = Session::new();
    let result = lookup::find_invoice_pdf(&client, &integration_for(&server.url), &mut session, "5")
        .await
        .unwrap();

    assert_eq!(result.pdf_url, "https://crm.test/new");
}

#[tokio::test]
async fn undatable_duplicates_are_ambiguous() {
    let server = common::spawn(|_req| {
        common::response(
            200,
            "OK",
            &[],
            r#"{"data":[
                {"number":"FS/5/MCG","pdf_url":"a"},
                {"number":"FS/5/MCG","pdf_url":"b"}
            ]}"#,
        )
    });

    let client = build_client();
    let mut session = Session::new();
    let err = lookup::find_invoice_pdf(&client, &integration_for(&server.url), &mut session, "5")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lookup(_)));
}

#[tokio::test]
async fn matched_row_without_a_link_is_an_error() {
    let server = common::spawn(|_req| {
        common::response(200, "OK", &[], r#"{"data":[{"number":"FS/5/MCG"}]}"#)
    });

    let client = build_client();
    let mut session = Session::new();
    let err = lookup::find_invoice_pdf(&client, &integration_for(&server.url), &mut session, "5")
        .await
        .unwrap_err();

    match err {
        Error::Lookup(message) => assert!(message.contains("PDF")),
        other => panic!("expected lookup error, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_listing_endpoint_is_reported_as_not_configured() {
    let client = build_client();
    let mut session = Session::new();
    let mut integration = integration_for("http://127.0.0.1:1");
    integration.list_invoices_url = None;

    let err = lookup::find_invoice_pdf(&client, &integration, &mut session, "5")
        .await
        .unwrap_err();

    match err {
        Error::Lookup(message) => assert!(message.contains("configured")),
        other => panic!("expected lookup error, got {:?}", other),
    }
}
