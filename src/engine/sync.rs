use reqwest::Client;
use serde_json::Value;

use super::http::{self, Body, OutboundRequest};
use super::session::Session;
use crate::error::{Error, Result};
use crate::mapping::{self, SyncContext};
use crate::storage::Integration;

/// The remote system's answer to a create-invoice request. `raw` always
/// carries the response body for operator inspection; `external_ref` is a
/// best-effort id scavenged from a JSON body.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub external_ref: Option<String>,
    pub raw: String,
}

/// Submits the field-mapped create-invoice request on an established
/// session.
///
/// No automatic retry, ever: the remote system's idempotency is unknown and
/// a blind retry risks duplicate remote invoices. Failures surface to the
/// operator for manual action.
pub async fn create_invoice(
    http: &Client,
    integration: &Integration,
    session: &mut Session,
    context: &SyncContext,
) -> Result<SyncResult> {
    let compiled = mapping::compile(&integration.field_mapping)?;
    let body = mapping::resolve(&compiled, &integration.static_fields, context)?;

    let csrf_owned = match (&integration.csrf_header, &session.csrf_token) {
        (Some(header), Some(token)) => Some((header.clone(), token.clone())),
        _ => None,
    };
    let csrf = csrf_owned
        .as_ref()
        .map(|(header, token)| (header.as_str(), token.as_str()));

    let response = http::send(
        http,
        OutboundRequest {
            method: &integration.create_invoice_method,
            url: &integration.create_invoice_url,
            headers: &integration.headers,
            csrf,
            body: if http::wants_json(&integration.headers) {
                Body::Json(&body)
            } else {
                Body::Form(&body)
            },
        },
        session,
    )
    .await?;

    let status = response.status();
    let raw = response.text().await.map_err(Error::from_transport)?;

    if !status.is_success() {
        return Err(Error::sync_status(status.as_u16(), snippet(&raw)));
    }

    // Some targets answer 200 and bury the rejection in the payload.
    if let Some(reason) = embedded_error(&raw) {
        return Err(Error::Sync {
            status: Some(status.as_u16()),
            message: format!("remote reported an error: {}", reason),
        });
    }

    let external_ref = extract_external_ref(&raw);
    tracing::info!(
        integration = %integration.name,
        status = status.as_u16(),
        external_ref = external_ref.as_deref().unwrap_or("-"),
        "invoice submitted to remote CRM"
    );

    Ok(SyncResult { external_ref, raw })
}

/// Detects a recognizable error payload inside a 2xx JSON body.
fn embedded_error(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    if let Some(error) = object.get("error") {
        if !error.is_null() {
            return Some(render(error));
        }
    }
    if let Some(errors) = object.get("errors") {
        let non_empty = match errors {
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        };
        if non_empty {
            return Some(render(errors));
        }
    }
    if object.get("success") == Some(&Value::Bool(false)) {
        return Some("success=false".to_string());
    }
    if object.get("status").and_then(Value::as_str) == Some("error") {
        return Some("status=error".to_string());
    }

    None
}

fn extract_external_ref(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    for key in ["id", "invoice_id", "invoiceId", "number"] {
        match object.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() <= 200 {
        trimmed.to_string()
    } else {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_error_spots_common_shapes() {
        assert!(embedded_error(r#"{"error":"duplicate number"}"#).is_some());
        assert!(embedded_error(r#"{"errors":["nip invalid"]}"#).is_some());
        assert!(embedded_error(r#"{"success":false}"#).is_some());
        assert!(embedded_error(r#"{"status":"error"}"#).is_some());
    }

    #[test]
    fn clean_payloads_pass() {
        assert!(embedded_error(r#"{"id":17,"success":true}"#).is_none());
        assert!(embedded_error(r#"{"error":null}"#).is_none());
        assert!(embedded_error("not json at all").is_none());
    }

    #[test]
    fn external_ref_prefers_id() {
        assert_eq!(
            extract_external_ref(r#"{"id":17,"number":"FS/17"}"#).as_deref(),
            Some("17")
        );
        assert_eq!(
            extract_external_ref(r#"{"number":"FS/17"}"#).as_deref(),
            Some("FS/17")
        );
        assert_eq!(extract_external_ref(r#"[1,2]"#), None);
    }
}
