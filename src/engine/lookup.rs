use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::{Map, Value};

use super::http::{self, Body, OutboundRequest};
use super::session::Session;
use crate::error::{Error, Result};
use crate::storage::Integration;

/// Row-shape candidates for the server-side table endpoints this engine
/// talks to. First hit wins.
const ROWS_KEYS: &[&str] = &["data", "rows", "items", "invoices", "results"];
const NUMBER_KEYS: &[&str] = &["number", "invoice_number", "invoiceNumber", "name", "title"];
const DATE_KEYS: &[&str] = &["created_at", "createdAt", "date", "issue_date", "issued_at"];
const PDF_KEYS: &[&str] = &["pdf_url", "pdfUrl", "pdf", "download_url", "downloadUrl", "url", "link"];

#[derive(Debug, Clone)]
pub struct LookupResult {
    pub pdf_url: String,
}

/// Locates the remote invoice whose (prefix/suffix-stripped) number equals
/// the local one and returns its PDF link.
///
/// Zero matches is a hard error: the caller distinguishes "not yet synced"
/// from "no listing endpoint configured" by checking `list_invoices_url`
/// before calling. Several exact matches are ranked by their date field;
/// a tie with no usable dates fails rather than guessing.
pub async fn find_invoice_pdf(
    http: &Client,
    integration: &Integration,
    session: &mut Session,
    invoice_number: &str,
) -> Result<LookupResult> {
    let url = integration.list_invoices_url.as_deref().ok_or_else(|| {
        Error::Lookup("no invoice list endpoint configured for this integration".to_string())
    })?;

    let response = http::send(
        http,
        OutboundRequest {
            method: "GET",
            url,
            headers: &integration.headers,
            csrf: None,
            body: Body::None,
        },
        session,
    )
    .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Lookup(format!(
            "invoice listing returned HTTP {}",
            status.as_u16()
        )));
    }

    let raw = response.text().await.map_err(Error::from_transport)?;
    let listing: Value = serde_json::from_str(&raw)
        .map_err(|_| Error::Lookup("invoice listing is not valid JSON".to_string()))?;
    let rows = rows_of(&listing).ok_or_else(|| {
        Error::Lookup("invoice listing carries no recognizable row array".to_string())
    })?;

    let local = invoice_number.trim();
    let mut matches: Vec<&Map<String, Value>> = Vec::new();
    for row in rows {
        let Some(object) = row.as_object() else { continue };
        let Some(remote) = first_string(object, NUMBER_KEYS) else { continue };
        if strip_affixes(
            &remote,
            integration.invoice_number_prefix.as_deref(),
            integration.invoice_number_suffix.as_deref(),
        ) == local
        {
            matches.push(object);
        }
    }

    let best = match matches.len() {
        0 => {
            return Err(Error::Lookup(format!(
                "no remote invoice matches local number '{}'",
                local
            )))
        }
        1 => matches[0],
        n => pick_most_recent(&matches).ok_or_else(|| {
            Error::Lookup(format!(
                "{} remote invoices match local number '{}' and no date field breaks the tie",
                n, local
            ))
        })?,
    };

    let pdf_url = first_string(best, PDF_KEYS).ok_or_else(|| {
        Error::Lookup(format!(
            "remote invoice matching '{}' carries no PDF link",
            local
        ))
    })?;

    tracing::debug!(integration = %integration.name, invoice = local, "remote invoice PDF located");
    Ok(LookupResult { pdf_url })
}

/// The listing itself, or the first array under a well-known wrapper key.
fn rows_of(listing: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(rows) = listing {
        return Some(rows);
    }
    let object = listing.as_object()?;
    for key in ROWS_KEYS {
        if let Some(Value::Array(rows)) = object.get(*key) {
            return Some(rows);
        }
    }
    None
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match object.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Normalizes a remote invoice number by trimming whitespace and stripping
/// the configured prefix/suffix when present.
pub fn strip_affixes<'a>(remote: &'a str, prefix: Option<&str>, suffix: Option<&str>) -> &'a str {
    let mut value = remote.trim();
    if let Some(prefix) = prefix {
        if !prefix.is_empty() {
            if let Some(stripped) = value.strip_prefix(prefix) {
                value = stripped;
            }
        }
    }
    if let Some(suffix) = suffix {
        if !suffix.is_empty() {
            if let Some(stripped) = value.strip_suffix(suffix) {
                value = stripped;
            }
        }
    }
    value.trim()
}

/// The row with the strictly most recent date field; None when no row has a
/// parseable date or the top two tie.
fn pick_most_recent<'a>(rows: &[&'a Map<String, Value>]) -> Option<&'a Map<String, Value>> {
    let mut dated: Vec<(DateTime<Utc>, &Map<String, Value>)> = rows
        .iter()
        .filter_map(|row| first_string(row, DATE_KEYS).and_then(|s| parse_date(&s)).map(|d| (d, *row)))
        .collect();
    if dated.is_empty() {
        return None;
    }
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    if dated.len() > 1 && dated[0].0 == dated[1].0 {
        return None;
    }
    Some(dated[0].1)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}
