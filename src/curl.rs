use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::placeholders;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A captured browser request, decoded from an operator-pasted curl command.
/// Authoring-time only; never touched during live sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCurlRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    /// Always disjoint from `headers`: a `Cookie` header is exploded here.
    pub cookies: HashMap<String, String>,
    pub body: BTreeMap<String, String>,
    pub content_type: Option<String>,
}

/// One body field with the placeholder the catalog suggests for its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCurlField {
    pub name: String,
    pub value: String,
    pub suggested_placeholder: Option<String>,
}

/// Parses a pasted curl command into a structured request.
///
/// Recognizes `-X`/`--request`, repeated `-H`/`--header` (a `Cookie` header
/// is split out into the cookie map), the `-d`/`--data` family, `-b`/
/// `--cookie` and `-A`/`--user-agent`. The method defaults to GET unless a
/// body flag implies POST.
pub fn parse(curl: &str) -> Result<ParsedCurlRequest> {
    let trimmed = curl.trim();
    if !trimmed.to_lowercase().starts_with("curl") {
        return Err(Error::Parse("not a curl command".to_string()));
    }

    // Join shell line continuations before tokenizing.
    let cleaned = trimmed.replace("\\\r\n", " ").replace("\\\n", " ");
    let tokens = shlex::split(&cleaned)
        .ok_or_else(|| Error::Parse("unbalanced quotes in curl command".to_string()))?;

    let mut method = String::new();
    let mut url = String::new();
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut cookies: HashMap<String, String> = HashMap::new();
    let mut body_parts: Vec<String> = Vec::new();

    let mut iter = tokens.iter();
    iter.next(); // skip "curl"

    while let Some(token) = iter.next() {
        match token.as_str() {
            "-X" | "--request" => {
                if let Some(m) = iter.next() {
                    method = m.to_uppercase();
                }
            }
            "-H" | "--header" => {
                if let Some(h) = iter.next() {
                    if let Some((name, value)) = h.split_once(':') {
                        let name = name.trim();
                        let value = value.trim();
                        if name.eq_ignore_ascii_case("cookie") {
                            parse_cookie_string(value, &mut cookies);
                        } else {
                            headers.insert(name.to_string(), value.to_string());
                        }
                    }
                }
            }
            "-b" | "--cookie" => {
                if let Some(c) = iter.next() {
                    parse_cookie_string(c, &mut cookies);
                }
            }
            "-A" | "--user-agent" => {
                if let Some(ua) = iter.next() {
                    headers.insert("User-Agent".to_string(), ua.to_string());
                }
            }
            "--url" => {
                if let Some(u) = iter.next() {
                    url = u.to_string();
                }
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-ascii" => {
                if let Some(d) = iter.next() {
                    body_parts.push(d.clone());
                }
            }
            // Value-less toggles browsers emit in "copy as cURL".
            "-L" | "--location" | "-s" | "--silent" | "-i" | "--include" | "-k"
            | "--insecure" | "--compressed" | "-g" | "--globoff" => {}
            // Flags that take a value we have no use for.
            "-o" | "--output" | "-u" | "--user" | "-e" | "--referer" | "--connect-timeout"
            | "--max-time" => {
                iter.next();
            }
            u if u.starts_with("http://") || u.starts_with("https://") => {
                url = u.to_string();
            }
            flag if flag.starts_with('-') => {
                // Unknown toggle, skipped.
            }
            other => {
                if url.is_empty() {
                    url = other.to_string();
                }
            }
        }
    }

    if url.is_empty() {
        return Err(Error::Parse("no URL found in curl command".to_string()));
    }
    if method.is_empty() {
        method = if body_parts.is_empty() { "GET" } else { "POST" }.to_string();
    }

    // curl joins repeated -d arguments with '&'.
    let raw_body = if body_parts.is_empty() {
        None
    } else {
        Some(body_parts.join("&"))
    };

    let header_content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone());
    // curl defaults a -d body to form encoding when no header says otherwise.
    let content_type = match (&header_content_type, &raw_body) {
        (Some(ct), _) => Some(ct.clone()),
        (None, Some(_)) => Some(FORM_CONTENT_TYPE.to_string()),
        (None, None) => None,
    };

    let body = match &raw_body {
        Some(raw) => parse_body(raw, content_type.as_deref()),
        None => BTreeMap::new(),
    };

    Ok(ParsedCurlRequest {
        url,
        method,
        headers,
        cookies,
        body,
        content_type,
    })
}

/// Enumerates the body fields of a parsed request, each with the placeholder
/// the catalog suggests for its captured value. An empty body is fine;
/// the list is simply empty.
pub fn suggest_fields(request: &ParsedCurlRequest) -> Vec<ParsedCurlField> {
    request
        .body
        .iter()
        .map(|(name, value)| ParsedCurlField {
            name: name.clone(),
            value: value.clone(),
            suggested_placeholder: placeholders::suggest_for_value(value).map(String::from),
        })
        .collect()
}

fn parse_cookie_string(raw: &str, cookies: &mut HashMap<String, String>) {
    for pair in raw.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((name, value)) = pair.split_once('=') {
            cookies.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
}

fn parse_body(raw: &str, content_type: Option<&str>) -> BTreeMap<String, String> {
    let mut body = BTreeMap::new();

    let is_json = content_type
        .map(|ct| ct.to_lowercase().contains("json"))
        .unwrap_or(false);

    if is_json {
        // Opaque JSON text: enumerate top-level keys of an object body.
        // Arrays and scalars carry no mappable fields.
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
            for (key, value) in map {
                let rendered = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                body.insert(key, rendered);
            }
        }
    } else {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            body.insert(key.into_owned(), value.into_owned());
        }
    }

    body
}
