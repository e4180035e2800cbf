use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};

use super::http::{self, Body, OutboundRequest};
use crate::error::{Error, Result};
use crate::storage::Integration;

/// The state of one impersonated browser session. Owned by the pipeline
/// that created it and threaded explicitly into the dependent calls; it is
/// never stored globally and dies with the attempt.
#[derive(Debug, Clone)]
pub struct Session {
    cookies: BTreeMap<String, String>,
    pub csrf_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            cookies: BTreeMap::new(),
            csrf_token: None,
            created_at: Utc::now(),
        }
    }

    /// Captures every `Set-Cookie` of a response into the jar.
    pub fn absorb_cookies(&mut self, response: &reqwest::Response) {
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            // Only the name=value pair matters for replay; attributes like
            // Path and HttpOnly are the browser's concern, not ours.
            let Some(pair) = raw.split(';').next() else { continue };
            if let Some((name, val)) = pair.split_once('=') {
                self.cookies.insert(name.trim().to_string(), val.trim().to_string());
            }
        }
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Renders the jar as a single `Cookie` request header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Performs the login handshake against a target system: optional
/// CSRF-token scrape, credentialed submit, cookie-jar capture.
pub struct SessionManager {
    http: Client,
}

impl SessionManager {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Scrape, submit, capture. A terminal 2xx/3xx is success; 4xx/5xx is
    /// an auth failure carrying the status. No implicit retry: a failed
    /// login is reported immediately.
    pub async fn authenticate(&self, integration: &Integration, password: &str) -> Result<Session> {
        let mut session = Session::new();

        if let Some(selector) = &integration.csrf_selector {
            let response = http::send(
                &self.http,
                OutboundRequest {
                    method: "GET",
                    url: &integration.login_url,
                    headers: &integration.headers,
                    csrf: None,
                    body: Body::None,
                },
                &mut session,
            )
            .await?;

            let status = response.status();
            if status.is_client_error() || status.is_server_error() {
                return Err(Error::auth_status(status.as_u16(), "login page request rejected"));
            }

            let page = response.text().await.map_err(Error::from_transport)?;
            let token = extract_csrf(&page, selector).ok_or_else(|| {
                Error::auth(format!(
                    "CSRF token not found on login page using selector '{}'",
                    selector
                ))
            })?;
            tracing::debug!(integration = %integration.name, "CSRF token scraped from login page");
            session.csrf_token = Some(token);
        }

        let mut form = BTreeMap::new();
        form.insert("email".to_string(), integration.email.clone());
        form.insert("password".to_string(), password.to_string());

        let csrf = match (&integration.csrf_header, &session.csrf_token) {
            (Some(header), Some(token)) => Some((header.clone(), token.clone())),
            _ => None,
        };

        let response = http::send(
            &self.http,
            OutboundRequest {
                method: &integration.login_method,
                url: &integration.login_url,
                headers: &integration.headers,
                csrf: csrf.as_ref().map(|(h, t)| (h.as_str(), t.as_str())),
                body: Body::Form(&form),
            },
            &mut session,
        )
        .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::auth_status(status.as_u16(), "login request rejected"));
        }

        tracing::debug!(
            integration = %integration.name,
            status = status.as_u16(),
            cookies = session.cookies().len(),
            "login handshake completed"
        );
        Ok(session)
    }
}

/// Extracts the first match of a declarative pattern from an HTML page.
/// The pattern is a CSS selector, optionally suffixed with `@attr` to name
/// the attribute to read (default: the `value` attribute, then the element
/// text). A pattern that does not parse as CSS is tried as a regex whose
/// first capture group (or whole match) is the token. No DOM traversal, no
/// browser engine.
pub fn extract_csrf(html: &str, pattern: &str) -> Option<String> {
    let (css, attr) = match pattern.rsplit_once('@') {
        Some((css, attr)) if !css.is_empty() && !attr.contains(|c: char| c == ']' || c == ')') => {
            (css, Some(attr))
        }
        _ => (pattern, None),
    };

    if let Ok(selector) = Selector::parse(css) {
        let document = Html::parse_document(html);
        if let Some(element) = document.select(&selector).next() {
            if let Some(attr) = attr {
                return element.value().attr(attr).map(str::to_string);
            }
            if let Some(value) = element.value().attr("value") {
                return Some(value.to_string());
            }
            let text = element.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
        // A valid selector that matched nothing is a miss, not an excuse to
        // reinterpret the pattern as a regex.
        if attr.is_some() || Selector::parse(pattern).is_ok() {
            return None;
        }
    }

    let regex = Regex::new(pattern).ok()?;
    let captures = regex.captures(html)?;
    match captures.get(1) {
        Some(group) => Some(group.as_str().to_string()),
        None => captures.get(0).map(|m| m.as_str().to_string()),
    }
}
