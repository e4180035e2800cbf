use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use reqwest::{Client, Method};
use url::Url;

use super::session::Session;
use crate::error::{Error, Result};

/// Per-request timeout; a stalled third party must not hang the pipeline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Redirect hop bound for a single logical request.
pub const MAX_REDIRECTS: usize = 5;

/// Builds the shared HTTP client. Redirects are disabled and followed by
/// hand in [`send`]; reqwest's automatic redirects would swallow the
/// intermediate `Set-Cookie` headers the session jar needs.
pub fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("failed to create HTTP client")
}

pub enum Body<'a> {
    None,
    Form(&'a BTreeMap<String, String>),
    Json(&'a BTreeMap<String, String>),
}

pub struct OutboundRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: &'a HashMap<String, String>,
    /// Header name + scraped token, when the target wants the CSRF token
    /// carried on this request.
    pub csrf: Option<(&'a str, &'a str)>,
    pub body: Body<'a>,
}

/// Sends a request with the session's cookie jar attached, following
/// redirects up to [`MAX_REDIRECTS`] and absorbing every `Set-Cookie` along
/// the way. 301/302/303 degrade to GET without a body; 307/308 re-send.
/// Returns the terminal response, whatever its status.
pub async fn send(
    client: &Client,
    request: OutboundRequest<'_>,
    session: &mut Session,
) -> Result<reqwest::Response> {
    let mut method = parse_method(request.method)?;
    let mut url = Url::parse(request.url)
        .map_err(|e| Error::Network(format!("invalid URL '{}': {}", request.url, e)))?;
    let mut body_allowed = true;
    let mut hops = 0usize;

    loop {
        let mut builder = client.request(method.clone(), url.clone());
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some((name, value)) = request.csrf {
            builder = builder.header(name, value);
        }
        if let Some(cookie) = session.cookie_header() {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if body_allowed {
            match &request.body {
                Body::None => {}
                Body::Form(map) => {
                    // A GET login carries its fields in the query string.
                    if method == Method::GET || method == Method::HEAD {
                        builder = builder.query(map);
                    } else {
                        builder = builder.form(map);
                    }
                }
                Body::Json(map) => {
                    builder = builder.json(map);
                }
            }
        }

        let response = builder.send().await.map_err(Error::from_transport)?;
        session.absorb_cookies(&response);

        let status = response.status();
        if !matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) || hops >= MAX_REDIRECTS {
            return Ok(response);
        }
        let location = match response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            Some(l) => l.to_string(),
            // A redirect status without a Location is terminal.
            None => return Ok(response),
        };

        url = url.join(&location).map_err(|e| {
            Error::Network(format!("invalid redirect location '{}': {}", location, e))
        })?;
        if matches!(status.as_u16(), 301 | 302 | 303) {
            method = Method::GET;
            body_allowed = false;
        }
        hops += 1;
        tracing::trace!(url = %url, status = status.as_u16(), hop = hops, "following redirect");
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_uppercase().as_bytes())
        .map_err(|_| Error::Mapping(format!("invalid HTTP method '{}' in integration config", raw)))
}

/// True when the configured static headers declare a JSON body.
pub fn wants_json(headers: &HashMap<String, String>) -> bool {
    headers
        .iter()
        .any(|(name, value)| {
            name.eq_ignore_ascii_case("content-type") && value.to_lowercase().contains("json")
        })
}
