#![forbid(unsafe_code)]

//! `/stream/{slug}/{quality}`: the byte pipe between the browser and the
//! media server named in the slug's embed page.
//!
//! Each call re-fetches the embed page, builds the media URL, and streams the
//! upstream reply back with its status and headers intact. Only the framing
//! headers that belong to a single hop are dropped; the local HTTP stack
//! re-frames the body itself.

use std::sync::LazyLock;

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::extractor::{EmbedToken, fetch_embed_token};
use crate::upstream::{UpstreamClient, run_blocking};

static STREAM_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/stream/([^/]+)/(\d+)$").expect("stream path pattern is valid")
});

/// Client headers copied onto the media request so seeking keeps working.
const FORWARDED_HEADERS: [&str; 2] = ["range", "if-range"];

const HOP_BY_HOP: [&str; 4] = ["connection", "keep-alive", "transfer-encoding", "upgrade"];

/// Slug and quality parsed out of a stream path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub slug: String,
    pub quality: String,
}

impl StreamTarget {
    /// Accepts exactly `/stream/{slug}/{digits}`. The quality is any digit
    /// run; the upstream decides what exists.
    pub fn parse(path: &str) -> Result<Self> {
        let captures = STREAM_PATH.captures(path).ok_or(RelayError::InvalidStream)?;
        let slug = &captures[1];
        if is_dot_segment(slug) {
            return Err(RelayError::InvalidStream);
        }
        Ok(Self {
            slug: slug.to_string(),
            quality: captures[2].to_string(),
        })
    }
}

/// `.` or `..`, spelled literally or with `%2e`. URL normalization would
/// collapse these and move the request off the slug's page.
fn is_dot_segment(slug: &str) -> bool {
    let decoded = slug.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Fully built outbound media request. Deterministic in its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
}

impl MediaRequest {
    pub fn build(
        referer: String,
        token: &EmbedToken,
        quality: &str,
        client_headers: &HeaderMap,
        fallback_user_agent: &str,
    ) -> Self {
        let user_agent = client_headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(fallback_user_agent)
            .to_string();

        let mut headers = vec![("Referer", referer), ("User-Agent", user_agent)];
        for name in FORWARDED_HEADERS {
            if let Some(value) = client_headers.get(name).and_then(|value| value.to_str().ok()) {
                headers.push((name, value.to_string()));
            }
        }

        Self {
            url: media_url(token, quality),
            headers,
        }
    }
}

/// `{server}/?video_id={id}&quality={quality}&action=p`, verbatim.
pub fn media_url(token: &EmbedToken, quality: &str) -> String {
    format!(
        "{}/?video_id={}&quality={}&action=p",
        token.server_url, token.video_id, quality
    )
}

/// Resolves the stream path to a media request and relays the reply.
pub async fn stream(client: &UpstreamClient, path: &str, headers: &HeaderMap) -> Result<Response> {
    let target = StreamTarget::parse(path)?;
    let token = fetch_embed_token(client, &target.slug).await?;
    let request = MediaRequest::build(
        client.page_url(&target.slug),
        &token,
        &target.quality,
        headers,
        client.user_agent(),
    );
    info!(slug = %target.slug, quality = %target.quality, "proxying media stream");
    debug!(url = %request.url, "media request");

    let upstream = client.clone();
    let reply = run_blocking(move || upstream.open(&request.url, &request.headers))
        .await
        .map_err(|err| RelayError::Proxy(err.to_string()))?;
    relay_response(client, reply)
}

fn relay_response(client: &UpstreamClient, reply: ureq::Response) -> Result<Response> {
    let status = StatusCode::from_u16(reply.status())
        .map_err(|err| RelayError::Proxy(err.to_string()))?;
    let headers = copy_headers(&reply);
    debug!(%status, content_type = ?headers.get(header::CONTENT_TYPE), "media server replied");

    let body = client
        .relay_body(reply)
        .map_err(|err| RelayError::Proxy(err.to_string()))?;
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn copy_headers(reply: &ureq::Response) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in reply.headers_names() {
        if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(header = %name, "dropping unrepresentable upstream header");
            continue;
        };
        // `headers_names` repeats a name once per occurrence; `all` already
        // returns every value.
        if headers.contains_key(&header_name) {
            continue;
        }
        for value in reply.all(&name) {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(header_name.clone(), value);
                }
                Err(_) => warn!(header = %name, "dropping unrepresentable upstream header value"),
            }
        }
    }
    headers
}
