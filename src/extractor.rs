#![forbid(unsafe_code)]

//! Pulls the media server and video id out of a gdplayer embed page.
//!
//! The page boots its player with `init('<key>', '<server>', '<video id>', ...)`.
//! Matching is literal text matching on that call; the markup is never parsed
//! as HTML or evaluated. If upstream changes the call shape only
//! [`extract_embed_token`] needs to follow.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::upstream::{UpstreamClient, run_blocking};

static INIT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"init\('[^']+', '([^']+)', '([^']+)'").expect("init call pattern is valid")
});

/// Server base URL and video id for one slug. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedToken {
    pub server_url: String,
    pub video_id: String,
}

/// Finds the first initializer call in `html`.
pub fn extract_embed_token(html: &str) -> Result<EmbedToken> {
    let captures = INIT_CALL.captures(html).ok_or(RelayError::Extraction)?;
    Ok(EmbedToken {
        server_url: captures[1].to_string(),
        video_id: captures[2].to_string(),
    })
}

/// Downloads the embed page for `slug` and extracts its token.
pub async fn fetch_embed_token(client: &UpstreamClient, slug: &str) -> Result<EmbedToken> {
    let url = client.page_url(slug);
    let upstream = client.clone();
    let html = run_blocking(move || upstream.get_text(&url))
        .await
        .map_err(|err| RelayError::Upstream(err.to_string()))?;

    match extract_embed_token(&html) {
        Ok(token) => {
            debug!(slug, server = %token.server_url, video_id = %token.video_id, "embed token extracted");
            Ok(token)
        }
        Err(err) => {
            warn!(slug, page_bytes = html.len(), "embed page has no init call");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::testing::{FakeUpstream, embed_page};
    use axum::{Router, routing::get};

    #[test]
    fn extracts_server_and_video_id() {
        let token = extract_embed_token("init('x', 'https://srv1', 'vid123'").unwrap();
        assert_eq!(
            token,
            EmbedToken {
                server_url: "https://srv1".into(),
                video_id: "vid123".into(),
            }
        );
    }

    #[test]
    fn extracts_from_full_page_and_takes_first_call() {
        let html = format!(
            "{}<script>init('k', 'https://other', 'second')</script>",
            embed_page("https://cdn.example/v", "abcDEF-123")
        );
        let token = extract_embed_token(&html).unwrap();
        assert_eq!(token.server_url, "https://cdn.example/v");
        assert_eq!(token.video_id, "abcDEF-123");
    }

    #[test]
    fn missing_call_is_an_extraction_error() {
        let err = extract_embed_token("<html><body>nothing here</body></html>").unwrap_err();
        assert!(matches!(err, RelayError::Extraction));
    }

    #[test]
    fn pattern_is_literal_about_quotes_and_spacing() {
        for html in [
            r#"init("x", "https://srv1", "vid123""#,
            "init('x','https://srv1','vid123'",
            "init ('x', 'https://srv1', 'vid123'",
            "init('', 'https://srv1', 'vid123'",
            "init('x', 'https://srv1')",
        ] {
            assert!(
                matches!(extract_embed_token(html), Err(RelayError::Extraction)),
                "unexpected match in {html}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetches_the_page_for_the_slug() {
        let upstream = FakeUpstream::spawn(Router::new().route(
            "/abc",
            get(|| async { embed_page("https://srv1", "vid123") }),
        ))
        .await;
        let client = UpstreamClient::new(&RelayConfig::for_upstream(&upstream.origin));

        let token = fetch_embed_token(&client, "abc").await.unwrap();
        assert_eq!(token.server_url, "https://srv1");
        assert_eq!(token.video_id, "vid123");

        let seen = upstream.single_request();
        assert_eq!(seen.method, "GET");
        assert_eq!(seen.path_and_query, "/abc");
        assert!(seen.header("referer").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_page_is_an_upstream_error() {
        let client = UpstreamClient::new(&RelayConfig::for_upstream("http://127.0.0.1:1"));
        let err = fetch_embed_token(&client, "abc").await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
        assert!(err.to_string().starts_with("Error streaming video: "));
    }
}
