#![forbid(unsafe_code)]

//! Landing page, watch page and the player script. Pure rendering.

use axum::{
    http::{HeaderValue, header},
    response::{Html, IntoResponse, Response},
};
use serde_json::Value;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const WATCH_HTML: &str = include_str!("../assets/watch.html");
const PLAYER_JS: &str = include_str!("../assets/player.js");

const SLUG_PLACEHOLDER: &str = "__SLUG_LITERAL__";

/// Files served verbatim from the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    PlayerScript,
}

impl Asset {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/player.js" => Some(Self::PlayerScript),
            _ => None,
        }
    }

    fn body(self) -> &'static str {
        match self {
            Self::PlayerScript => PLAYER_JS,
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Self::PlayerScript => "application/javascript",
        }
    }
}

pub fn index_page() -> Response {
    Html(INDEX_HTML).into_response()
}

/// Watch page for `slug`. The slug is whatever followed `/watch/` and is
/// only ever written into the page as an escaped JavaScript string.
pub fn watch_page(slug: &str) -> Response {
    Html(WATCH_HTML.replace(SLUG_PLACEHOLDER, &script_string_literal(slug))).into_response()
}

pub fn asset_response(asset: Asset) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(asset.content_type())),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=86400"),
            ),
        ],
        asset.body(),
    )
        .into_response()
}

/// JSON string literal that is also safe inside an inline `<script>`.
fn script_string_literal(value: &str) -> String {
    Value::String(value.to_owned())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
