#![forbid(unsafe_code)]

//! Path classification and the axum app that dispatches on it.
//!
//! Rules are checked in order and the first hit wins. Methods are never
//! inspected: a `POST /watch/x` renders the watch page like a `GET` does.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
};
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::pages::{self, Asset};
use crate::proxy;
use crate::resolver::{self, ResolveQuery};
use crate::upstream::UpstreamClient;

/// Shared by every handler. Holds no per-request state.
#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            upstream: UpstreamClient::new(config),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Index,
    ResolveApi,
    /// Everything after `/watch/`, unparsed.
    Watch(&'a str),
    /// Validated later by the stream proxy itself.
    Stream,
    Asset(Asset),
    NotFound,
}

impl<'a> Route<'a> {
    pub fn classify(path: &'a str) -> Self {
        match path {
            "/" | "/index.html" => return Self::Index,
            "/api/get-video" => return Self::ResolveApi,
            _ => {}
        }
        if let Some(slug) = path.strip_prefix("/watch/") {
            return Self::Watch(slug);
        }
        if path.starts_with("/stream/") {
            return Self::Stream;
        }
        Asset::from_path(path).map_or(Self::NotFound, Self::Asset)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, _body) = request.into_parts();
    let path = parts.uri.path();
    let result = match Route::classify(path) {
        Route::Index => Ok(pages::index_page()),
        Route::ResolveApi => {
            let query = ResolveQuery::from_uri(&parts.uri);
            resolver::resolve(&state.upstream, query.file_id.as_deref()).await
        }
        Route::Watch(slug) => Ok(pages::watch_page(slug)),
        Route::Stream => proxy::stream(&state.upstream, path, &parts.headers).await,
        Route::Asset(asset) => Ok(pages::asset_response(asset)),
        Route::NotFound => Err(RelayError::NotFound),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}
