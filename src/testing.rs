//! In-process stand-in for the gdplayer origin and its media servers.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    extract::{Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
};
use parking_lot::Mutex;
use tokio::{net::TcpListener, task::JoinHandle};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

type Journal = Arc<Mutex<Vec<RecordedRequest>>>;

/// Serves `routes` on an ephemeral localhost port and records every request
/// it receives, in arrival order.
pub struct FakeUpstream {
    pub origin: String,
    journal: Journal,
    server: JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn spawn(routes: Router) -> Self {
        let journal: Journal = Arc::default();
        let app = routes.layer(middleware::from_fn_with_state(journal.clone(), record));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            origin: format!("http://{addr}"),
            journal,
            server,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.journal.lock().clone()
    }

    pub fn single_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected one upstream request: {requests:?}");
        requests.into_iter().next().unwrap()
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record(State(journal): State<Journal>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap();
    journal.lock().push(RecordedRequest {
        method: parts.method.to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|value| value.to_string())
            .unwrap_or_default(),
        headers: parts.headers.clone(),
        body: body.clone(),
    });
    next.run(Request::from_parts(parts, Body::from(body))).await
}

/// Embed page markup carrying the initializer call the extractor looks for.
pub fn embed_page(server_url: &str, video_id: &str) -> String {
    format!(
        "<html><body><div ng-controller=\"player\" ng-init=\"init('x', '{server_url}', '{video_id}', false)\"></div></body></html>"
    )
}
