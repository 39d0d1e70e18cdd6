#![forbid(unsafe_code)]

//! `/api/get-video`: trades a Drive file id for a gdplayer slug.

use axum::{
    extract::Query,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::upstream::{UpstreamClient, run_blocking};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveQuery {
    pub file_id: Option<String>,
}

impl ResolveQuery {
    /// Takes the first `file_id` pair when the key repeats. A query string
    /// that does not decode counts as having no id.
    pub fn from_uri(uri: &Uri) -> Self {
        let file_id = Query::<Vec<(String, String)>>::try_from_uri(uri)
            .ok()
            .and_then(|Query(pairs)| pairs.into_iter().find(|(key, _)| key == "file_id"))
            .map(|(_, value)| value);
        Self { file_id }
    }
}

/// Calls the upstream resolver and relays its JSON reply unchanged.
///
/// The reply is parsed only to make sure it is JSON; its `status` field is
/// the browser's business.
pub async fn resolve(client: &UpstreamClient, file_id: Option<&str>) -> Result<Response> {
    let file_id = file_id
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RelayError::BadRequest("Missing file_id parameter".into()))?;

    info!(file_id, "resolving file id");
    let url = client.api_url();
    let payload = json!({ "file_id": file_id });
    let upstream = client.clone();
    let body = run_blocking(move || upstream.post_json(&url, &payload))
        .await
        .map_err(|err| RelayError::Resolve(err.to_string()))?;

    let parsed: Value =
        serde_json::from_str(&body).map_err(|err| RelayError::Resolve(err.to_string()))?;
    debug!(upstream_status = ?parsed.get("status"), "resolver replied");

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
