#![forbid(unsafe_code)]

//! Outbound HTTP to the gdplayer origin and the media servers it points at.
//!
//! `ureq` is a blocking client, so the short resolver and embed calls go
//! through [`run_blocking`]. Media bodies are different: a stream can run for
//! as long as the viewer watches, so each one is pumped by its own thread into
//! an in-memory pipe that axum reads from, and never occupies tokio's blocking
//! pool. When the browser goes away the read half is dropped and the next
//! write fails; when the browser stops reading for longer than the stall
//! timeout the write gives up. Either way the pump ends and the upstream
//! socket is released.

use std::{
    io::{self, Read},
    sync::Arc,
    thread,
    time::Duration,
};

use axum::body::Body;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    runtime::Handle,
    time::timeout,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use ureq::{Agent, AgentBuilder};

use crate::config::RelayConfig;

/// Size of the in-memory pipe between the upstream reader and the client.
const RELAY_BUFFER_BYTES: usize = 64 * 1024;

/// Largest single read from the upstream body.
const PUMP_CHUNK_BYTES: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(Box<ureq::Transport>),

    #[error("reading upstream body: {0}")]
    Body(#[from] io::Error),

    #[error("upstream task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("starting media pump: {0}")]
    Pump(io::Error),
}

/// Pooled client bound to one upstream origin. Cheap to clone.
#[derive(Clone)]
pub struct UpstreamClient {
    agent: Agent,
    origin: Arc<str>,
    user_agent: Arc<str>,
    request_timeout: Duration,
    stall_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &RelayConfig) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(config.timeouts.connect)
            .timeout_read(config.timeouts.read)
            .timeout_write(config.timeouts.read)
            .build();
        Self {
            agent,
            origin: Arc::from(config.upstream.as_str()),
            user_agent: Arc::from(config.user_agent.as_str()),
            request_timeout: config.timeouts.request,
            stall_timeout: config.timeouts.stall,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Browser-like UA sent when the caller has none of its own.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn api_url(&self) -> String {
        format!("{}/api/video", self.origin)
    }

    /// Embed page for a slug. Also the `Referer` the media servers expect.
    pub fn page_url(&self, slug: &str) -> String {
        format!("{}/{}", self.origin, slug)
    }

    /// POSTs `body` as JSON and returns the raw response text whatever the
    /// status code.
    pub fn post_json(&self, url: &str, body: &Value) -> Result<String, FetchError> {
        let result = self
            .agent
            .post(url)
            .timeout(self.request_timeout)
            .set("Content-Type", "application/json")
            .set("User-Agent", &self.user_agent)
            .send_json(body);
        Ok(accept_any_status(result)?.into_string()?)
    }

    /// Plain GET with no extra headers, body returned as text.
    pub fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let result = self.agent.get(url).timeout(self.request_timeout).call();
        Ok(accept_any_status(result)?.into_string()?)
    }

    /// Opens a GET whose body is consumed later. Only the agent's connect and
    /// read timeouts apply so long streams are not cut off.
    pub fn open(&self, url: &str, headers: &[(&str, String)]) -> Result<ureq::Response, FetchError> {
        let request = headers
            .iter()
            .fold(self.agent.get(url), |request, (name, value)| {
                request.set(name, value)
            });
        accept_any_status(request.call())
    }

    /// Turns an upstream body into a streaming axum body fed by a dedicated
    /// pump thread.
    ///
    /// Must be called from inside the runtime.
    pub fn relay_body(&self, response: ureq::Response) -> Result<Body, FetchError> {
        let (client_half, upstream_half) = tokio::io::duplex(RELAY_BUFFER_BYTES);
        let pump = MediaPump {
            reader: response.into_reader(),
            writer: upstream_half,
            stall: self.stall_timeout,
            runtime: Handle::current(),
        };
        thread::Builder::new()
            .name("gdrelay-pump".into())
            .spawn(move || pump.run())
            .map_err(FetchError::Pump)?;
        Ok(Body::from_stream(ReaderStream::new(client_half)))
    }
}

/// Copies one upstream body into the pipe the client reads from.
struct MediaPump {
    reader: Box<dyn Read + Send + Sync + 'static>,
    writer: DuplexStream,
    stall: Duration,
    runtime: Handle,
}

impl MediaPump {
    fn run(self) {
        let Self {
            mut reader,
            mut writer,
            stall,
            runtime,
        } = self;
        let mut buffer = vec![0u8; PUMP_CHUNK_BYTES];
        let mut relayed: u64 = 0;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => {
                    debug!(bytes = relayed, "upstream body relayed");
                    return;
                }
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, bytes = relayed, "upstream body aborted");
                    return;
                }
            };

            let chunk = &buffer[..read];
            let written =
                runtime.block_on(async { timeout(stall, writer.write_all(chunk)).await });
            match written {
                Ok(Ok(())) => relayed += read as u64,
                Ok(Err(_)) => {
                    debug!(bytes = relayed, "client disconnected, dropping upstream body");
                    return;
                }
                Err(_) => {
                    warn!(
                        bytes = relayed,
                        stall_secs = stall.as_secs(),
                        "client stopped reading, dropping upstream body"
                    );
                    return;
                }
            }
        }
    }
}

/// The relay forwards upstream answers as-is, so a 4xx/5xx reply is still a
/// response. Only transport failures are errors.
fn accept_any_status(
    result: Result<ureq::Response, ureq::Error>,
) -> Result<ureq::Response, FetchError> {
    match result {
        Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response),
        Err(ureq::Error::Transport(transport)) => Err(FetchError::Transport(Box::new(transport))),
    }
}

/// Runs a blocking upstream call off the async workers.
pub async fn run_blocking<T, F>(call: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call).await?
}
