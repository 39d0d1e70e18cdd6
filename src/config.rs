#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_RELAY_PORT: u16 = 8787;
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_UPSTREAM: &str = "https://gdplayer.vip";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STALL_TIMEOUT_SECS: u64 = 60;

/// Everything the relay needs at runtime. Built once at startup and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the resolver API, the embed pages and the `Referer` sent
    /// with media requests. Never ends with a slash.
    pub upstream: String,
    pub user_agent: String,
    pub timeouts: Timeouts,
}

impl RelayConfig {
    /// Defaults everywhere except the upstream origin.
    pub fn for_upstream(upstream: &str) -> Self {
        Self {
            host: DEFAULT_RELAY_HOST.to_string(),
            port: DEFAULT_RELAY_PORT,
            upstream: normalize_upstream(upstream),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Bounds applied to every outbound call.
///
/// `connect` and `read` apply to all upstream traffic including media
/// streams; `request` caps the whole exchange for the small JSON/HTML fetches
/// only, since a media stream may legitimately run for a long time. `stall`
/// is how long a media stream waits for a client that stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub request: Duration,
    pub stall: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            stall: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upstream: Option<String>,
    pub env_path: Option<PathBuf>,
}

/// Loads the relay configuration. Precedence is CLI overrides, then the
/// process environment, then the env file, then built-in defaults.
pub fn resolve_config(overrides: RuntimeOverrides) -> Result<RelayConfig> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_config(&file_vars, env_var_string, overrides)
}

fn build_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RelayConfig> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let host = non_blank(overrides.host)
        .or_else(|| lookup("GDRELAY_HOST"))
        .unwrap_or_else(|| DEFAULT_RELAY_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup("GDRELAY_PORT").and_then(|value| value.parse().ok()))
        .unwrap_or(DEFAULT_RELAY_PORT);

    let upstream = non_blank(overrides.upstream)
        .or_else(|| lookup("GDRELAY_UPSTREAM"))
        .unwrap_or_else(|| DEFAULT_UPSTREAM.to_string());
    let upstream = normalize_upstream(&upstream);
    if !upstream.starts_with("http://") && !upstream.starts_with("https://") {
        bail!("GDRELAY_UPSTREAM must be an http(s) origin, got {upstream:?}");
    }

    let user_agent = lookup("GDRELAY_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    let seconds = |key: &str, default: u64| {
        Duration::from_secs(
            lookup(key)
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(default),
        )
    };
    let timeouts = Timeouts {
        connect: seconds("GDRELAY_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        read: seconds("GDRELAY_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT_SECS),
        request: seconds("GDRELAY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
        stall: seconds("GDRELAY_STALL_TIMEOUT_SECS", DEFAULT_STALL_TIMEOUT_SECS),
    };

    Ok(RelayConfig {
        host,
        port,
        upstream,
        user_agent,
        timeouts,
    })
}

fn normalize_upstream(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Reads `KEY=value` pairs from a dotenv-style file. A missing file is not an
/// error and yields no values.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content.lines().filter_map(parse_env_line).collect())
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let raw = raw.trim();
    let value = ['"', '\'']
        .iter()
        .find_map(|quote| raw.strip_prefix(*quote)?.strip_suffix(*quote))
        .unwrap_or(raw);
    Some((key.to_string(), value.to_string()))
}
