use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub backends: Vec<BackendConfig>,
    /// Request-scoped deadline shared by every backend call of one query.
    pub global_timeout: Duration,
    /// Per-connection timeout of the backend HTTP clients.
    pub backend_timeout: Duration,
    pub mismatch_tolerance: f64,
    pub fix_mismatches: bool,
    /// Emit the graphite-web 0.9 pickle variant on find.
    pub graphite_web09_compatibility: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub address: String,
    pub tlds: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    carbonq_listen_addr: Option<String>,
    #[serde(default)]
    carbonq_listen_host: Option<String>,
    #[serde(default)]
    carbonq_listen_port: Option<u16>,
    #[serde(default)]
    carbonq_backends: Option<String>,
    #[serde(default = "default_global_timeout_secs")]
    carbonq_global_timeout_secs: u64,
    #[serde(default = "default_backend_timeout_secs")]
    carbonq_backend_timeout_secs: u64,
    #[serde(default)]
    carbonq_mismatch_tolerance: Option<f64>,
    #[serde(default)]
    carbonq_fix_mismatches: Option<bool>,
    #[serde(default)]
    carbonq_graphite_web09_compatibility: Option<bool>,
}

const fn default_global_timeout_secs() -> u64 {
    10
}

const fn default_backend_timeout_secs() -> u64 {
    5
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse CARBONQ_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.carbonq_listen_addr,
            raw.carbonq_listen_host,
            raw.carbonq_listen_port,
        )?;

        let backends = parse_backends(
            raw.carbonq_backends
                .as_deref()
                .context("CARBONQ_BACKENDS must be set")?,
        )?;
        if backends.is_empty() {
            anyhow::bail!("CARBONQ_BACKENDS must list at least one backend");
        }

        Ok(Self {
            listen_addr,
            backends,
            global_timeout: Duration::from_secs(raw.carbonq_global_timeout_secs.max(1)),
            backend_timeout: Duration::from_secs(raw.carbonq_backend_timeout_secs.max(1)),
            mismatch_tolerance: raw.carbonq_mismatch_tolerance.unwrap_or(0.0),
            fix_mismatches: raw.carbonq_fix_mismatches.unwrap_or(false),
            graphite_web09_compatibility: raw
                .carbonq_graphite_web09_compatibility
                .unwrap_or(false),
        })
    }
}

/// Backend list syntax: `;`-separated entries, each `url` or
/// `url=tld1,tld2`. Example:
/// `http://store-a:8080=prod,stage;http://store-b:8080`.
fn parse_backends(raw: &str) -> Result<Vec<BackendConfig>> {
    let mut backends = Vec::new();
    for entry in raw.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (address, tlds) = match entry.split_once('=') {
            Some((address, tlds)) => {
                let tlds: Vec<String> = tlds
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                (address.trim(), tlds)
            }
            None => (entry, Vec::new()),
        };
        if address.is_empty() {
            anyhow::bail!("backend entry '{entry}' has an empty address");
        }
        backends.push(BackendConfig {
            address: address.to_string(),
            tlds,
        });
    }
    Ok(backends)
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid CARBONQ_LISTEN_ADDR value")?
            .next()
            .context("CARBONQ_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8880);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid CARBONQ listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
