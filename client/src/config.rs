use std::time::Duration;

use url::Url;

use crate::error::ClientError;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    /// Sent as the `Origin` header on the session handshake.
    pub origin: Option<String>,
    pub response_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub health_retries: u32,
    pub health_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        Ok(Self {
            endpoint,
            origin: None,
            response_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            health_retries: 3,
            health_timeout: Duration::from_secs(5),
        })
    }

    pub fn health_url(&self) -> Result<Url, ClientError> {
        health_url_for(&self.endpoint)
    }
}

/// Maps a session endpoint to its readiness URL: `ws`/`wss` become
/// `http`/`https` and a trailing `/ws` segment becomes `/health`.
pub fn health_url_for(endpoint: &Url) -> Result<Url, ClientError> {
    let scheme = match endpoint.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(ClientError::InvalidEndpoint(format!(
                "unsupported scheme {}",
                other
            )));
        }
    };

    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidEndpoint(endpoint.to_string()))?;
    let path = endpoint.path();
    let base = path.strip_suffix("/ws").unwrap_or(path.trim_end_matches('/'));
    url.set_path(&format!("{}/health", base));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
