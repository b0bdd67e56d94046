use std::time::Instant;

use awc::error::{WsClientError, WsProtocolError as ProtocolError};
use awc::ws::{CloseCode, Frame, Message};
use chrono::{SecondsFormat, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use shared::{ClassificationRequest, ClassificationResult, HealthStatus, ServerMessage};
use tokio::time::{sleep, timeout};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Submits classification requests over short-lived sessions, gating each
/// attempt on the backend's health endpoint.
pub struct RetryDriver {
    config: ClientConfig,
    health_url: Url,
    http: reqwest::Client,
    ws: awc::Client,
}

impl RetryDriver {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let health_url = config.health_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.health_timeout)
            .build()
            .map_err(|e| ClientError::Unexpected(e.to_string()))?;
        let ws = awc::Client::builder()
            .timeout(config.response_timeout)
            .finish();
        Ok(Self {
            config,
            health_url,
            http,
            ws,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Polls the health endpoint up to `health_retries` times. Returns the
    /// first healthy report, or `None` if the backend never became ready.
    pub async fn check_health(&self) -> Option<HealthStatus> {
        let retries = self.config.health_retries.max(1);
        for attempt in 1..=retries {
            match self.fetch_health().await {
                Ok(status) => {
                    log::debug!("Backend healthy at {}", status.timestamp);
                    return Some(status);
                }
                Err(reason) => {
                    log::warn!(
                        "Health check attempt {}/{} failed: {}",
                        attempt,
                        retries,
                        reason
                    );
                    if attempt < retries {
                        sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        log::error!("Backend at {} is not healthy", self.health_url);
        None
    }

    async fn fetch_health(&self) -> Result<HealthStatus, String> {
        let response = self
            .http
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let code = response.status();
        let status: HealthStatus = response.json().await.map_err(|e| e.to_string())?;
        if code.is_success() && status.is_healthy() {
            Ok(status)
        } else {
            Err(format!(
                "status {} (model_loaded={})",
                status.status, status.model_loaded
            ))
        }
    }

    /// Classifies one image, retrying timeouts and transport failures with a
    /// fixed delay. Server errors and rejected handshakes are returned as-is.
    pub async fn classify(
        &self,
        image_data: &str,
        threshold: f32,
    ) -> Result<ClassificationResult, ClientError> {
        let request = ClassificationRequest {
            image: image_data.to_string(),
            threshold,
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        };
        let payload =
            serde_json::to_string(&request).map_err(|e| ClientError::Unexpected(e.to_string()))?;

        let max_attempts = self.config.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.check_health().await.is_none() {
                return Err(ClientError::HealthCheckFailed);
            }

            log::debug!("Classification attempt {}/{}", attempt, max_attempts);
            let outcome = self.attempt(&payload).await;
            log::info!(
                "Attempt {} finished after {:.2}s",
                attempt,
                started.elapsed().as_secs_f64()
            );

            match outcome {
                Ok(ServerMessage::Result(result)) => return Ok(result),
                Ok(ServerMessage::Error(response)) => {
                    log::error!("Server error: {}", response.error);
                    return Err(ClientError::Server(response.error));
                }
                Err(err) if !err.is_retryable() || attempt >= max_attempts => return Err(err),
                Err(err) => {
                    log::warn!(
                        "Attempt {} failed: {}, retrying in {:?}",
                        attempt,
                        err,
                        self.config.retry_delay
                    );
                    sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// One session: connect, send the request, wait for a single reply, close.
    async fn attempt(&self, payload: &str) -> Result<ServerMessage, ClientError> {
        let mut request = self.ws.ws(self.config.endpoint.as_str());
        if let Some(origin) = &self.config.origin {
            request = request.origin(origin.as_str());
        }
        let (_response, mut framed) = request.connect().await.map_err(connect_error)?;

        framed
            .send(Message::Text(payload.to_owned().into()))
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

        let reply = match timeout(self.config.response_timeout, await_reply(&mut framed)).await {
            Ok(reply) => reply,
            Err(_) => Err(ClientError::Timeout(self.config.response_timeout)),
        };

        if let Err(e) = framed.send(Message::Close(None)).await {
            log::debug!("Close after reply failed: {}", e);
        }
        reply
    }
}

fn connect_error(err: WsClientError) -> ClientError {
    match err {
        WsClientError::InvalidResponseStatus(status) => {
            ClientError::HandshakeRejected(format!("handshake answered with {}", status))
        }
        other => ClientError::ConnectionFailed(other.to_string()),
    }
}

async fn await_reply<S>(framed: &mut S) -> Result<ServerMessage, ClientError>
where
    S: Stream<Item = Result<Frame, ProtocolError>>
        + Sink<Message, Error = ProtocolError>
        + Unpin,
{
    while let Some(frame) = framed.next().await {
        let frame = frame.map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        match frame {
            Frame::Text(bytes) | Frame::Binary(bytes) => {
                return serde_json::from_slice(&bytes).map_err(|e| {
                    ClientError::Unexpected(format!("unreadable server reply: {}", e))
                });
            }
            Frame::Ping(payload) => {
                framed
                    .send(Message::Pong(payload))
                    .await
                    .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
            }
            Frame::Pong(_) | Frame::Continuation(_) => {}
            Frame::Close(Some(reason)) if reason.code == CloseCode::Policy => {
                let description = reason
                    .description
                    .unwrap_or_else(|| "policy violation".to_string());
                return Err(ClientError::HandshakeRejected(description));
            }
            Frame::Close(reason) => {
                return Err(ClientError::ConnectionFailed(format!(
                    "session closed before a reply: {:?}",
                    reason
                )));
            }
        }
    }
    Err(ClientError::ConnectionFailed(
        "session ended before a reply".to_string(),
    ))
}
