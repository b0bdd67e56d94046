use std::time::{Duration, Instant};

use actix_web::web;
use actix_ws::{AggregatedMessage, AggregatedMessageStream, CloseCode, CloseReason, MessageStream};
use futures_util::StreamExt;
use shared::{ErrorResponse, ServerMessage};
use uuid::Uuid;

use super::origin::RejectReason;
use super::pipeline::{InFlight, process_message};
use crate::state::AppState;

const FALLBACK_ERROR: &str = r#"{"error":"Internal server error"}"#;

/// Lifecycle of one connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Accepted,
    Serving,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        next >= self
    }
}

/// Time of the last frame received from the peer.
#[derive(Debug, Clone, Copy)]
pub struct LastActivity(Instant);

impl LastActivity {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn touch(&mut self) {
        self.0 = Instant::now();
    }

    pub fn idle(&self) -> Duration {
        self.0.elapsed()
    }
}

#[derive(Debug)]
enum SessionEnd {
    PeerClosed(Option<CloseReason>),
    StreamEnded,
    SendFailed,
    Protocol(String),
}

/// Owns one accepted connection and serves requests on it strictly in order.
pub struct ClassificationSession {
    id: Uuid,
    peer: String,
    state: SessionState,
    last_activity: LastActivity,
    in_flight: InFlight,
    app: web::Data<AppState>,
    session: Option<actix_ws::Session>,
}

impl ClassificationSession {
    pub fn new(app: web::Data<AppState>, session: actix_ws::Session, peer: String) -> Self {
        let mut handler = Self {
            id: Uuid::new_v4(),
            peer,
            state: SessionState::Connecting,
            last_activity: LastActivity::now(),
            in_flight: InFlight::new(),
            app,
            session: Some(session),
        };
        handler.transition(SessionState::Accepted);
        handler
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_activity(&self) -> LastActivity {
        self.last_activity
    }

    pub async fn run(mut self, stream: MessageStream) {
        let mut stream = self.configure_stream(stream);
        self.transition(SessionState::Serving);

        let end = loop {
            let Some(message) = stream.next().await else {
                break SessionEnd::StreamEnded;
            };
            self.last_activity.touch();
            match message {
                Ok(AggregatedMessage::Text(text)) => {
                    if !self.respond(text.as_bytes()).await {
                        break SessionEnd::SendFailed;
                    }
                }
                Ok(AggregatedMessage::Binary(bytes)) => {
                    if !self.respond(&bytes).await {
                        break SessionEnd::SendFailed;
                    }
                }
                Ok(AggregatedMessage::Ping(bytes)) => {
                    let pong_sent = match self.session.as_mut() {
                        Some(session) => session.pong(&bytes).await.is_ok(),
                        None => false,
                    };
                    if !pong_sent {
                        break SessionEnd::SendFailed;
                    }
                }
                Ok(AggregatedMessage::Pong(_)) => {}
                Ok(AggregatedMessage::Close(reason)) => break SessionEnd::PeerClosed(reason),
                Err(e) => break SessionEnd::Protocol(e.to_string()),
            }
        };

        self.finish(end).await;
    }

    fn configure_stream(&self, stream: MessageStream) -> AggregatedMessageStream {
        let max_bytes = self.app.limits.max_message_bytes;
        stream
            .max_frame_size(max_bytes)
            .aggregate_continuations()
            .max_continuation_size(max_bytes)
    }

    /// Processes one request and sends its reply. Returns false once the
    /// transport can no longer be written to.
    async fn respond(&mut self, payload: &[u8]) -> bool {
        log::info!("[{}] Received {} bytes from {}", self.id, payload.len(), self.peer);

        let reply: ServerMessage = match process_message(&self.app, &self.in_flight, payload).await {
            Ok(result) => {
                log::info!(
                    "[{}] Sending {} of {} predictions to {}",
                    self.id,
                    result.filtered_predictions,
                    result.total_predictions,
                    self.peer
                );
                result.into()
            }
            Err(e) if e.is_validation() => {
                log::warn!("[{}] Invalid request from {}: {}", self.id, self.peer, e);
                ErrorResponse::new(e.client_message()).into()
            }
            Err(e) => {
                log::error!("[{}] Error processing request from {}: {}", self.id, self.peer, e);
                ErrorResponse::new(e.client_message()).into()
            }
        };

        let body = serde_json::to_string(&reply).unwrap_or_else(|e| {
            log::error!("[{}] Failed to serialize reply: {}", self.id, e);
            FALLBACK_ERROR.to_string()
        });

        match self.session.as_mut() {
            Some(session) => session.text(body).await.is_ok(),
            None => false,
        }
    }

    async fn finish(&mut self, end: SessionEnd) {
        self.transition(SessionState::Closing);
        log::debug!(
            "[{}] {} idle for {:?} at close",
            self.id,
            self.peer,
            self.last_activity.idle()
        );
        match end {
            SessionEnd::PeerClosed(reason) => {
                log::info!("[{}] Session closed by client {}: {:?}", self.id, self.peer, reason);
                self.close(reason).await;
            }
            SessionEnd::StreamEnded => {
                log::info!("[{}] Connection to {} ended", self.id, self.peer);
                self.abandon();
            }
            SessionEnd::SendFailed => {
                log::info!("[{}] Transport to {} closed while sending", self.id, self.peer);
                self.abandon();
            }
            SessionEnd::Protocol(e) => {
                log::warn!("[{}] Protocol error from {}: {}", self.id, self.peer, e);
                self.abandon();
            }
        }
        // Second close is a no-op.
        self.close(None).await;
        self.transition(SessionState::Closed);
    }

    async fn close(&mut self, reason: Option<CloseReason>) {
        if let Some(session) = self.session.take() {
            if session.close(reason).await.is_err() {
                log::debug!("[{}] Session to {} was already closed", self.id, self.peer);
            } else {
                log::info!("[{}] Session closed for {}", self.id, self.peer);
            }
        }
    }

    /// Drops the write half without attempting a close frame.
    fn abandon(&mut self) {
        self.session = None;
    }

    fn transition(&mut self, next: SessionState) {
        if next == self.state {
            return;
        }
        if !self.state.can_advance_to(next) {
            log::warn!(
                "[{}] Ignoring backwards transition {:?} -> {:?} for {}",
                self.id,
                self.state,
                next,
                self.peer
            );
            return;
        }
        log::info!("[{}] {} {:?} -> {:?}", self.id, self.peer, self.state, next);
        self.state = next;
    }
}

/// Closes a connection that failed the origin policy without reading from it.
pub async fn reject(session: actix_ws::Session, stream: MessageStream, reason: RejectReason, peer: String) {
    log::warn!("{}", reason.log_message(&peer));
    let description = match reason {
        RejectReason::Missing => "Origin header required",
        RejectReason::NotAllowed(_) => "Origin not allowed",
    };
    let close = session
        .close(Some(CloseReason {
            code: CloseCode::Policy,
            description: Some(description.to_string()),
        }))
        .await;
    if close.is_err() {
        log::debug!("Connection from {} closed before policy rejection was sent", peer);
    }
    drop(stream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        assert!(SessionState::Connecting.can_advance_to(SessionState::Accepted));
        assert!(SessionState::Serving.can_advance_to(SessionState::Serving));
        assert!(SessionState::Accepted.can_advance_to(SessionState::Closed));
        assert!(!SessionState::Closing.can_advance_to(SessionState::Serving));
        assert!(!SessionState::Closed.can_advance_to(SessionState::Connecting));
    }

    #[test]
    fn touch_resets_idle_time() {
        let mut activity = LastActivity::now();
        std::thread::sleep(Duration::from_millis(30));
        assert!(activity.idle() >= Duration::from_millis(30));

        activity.touch();
        assert!(activity.idle() < Duration::from_millis(30));
    }
}
