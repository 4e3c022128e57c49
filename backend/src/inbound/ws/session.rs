//! Per-connection WebSocket relay.
//!
//! Each connection owns one bus subscription. Bus events go out as text
//! frames; the server pings on every heartbeat interval and drops a client
//! that has been silent for two intervals. Clients are not expected to send
//! anything beyond control frames.

use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::time;
use tracing::{debug, warn};

use crate::domain::{BusEvent, Subscription};

pub(super) async fn handle_ws_session(
    subscription: Subscription,
    heartbeat_interval: Duration,
    session: Session,
    stream: MessageStream,
) {
    WsSession::new(subscription, heartbeat_interval)
        .run(session, stream)
        .await;
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    Network(Closed),
    BusShutdown,
    Evicted,
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

struct WsSession {
    subscription: Subscription,
    heartbeat_interval: Duration,
}

impl WsSession {
    fn new(subscription: Subscription, heartbeat_interval: Duration) -> Self {
        Self {
            subscription,
            heartbeat_interval,
        }
    }

    fn client_timeout(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    async fn run(mut self, mut session: Session, mut stream: MessageStream) {
        let client_timeout = self.client_timeout();
        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval_at(
            time::Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );

        loop {
            let result = tokio::select! {
                _ = heartbeat.tick() => {
                    Self::handle_heartbeat_tick(&mut session, last_heartbeat, client_timeout).await
                }
                message = stream.recv() => {
                    Self::handle_stream_message(&mut session, &mut last_heartbeat, message).await
                }
                event = self.subscription.recv() => {
                    Self::handle_bus_event(&mut session, event).await
                }
            };

            if let Err(error) = result {
                self.log_shutdown_reason(&error);
                let close_action = Self::close_action_for(error);
                Self::close_session_if_needed(session, close_action).await;
                return;
            }
        }
    }

    async fn handle_heartbeat_tick(
        session: &mut Session,
        last_heartbeat: Instant,
        client_timeout: Duration,
    ) -> Result<(), SessionError> {
        if last_heartbeat.elapsed() > client_timeout {
            return Err(SessionError::HeartbeatTimeout);
        }

        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };

        match message {
            Ok(Message::Ping(payload)) => {
                *last_heartbeat = Instant::now();
                session.pong(&payload).await.map_err(SessionError::Network)
            }
            Ok(Message::Close(reason)) => Err(SessionError::ClientClosed(reason)),
            Ok(
                Message::Pong(_)
                | Message::Text(_)
                | Message::Binary(_)
                | Message::Continuation(_)
                | Message::Nop,
            ) => {
                *last_heartbeat = Instant::now();
                Ok(())
            }
            Err(error) => Err(SessionError::Protocol(error)),
        }
    }

    async fn handle_bus_event(
        session: &mut Session,
        event: Option<BusEvent>,
    ) -> Result<(), SessionError> {
        let Some(event) = event else {
            return Err(SessionError::Evicted);
        };
        match event.to_ws_text() {
            Ok(text) => session.text(text).await.map_err(SessionError::Network)?,
            Err(error) => {
                warn!(event = event.name(), error = %error, "failed to encode websocket event");
            }
        }
        if matches!(event, BusEvent::Shutdown) {
            Err(SessionError::BusShutdown)
        } else {
            Ok(())
        }
    }

    fn log_shutdown_reason(&self, error: &SessionError) {
        let subscriber = self.subscription.id();
        match error {
            SessionError::HeartbeatTimeout => {
                warn!(subscriber, "WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(subscriber, error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                warn!(subscriber, error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::Evicted => {
                warn!(subscriber, "WebSocket subscriber evicted from the event bus");
            }
            SessionError::BusShutdown
            | SessionError::ClientClosed(_)
            | SessionError::StreamClosed => {
                debug!(subscriber, "websocket mirror closed");
            }
        }
    }

    fn close_action_for(error: SessionError) -> CloseAction {
        let close = |code, description: &str| {
            CloseAction::Close(Some(CloseReason {
                code,
                description: Some(description.to_owned()),
            }))
        };
        match error {
            SessionError::HeartbeatTimeout => close(CloseCode::Normal, "heartbeat timeout"),
            SessionError::Protocol(_) => close(CloseCode::Protocol, "protocol error"),
            SessionError::BusShutdown => close(CloseCode::Away, "server shutting down"),
            SessionError::Evicted => close(CloseCode::Policy, "subscriber too slow"),
            SessionError::ClientClosed(reason) => CloseAction::Close(reason),
            SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
        }
    }

    async fn close_session_if_needed(session: Session, close_action: CloseAction) {
        if let CloseAction::Close(reason) = close_action {
            if let Err(error) = session.close(reason).await {
                warn!(error = %error, "Failed to close WebSocket session");
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
