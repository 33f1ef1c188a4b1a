//! STOMP-over-WebSocket transport with auto-reconnect.
//!
//! [`StompHandle::spawn`] starts a background task that connects to the
//! broker, performs the STOMP `CONNECT` handshake, and reports everything
//! that happens through an unbounded [`TransportEvent`] channel. Commands
//! (subscribe / unsubscribe / send) flow the other way through the handle
//! and are accepted at any time: while the socket is down, subscriptions
//! are remembered and replayed after the next `CONNECTED` frame.
//!
//! Reconnection uses exponential backoff with jitter. The retry *policy*
//! (when to give up on streaming) belongs to the caller; by default this
//! task retries forever.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetwatch_api::websocket::{StompConfig, StompHandle, TransportEvent};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = StompConfig::new("ws://localhost:8080/ws".parse()?);
//! let (handle, mut events) = StompHandle::spawn(config, CancellationToken::new());
//! handle.subscribe("sub-1", "/topic/dashboard")?;
//!
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Message(frame) = event {
//!         println!("{}: {}", frame.destination, frame.body);
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::stomp::{Frame, FrameCommand};

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── StompConfig ──────────────────────────────────────────────────────

/// Everything the transport task needs to reach the broker.
#[derive(Debug, Clone)]
pub struct StompConfig {
    /// Broker endpoint, e.g. `ws://localhost:8080/ws`.
    pub url: Url,
    /// Bearer token sent on the upgrade request and in `CONNECT`.
    pub token: Option<SecretString>,
    pub reconnect: ReconnectConfig,
    /// Client heart-beat interval. `Duration::ZERO` disables heart-beats.
    pub heartbeat: Duration,
}

impl StompConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            reconnect: ReconnectConfig::default(),
            heartbeat: Duration::from_secs(10),
        }
    }

    fn host(&self) -> String {
        self.url.host_str().unwrap_or("localhost").to_owned()
    }
}

// ── Events and commands ──────────────────────────────────────────────

/// A `MESSAGE` frame delivered to one of our subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub subscription: String,
    pub destination: String,
    pub message_id: Option<String>,
    pub body: String,
}

/// Everything the transport task reports back to its owner, in order.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection attempt is starting (0 for the first attempt).
    Connecting { attempt: u32 },
    /// The broker accepted the `CONNECT` frame.
    Connected { server: Option<String> },
    /// A message arrived for one of our subscriptions.
    Message(InboundFrame),
    /// The attempt failed or the live session dropped.
    Failed(Error),
    /// The task exited (cancelled, handle dropped, or retry limit hit).
    Stopped,
}

#[derive(Debug)]
enum Outbound {
    Subscribe { id: String, destination: String },
    Unsubscribe { id: String },
    Send { destination: String, body: String },
}

// ── StompHandle ──────────────────────────────────────────────────────

/// Handle to a running transport task.
///
/// Dropping every handle closes the command channel, which ends the task
/// after its current session. Call [`shutdown`](Self::shutdown) for an
/// immediate, graceful stop.
#[derive(Debug, Clone)]
pub struct StompHandle {
    commands: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl StompHandle {
    /// Spawn the transport task. Must be called within a Tokio runtime.
    ///
    /// Returns immediately; the first connection attempt happens
    /// asynchronously and is reported through the event receiver.
    pub fn spawn(
        config: StompConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(config, event_tx, command_rx, task_cancel).await;
        });

        (
            Self {
                commands: command_tx,
                cancel,
            },
            event_rx,
        )
    }

    /// Register a subscription. Sent now if connected, and replayed on
    /// every reconnect until unsubscribed.
    pub fn subscribe(&self, id: &str, destination: &str) -> Result<(), Error> {
        self.command(Outbound::Subscribe {
            id: id.to_owned(),
            destination: destination.to_owned(),
        })
    }

    pub fn unsubscribe(&self, id: &str) -> Result<(), Error> {
        self.command(Outbound::Unsubscribe { id: id.to_owned() })
    }

    /// Queue a `SEND` frame. Dropped with a warning if the socket is down
    /// when the task picks it up.
    pub fn send(&self, destination: &str, body: String) -> Result<(), Error> {
        self.command(Outbound::Send {
            destination: destination.to_owned(),
            body,
        })
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }

    fn command(&self, cmd: Outbound) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::TransportClosed);
        }
        self.commands.send(cmd).map_err(|_| Error::TransportClosed)
    }
}

// ── Session bookkeeping ──────────────────────────────────────────────

/// Subscriptions the broker should know about, in registration order.
#[derive(Debug, Default)]
struct ActiveSubscriptions {
    entries: Vec<(String, String)>,
}

impl ActiveSubscriptions {
    fn insert(&mut self, id: String, destination: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = destination;
        } else {
            self.entries.push((id, destination));
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != id);
        before != self.entries.len()
    }

    fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.entries
            .iter()
            .map(|(id, destination)| Frame::subscribe(id, destination))
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn ws_loop(
    config: StompConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) {
    let mut active = ActiveSubscriptions::default();
    let mut attempt: u32 = 0;

    'outer: loop {
        let _ = events.send(TransportEvent::Connecting { attempt });

        let mut reached_connected = false;
        let result = run_session(
            &config,
            &events,
            &mut commands,
            &mut active,
            &cancel,
            &mut reached_connected,
        )
        .await;

        match result {
            Ok(()) => break 'outer,
            Err(e) => {
                tracing::warn!(error = %e, attempt, "STOMP session failed");
                let _ = events.send(TransportEvent::Failed(e));
            }
        }

        if reached_connected {
            attempt = 0;
        }

        if let Some(max) = config.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "reconnection limit reached, giving up");
                break 'outer;
            }
        }

        let delay = calculate_backoff(attempt, &config.reconnect);
        tracing::debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        // Keep accepting subscription changes while we wait.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break 'outer,
                () = &mut sleep => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => apply_offline(&mut active, cmd),
                    None => break 'outer,
                },
            }
        }

        attempt = attempt.saturating_add(1);
    }

    let _ = events.send(TransportEvent::Stopped);
    tracing::debug!("STOMP transport loop exiting");
}

/// Apply a command while no socket is open.
fn apply_offline(active: &mut ActiveSubscriptions, cmd: Outbound) {
    match cmd {
        Outbound::Subscribe { id, destination } => active.insert(id, destination),
        Outbound::Unsubscribe { id } => {
            active.remove(&id);
        }
        Outbound::Send { destination, .. } => {
            tracing::warn!(%destination, "dropping SEND while disconnected");
        }
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one WebSocket, run the STOMP session until it drops.
///
/// Returns `Ok` only for a deliberate stop; every other ending is an error
/// so the caller counts it as a failed attempt.
async fn run_session(
    config: &StompConfig,
    events: &mpsc::UnboundedSender<TransportEvent>,
    commands: &mut mpsc::UnboundedReceiver<Outbound>,
    active: &mut ActiveSubscriptions,
    cancel: &CancellationToken,
    reached_connected: &mut bool,
) -> Result<(), Error> {
    tracing::info!(url = %config.url, "connecting to broker");

    let uri: tungstenite::http::Uri = config
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = &config.token {
        request = request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
    }

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = tokio_tungstenite::connect_async(request) => result.map_err(map_handshake_error)?,
    };

    let (mut write, mut read) = ws_stream.split();

    let token = config.token.as_ref().map(|t| t.expose_secret().to_owned());
    let connect = Frame::connect(&config.host(), token.as_deref(), config.heartbeat);
    write
        .send(tungstenite::Message::text(connect.encode()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let heartbeat_enabled = !config.heartbeat.is_zero();
    let mut heartbeat = tokio::time::interval(if heartbeat_enabled {
        config.heartbeat
    } else {
        Duration::from_secs(3600)
    });
    heartbeat.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if *reached_connected {
                    let bye = Frame::disconnect("bye").encode();
                    let _ = write.send(tungstenite::Message::text(bye)).await;
                }
                let _ = write.close().await;
                return Ok(());
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        for frame in Frame::decode_all(&text)? {
                            let was_connected = *reached_connected;
                            handle_server_frame(frame, events, reached_connected)?;
                            if !was_connected && *reached_connected {
                                for sub in active.frames() {
                                    write
                                        .send(tungstenite::Message::text(sub.encode()))
                                        .await
                                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                                }
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (u16::from(cf.code), cf.reason.as_str().to_owned()))
                            .unwrap_or((1005, String::new()));
                        tracing::info!(code, %reason, "WebSocket close frame received");
                        return Err(Error::WebSocketClosed { code, reason });
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        return Err(Error::WebSocketClosed {
                            code: 1006,
                            reason: "stream ended".into(),
                        });
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    let _ = write.close().await;
                    return Ok(());
                };
                if let Some(frame) = apply_online(active, cmd, *reached_connected) {
                    write
                        .send(tungstenite::Message::text(frame.encode()))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
            }
            _ = heartbeat.tick(), if heartbeat_enabled && *reached_connected => {
                write
                    .send(tungstenite::Message::text("\n"))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
        }
    }
}

/// Apply a command during a live session, returning the frame to write.
///
/// Before `CONNECTED` arrives, subscriptions are only recorded (they are
/// replayed once the broker accepts us).
fn apply_online(active: &mut ActiveSubscriptions, cmd: Outbound, connected: bool) -> Option<Frame> {
    match cmd {
        Outbound::Subscribe { id, destination } => {
            let frame = Frame::subscribe(&id, &destination);
            active.insert(id, destination);
            connected.then_some(frame)
        }
        Outbound::Unsubscribe { id } => {
            let known = active.remove(&id);
            (connected && known).then(|| Frame::unsubscribe(&id))
        }
        Outbound::Send { destination, body } => {
            if connected {
                Some(Frame::send(&destination, body))
            } else {
                tracing::warn!(%destination, "dropping SEND before CONNECTED");
                None
            }
        }
    }
}

/// Route one decoded server frame.
fn handle_server_frame(
    frame: Frame,
    events: &mpsc::UnboundedSender<TransportEvent>,
    reached_connected: &mut bool,
) -> Result<(), Error> {
    match frame.command {
        FrameCommand::Connected => {
            tracing::info!(version = frame.get("version").unwrap_or("?"), "STOMP session established");
            *reached_connected = true;
            let _ = events.send(TransportEvent::Connected {
                server: frame.get("server").map(String::from),
            });
            Ok(())
        }
        FrameCommand::Message => {
            let inbound = InboundFrame {
                subscription: frame.get("subscription").unwrap_or_default().to_owned(),
                destination: frame.get("destination").unwrap_or_default().to_owned(),
                message_id: frame.get("message-id").map(String::from),
                body: frame.body,
            };
            let _ = events.send(TransportEvent::Message(inbound));
            Ok(())
        }
        FrameCommand::Error => Err(broker_error(&frame)),
        FrameCommand::Receipt => {
            tracing::trace!(receipt = frame.get("receipt-id").unwrap_or(""), "receipt");
            Ok(())
        }
        other => {
            tracing::debug!(command = %other, "ignoring unexpected client-side frame");
            Ok(())
        }
    }
}

/// Convert a broker `ERROR` frame, classifying auth failures.
fn broker_error(frame: &Frame) -> Error {
    let message = frame
        .get("message")
        .map_or_else(|| frame.body.trim().to_owned(), String::from);
    let lowered = format!("{message} {}", frame.body).to_lowercase();
    if ["401", "403", "unauthorized", "forbidden", "expired", "invalid token", "jwt"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        Error::Authentication { message }
    } else {
        Error::Stomp { message }
    }
}

/// Classify a failed WebSocket upgrade: 401/403 responses are auth errors.
fn map_handshake_error(err: tungstenite::Error) -> Error {
    if let tungstenite::Error::Http(response) = &err {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Error::Authentication {
                message: format!("broker rejected the upgrade with HTTP {status}"),
            };
        }
    }
    Error::WebSocketConnect(err.to_string())
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from many dashboards.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_session_stops_without_failure() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = StompConfig::new("ws://127.0.0.1:9/ws".parse().unwrap());
        let (handle, mut events) = StompHandle::spawn(config, cancel);

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Connecting { attempt: 0 })
        ));
        assert!(matches!(events.recv().await, Some(TransportEvent::Stopped)));
        assert!(events.recv().await.is_none());
        assert!(handle.is_closed());
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let config = ReconnectConfig::default();
        let d = calculate_backoff(u32::MAX, &config);
        assert!(d <= Duration::from_secs(38));
    }

    #[test]
    fn active_subscriptions_replace_and_remove() {
        let mut active = ActiveSubscriptions::default();
        active.insert("sub-1".into(), "/topic/a".into());
        active.insert("sub-2".into(), "/topic/b".into());
        active.insert("sub-1".into(), "/topic/c".into());

        let frames: Vec<_> = active.frames().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get("destination"), Some("/topic/c"));

        assert!(active.remove("sub-2"));
        assert!(!active.remove("sub-2"));
    }

    #[test]
    fn online_subscribe_before_connected_is_deferred() {
        let mut active = ActiveSubscriptions::default();
        let frame = apply_online(
            &mut active,
            Outbound::Subscribe {
                id: "sub-1".into(),
                destination: "/topic/dashboard".into(),
            },
            false,
        );
        assert!(frame.is_none());
        assert_eq!(active.frames().count(), 1);
    }

    #[test]
    fn online_unsubscribe_of_unknown_id_sends_nothing() {
        let mut active = ActiveSubscriptions::default();
        let frame = apply_online(&mut active, Outbound::Unsubscribe { id: "nope".into() }, true);
        assert!(frame.is_none());
    }

    #[test]
    fn message_frame_becomes_inbound_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connected = true;
        let frame = Frame::new(FrameCommand::Message)
            .header("subscription", "sub-9")
            .header("destination", "/topic/agents")
            .header("message-id", "m-1")
            .with_body("[]");

        handle_server_frame(frame, &tx, &mut connected).unwrap();

        match rx.try_recv().unwrap() {
            TransportEvent::Message(inbound) => {
                assert_eq!(inbound.subscription, "sub-9");
                assert_eq!(inbound.destination, "/topic/agents");
                assert_eq!(inbound.message_id.as_deref(), Some("m-1"));
                assert_eq!(inbound.body, "[]");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn error_frame_with_auth_hint_is_authentication_error() {
        let frame = Frame::new(FrameCommand::Error).header("message", "401 Unauthorized");
        assert!(broker_error(&frame).is_auth());

        let frame = Frame::new(FrameCommand::Error).header("message", "queue overflow");
        assert!(matches!(broker_error(&frame), Error::Stomp { .. }));
    }
}
