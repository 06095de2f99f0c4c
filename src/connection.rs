use futures::{SinkExt, StreamExt, future};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::codec::RpcCodec;
use crate::config::{ClientConfig, Endpoint};
use crate::dispatcher::Dispatcher;
use crate::error::{ClientError, ConnectError, ShutdownRequested};
use crate::event::{Event, EventSink};
use crate::subscription::SubscriptionController;

/// Upper bound for the close handshake and the farewell unsubscribe.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of a client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection; either waiting out a backoff delay or not started yet.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Connected, waiting for the subscribe acknowledgement.
    Subscribing,
    /// Subscription acknowledged; notifications flow to the consumer.
    Streaming,
    /// Shutdown requested; releasing the connection.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why an established connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The server closed the connection, with the close reason if it sent
    /// one.
    RemoteClosed(Option<String>),
    /// Nothing was received within the idle timeout.
    IdleTimeout(Duration),
    /// WebSocket protocol or I/O failure.
    Protocol(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::RemoteClosed(Some(reason)) if !reason.is_empty() => {
                write!(f, "closed by server: {}", reason)
            }
            DropReason::RemoteClosed(_) => f.write_str("closed by server"),
            DropReason::IdleTimeout(d) => write!(f, "no frames received for {:?}", d),
            DropReason::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl From<tungstenite::Error> for DropReason {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                DropReason::RemoteClosed(None)
            }
            other => DropReason::Protocol(other.to_string()),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single established WebSocket connection.
///
/// `recv` enforces the idle timeout and sends keepalive pings while it
/// waits, so a silent connection is noticed even when the server never
/// closes it.
pub struct Connection {
    ws: WsStream,
    idle_timeout: Duration,
    ping: Option<Interval>,
    last_received: Instant,
}

impl Connection {
    /// Open a WebSocket connection to `endpoint`.
    ///
    /// The whole handshake (TCP, TLS for `wss://`, HTTP upgrade) is bounded
    /// by `endpoint.connect_timeout`.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, ConnectError> {
        let handshake = connect_async(endpoint.url.as_str());
        let (ws, _response) = tokio::time::timeout(endpoint.connect_timeout, handshake)
            .await
            .map_err(|_| ConnectError::Timeout(endpoint.connect_timeout))?
            .map_err(|e| match e {
                tungstenite::Error::Url(url_err) => ConnectError::InvalidUrl(url_err.to_string()),
                other => ConnectError::Handshake(other),
            })?;

        let ping = endpoint.ping_interval.map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        Ok(Self {
            ws,
            idle_timeout: endpoint.idle_timeout,
            ping,
            last_received: Instant::now(),
        })
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), DropReason> {
        self.ws.send(Message::Text(text)).await.map_err(DropReason::from)
    }

    /// Wait for the next data frame and return its payload.
    ///
    /// Ping, pong and raw frames are consumed here (pongs for server pings
    /// are queued by the transport). Text and binary payloads are both
    /// returned as bytes.
    pub async fn recv(&mut self) -> Result<Vec<u8>, DropReason> {
        loop {
            let idle_deadline = self.last_received + self.idle_timeout;
            tokio::select! {
                item = self.ws.next() => {
                    let msg = match item {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(DropReason::RemoteClosed(None)),
                    };
                    self.last_received = Instant::now();
                    match msg {
                        Message::Text(text) => return Ok(text.into_bytes()),
                        Message::Binary(bytes) => return Ok(bytes),
                        Message::Close(frame) => {
                            return Err(DropReason::RemoteClosed(frame.map(|f| f.reason.into_owned())));
                        }
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    return Err(DropReason::IdleTimeout(self.idle_timeout));
                }
                _ = next_ping(&mut self.ping) => {
                    self.ws.send(Message::Ping(Vec::new())).await.map_err(DropReason::from)?;
                }
            }
        }
    }

    /// Send a close frame and release the socket.
    pub async fn close(mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.ws.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "close handshake failed"),
            Err(_) => debug!("close handshake timed out"),
        }
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Race `fut` against the shutdown signal.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ShutdownRequested> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ShutdownRequested),
        out = fut => Ok(out),
    }
}

/// Drives one client instance: connect, subscribe, stream, and reconnect
/// with backoff until shutdown.
///
/// The manager is the only writer of the connection state. Every wait it
/// performs (handshake, acknowledgement, frame receipt, backoff sleep,
/// delivery to a full event queue) ends as soon as the cancellation token
/// fires.
pub(crate) struct ConnectionManager {
    endpoint: Endpoint,
    backoff: Backoff,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    controller: SubscriptionController,
    dispatcher: Dispatcher,
    codec: RpcCodec,
    sink: EventSink,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: &ClientConfig,
        state: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
        sink: EventSink,
    ) -> Self {
        let dispatcher = Dispatcher::new(state.subscribe(), sink.clone());
        Self {
            endpoint: config.endpoint.clone(),
            backoff: Backoff::new(config.backoff),
            state,
            cancel,
            controller: SubscriptionController::new(
                config.filter.clone(),
                config.commitment,
                config.subscribe_timeout,
            ),
            dispatcher,
            codec: RpcCodec::new(),
            sink,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(url = %self.endpoint.url, filter = %self.controller.filter(), "starting log subscription");
        let open = self.supervise().await;
        self.close(open).await;
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "state transition");
        }
    }

    async fn emit(&self, event: Event) -> Result<(), ShutdownRequested> {
        cancellable(&self.cancel, self.sink.emit(event)).await
    }

    async fn report(&self, err: impl Into<ClientError>) -> Result<(), ShutdownRequested> {
        cancellable(&self.cancel, self.sink.error(err)).await
    }

    async fn wait_backoff(&mut self) -> Result<(), ShutdownRequested> {
        let delay = self.backoff.next_delay();
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt(),
            "reconnecting after backoff"
        );
        cancellable(&self.cancel, tokio::time::sleep(delay)).await
    }

    /// Reconnect loop. Returns the connection that was open when shutdown
    /// was requested, if any.
    async fn supervise(&mut self) -> Option<Connection> {
        loop {
            self.set_state(ConnectionState::Connecting);
            debug!(url = %self.endpoint.url, "connecting");
            let mut conn = match cancellable(&self.cancel, Connection::connect(&self.endpoint)).await {
                Err(ShutdownRequested) => return None,
                Ok(Err(err)) => {
                    self.set_state(ConnectionState::Disconnected);
                    if self.report(err).await.is_err() || self.wait_backoff().await.is_err() {
                        return None;
                    }
                    continue;
                }
                Ok(Ok(conn)) => conn,
            };

            if self.session(&mut conn).await.is_err() {
                return Some(conn);
            }
            conn.close().await;
            if self.wait_backoff().await.is_err() {
                return None;
            }
        }
    }

    /// Subscribe on a fresh connection and stream until it drops. Returns
    /// `Ok` with the state already set to `Disconnected` once the session is
    /// over and has been reported.
    async fn session(&mut self, conn: &mut Connection) -> Result<(), ShutdownRequested> {
        info!(url = %self.endpoint.url, "connected");
        self.emit(Event::Connected).await?;

        self.set_state(ConnectionState::Subscribing);
        let subscribed =
            cancellable(&self.cancel, self.controller.subscribe(conn, &self.sink)).await?;
        let id = match subscribed {
            Ok(id) => id,
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                self.report(err).await?;
                return Ok(());
            }
        };

        self.backoff.reset();
        self.set_state(ConnectionState::Streaming);
        info!(subscription = %id, "subscribed");
        self.emit(Event::Subscribed(id)).await?;

        loop {
            let raw = match cancellable(&self.cancel, conn.recv()).await? {
                Ok(raw) => raw,
                Err(reason) => {
                    warn!(reason = %reason, "connection dropped");
                    self.controller.invalidate();
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(Event::Disconnected(reason)).await?;
                    return Ok(());
                }
            };
            let active = self.controller.active();
            cancellable(&self.cancel, self.dispatcher.on_message(&raw, active)).await?;
        }
    }

    async fn close(mut self, open: Option<Connection>) {
        self.set_state(ConnectionState::Closing);
        if let Some(mut conn) = open {
            if let Some(request) = self.controller.unsubscribe_request() {
                match self.codec.encode(&request) {
                    Ok(text) => {
                        match tokio::time::timeout(CLOSE_TIMEOUT, conn.send_text(text)).await {
                            Ok(Ok(())) => debug!(request_id = request.id, "unsubscribe sent"),
                            Ok(Err(reason)) => debug!(reason = %reason, "unsubscribe not sent"),
                            Err(_) => debug!("unsubscribe timed out"),
                        }
                    }
                    Err(e) => debug!(error = %e, "failed to encode unsubscribe"),
                }
            }
            conn.close().await;
        }
        self.controller.invalidate();
        self.set_state(ConnectionState::Closed);
        info!(delivered = self.dispatcher.delivered(), "client closed");
    }
}
