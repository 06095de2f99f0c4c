//! Consumer-facing client handle.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::ConfigError;
use crate::event::{Event, EventSink};

/// A running log subscription.
///
/// `Client::start` spawns a background task that connects, subscribes and
/// reconnects with backoff until [`Client::shutdown`] is called or the
/// handle is dropped. Notifications and lifecycle events are read in
/// arrival order with [`Client::next_event`].
pub struct Client {
    /// The receiver sits behind a mutex so `next_event` can take `&self`.
    events: Mutex<mpsc::Receiver<Event>>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    closed_delivered: AtomicBool,
}

impl Client {
    /// Validate `config` and start the client on the current tokio runtime.
    ///
    /// Returns `ConfigError` for configurations that could never connect or
    /// subscribe; nothing is spawned in that case. Network failures are not
    /// reported here: they surface later as [`Event::Error`] while the
    /// client retries.
    pub fn start(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let manager = ConnectionManager::new(
            &config,
            state_tx,
            cancel.clone(),
            EventSink::new(event_tx),
        );
        let task = tokio::spawn(manager.run());

        Ok(Self {
            events: Mutex::new(event_rx),
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
            closed_delivered: AtomicBool::new(false),
        })
    }

    /// Receive the next event. Returns `None` after [`Event::Closed`] has
    /// been consumed.
    ///
    /// `Closed` is not queued: it is produced here once the background task
    /// has exited in the `Closed` state and every queued event has been
    /// read, so a full queue at shutdown cannot displace it.
    pub async fn next_event(&self) -> Option<Event> {
        let mut rx = self.events.lock().await;
        if let Some(event) = rx.recv().await {
            return Some(event);
        }
        let closed = *self.state.borrow() == ConnectionState::Closed;
        if closed && !self.closed_delivered.swap(true, Ordering::SeqCst) {
            return Some(Event::Closed);
        }
        None
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver notified on every state transition.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the client and wait for it to reach `Closed`.
    ///
    /// Any pending wait (connect, acknowledgement, backoff, frame receipt)
    /// is abandoned immediately. If a subscription is active a
    /// `logsUnsubscribe` is sent before the connection is closed. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "client task failed");
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
