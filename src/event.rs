use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::DropReason;
use crate::error::ClientError;
use crate::frame::{Notification, SubscriptionId};

/// Everything the consumer observes, in the order it happened.
#[derive(Debug)]
pub enum Event {
    /// The WebSocket handshake with the endpoint completed.
    Connected,
    /// The server acknowledged the subscription with this id.
    Subscribed(SubscriptionId),
    /// A notification for the active subscription.
    Notification(Notification),
    /// An established connection was lost; a reconnect follows.
    Disconnected(DropReason),
    /// A failure that the client recovered from.
    Error(ClientError),
    /// The client stopped after an explicit shutdown. Always the last event,
    /// delivered after everything queued before it.
    Closed,
}

/// Sending half of the consumer queue.
///
/// A consumer that dropped its receiver is not an error for the client: the
/// sink logs the first failed delivery and discards events from then on.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    pub(crate) async fn emit(&self, event: Event) {
        if self.tx.is_closed() {
            return;
        }
        if let Err(err) = self.tx.send(event).await {
            debug!(event = ?err.0, "event receiver dropped");
        }
    }

    /// Report a recovered failure. Every error is traced before it is queued,
    /// so nothing is lost when the consumer isn't reading.
    pub(crate) async fn error(&self, err: impl Into<ClientError>) {
        let err = err.into();
        match &err {
            ClientError::Connect(e) => warn!(error = %e, "connect failed"),
            ClientError::Subscribe(e) => warn!(error = %e, "subscribe failed"),
            ClientError::Decode(e) => warn!(error = %e, "dropping malformed frame"),
            ClientError::Server { request_id, error } => warn!(
                request_id = ?request_id,
                code = error.code,
                message = %error.message,
                "server error response"
            ),
        }
        self.emit(Event::Error(err)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[tokio::test]
    async fn emits_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        sink.emit(Event::Connected).await;
        sink.error(DecodeError::NotAnObject).await;
        sink.emit(Event::Subscribed(SubscriptionId(3))).await;

        assert!(matches!(rx.recv().await, Some(Event::Connected)));
        assert!(matches!(
            rx.recv().await,
            Some(Event::Error(ClientError::Decode(DecodeError::NotAnObject)))
        ));
        assert!(matches!(rx.recv().await, Some(Event::Subscribed(SubscriptionId(3)))));
    }

    #[tokio::test]
    async fn dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(tx);
        sink.emit(Event::Connected).await;
        sink.error(DecodeError::UnrecognizedShape).await;
    }
}
