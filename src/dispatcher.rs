use tokio::sync::watch;
use tracing::{debug, trace};

use crate::codec::RpcCodec;
use crate::connection::ConnectionState;
use crate::error::ClientError;
use crate::event::{Event, EventSink};
use crate::frame::{Inbound, SubscriptionId};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Forwarded to the consumer.
    Delivered,
    /// Tagged with a subscription id that is not the active one.
    Stale(SubscriptionId),
    /// Arrived while the client was not streaming.
    NotStreaming,
    /// Decoded, but not a notification.
    Ignored,
    /// A JSON-RPC error response; reported to the error sink.
    ServerError,
    /// Could not be decoded; reported to the error sink.
    Malformed,
}

/// Decodes frames received while streaming and hands notifications for the
/// active subscription to the consumer, one at a time and in arrival order.
///
/// The dispatcher only reads the connection state; the connection manager
/// owns it.
#[derive(Debug)]
pub struct Dispatcher {
    codec: RpcCodec,
    state: watch::Receiver<ConnectionState>,
    sink: EventSink,
    delivered: u64,
}

impl Dispatcher {
    pub(crate) fn new(state: watch::Receiver<ConnectionState>, sink: EventSink) -> Self {
        Self {
            codec: RpcCodec::new(),
            state,
            sink,
            delivered: 0,
        }
    }

    /// Number of notifications forwarded so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Handle one raw frame.
    ///
    /// Parameters
    /// - `raw`: frame payload as received.
    /// - `active`: the currently acknowledged subscription id.
    pub async fn on_message(&mut self, raw: &[u8], active: Option<SubscriptionId>) -> Dispatch {
        let msg = match self.codec.decode(raw) {
            Ok(msg) => msg,
            Err(err) => {
                self.sink.error(err).await;
                return Dispatch::Malformed;
            }
        };

        match msg {
            Inbound::Notification(n) => {
                if *self.state.borrow() != ConnectionState::Streaming {
                    debug!(subscription = %n.subscription, "discarding notification outside streaming state");
                    return Dispatch::NotStreaming;
                }
                if active != Some(n.subscription) {
                    debug!(subscription = %n.subscription, active = ?active, "discarding notification for stale subscription");
                    return Dispatch::Stale(n.subscription);
                }
                self.delivered += 1;
                trace!(subscription = %n.subscription, seq = self.delivered, "delivering notification");
                self.sink.emit(Event::Notification(n)).await;
                Dispatch::Delivered
            }
            Inbound::ErrorResponse { id, error } => {
                self.sink
                    .error(ClientError::Server {
                        request_id: id,
                        error,
                    })
                    .await;
                Dispatch::ServerError
            }
            Inbound::Response { id, result } => {
                debug!(request_id = id, result = %result, "ignoring response while streaming");
                Dispatch::Ignored
            }
        }
    }
}
