use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::codec::RpcCodec;
use crate::connection::Connection;
use crate::error::SubscribeError;
use crate::event::EventSink;
use crate::frame::{Commitment, Inbound, LogsFilter, Request, SubscriptionId};

/// What a single inbound message did to an outstanding subscribe request.
#[derive(Debug)]
pub(crate) enum AckOutcome {
    Acknowledged(SubscriptionId),
    Failed(SubscribeError),
    /// Unrelated to the request; keep waiting.
    Pending,
}

/// Owns the single subscription of a client instance.
///
/// The controller issues `logsSubscribe` on every new connection and keeps
/// the acknowledged id until the connection goes away. Request ids are
/// allocated from a counter that is never reset, so an acknowledgement
/// for a request sent on an earlier connection can never be mistaken for
/// the current one.
#[derive(Debug)]
pub struct SubscriptionController {
    filter: LogsFilter,
    commitment: Commitment,
    ack_timeout: Duration,
    codec: RpcCodec,
    next_request_id: u64,
    /// Request id of the subscribe awaiting acknowledgement.
    pending: Option<u64>,
    active: Option<SubscriptionId>,
}

impl SubscriptionController {
    pub fn new(filter: LogsFilter, commitment: Commitment, ack_timeout: Duration) -> Self {
        Self {
            filter,
            commitment,
            ack_timeout,
            codec: RpcCodec::new(),
            next_request_id: 1,
            pending: None,
            active: None,
        }
    }

    pub fn filter(&self) -> &LogsFilter {
        &self.filter
    }

    /// The acknowledged subscription id on the current connection, if any.
    pub fn active(&self) -> Option<SubscriptionId> {
        self.active
    }

    /// Forget the acknowledged id. Called whenever the connection is lost.
    pub fn invalidate(&mut self) {
        if let Some(id) = self.active.take() {
            debug!(subscription = %id, "subscription invalidated");
        }
        self.pending = None;
    }

    fn allocate_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Validate the filter and build the subscribe request for a fresh
    /// connection. Any previously acknowledged id is dropped.
    pub(crate) fn begin(&mut self) -> Result<Request, SubscribeError> {
        self.invalidate();
        self.filter.validate().map_err(SubscribeError::InvalidFilter)?;
        let id = self.allocate_request_id();
        self.pending = Some(id);
        Ok(Request::subscribe(id, &self.filter, self.commitment))
    }

    /// Feed one decoded message while a subscribe request is outstanding.
    pub(crate) fn on_inbound(&mut self, msg: Inbound) -> AckOutcome {
        let Some(request_id) = self.pending else {
            return AckOutcome::Pending;
        };
        match msg {
            Inbound::Response { id, result } if id == request_id => {
                self.pending = None;
                match result.as_u64() {
                    Some(raw) => {
                        let sub = SubscriptionId(raw);
                        self.active = Some(sub);
                        AckOutcome::Acknowledged(sub)
                    }
                    None => AckOutcome::Failed(SubscribeError::MalformedAck(result)),
                }
            }
            // A null id means the server could not read the request; ours is
            // the only one in flight.
            Inbound::ErrorResponse { id, error } if id.is_none_or(|id| id == request_id) => {
                self.pending = None;
                AckOutcome::Failed(error.into())
            }
            Inbound::Notification(n) => {
                debug!(subscription = %n.subscription, "discarding notification received before acknowledgement");
                AckOutcome::Pending
            }
            other => {
                debug!(message = %other, "ignoring unrelated response while subscribing");
                AckOutcome::Pending
            }
        }
    }

    /// Subscribe on `conn` and wait for the acknowledgement.
    ///
    /// Malformed frames received while waiting go to `sink` and do not
    /// abort the wait. The wait as a whole is bounded by the configured
    /// acknowledgement timeout.
    pub(crate) async fn subscribe(
        &mut self,
        conn: &mut Connection,
        sink: &EventSink,
    ) -> Result<SubscriptionId, SubscribeError> {
        let request = self.begin()?;
        let text = self
            .codec
            .encode(&request)
            .map_err(|e| SubscribeError::Send(e.to_string()))?;
        if let Err(reason) = conn.send_text(text).await {
            self.pending = None;
            return Err(SubscribeError::ConnectionLost(reason));
        }
        debug!(request_id = request.id, filter = %self.filter, commitment = %self.commitment, "subscribe request sent");

        let deadline = Instant::now() + self.ack_timeout;
        loop {
            let raw = match tokio::time::timeout_at(deadline, conn.recv()).await {
                Ok(Ok(raw)) => raw,
                Ok(Err(reason)) => {
                    self.pending = None;
                    return Err(SubscribeError::ConnectionLost(reason));
                }
                Err(_) => {
                    self.pending = None;
                    return Err(SubscribeError::Timeout(self.ack_timeout));
                }
            };
            match self.codec.decode(&raw) {
                Err(err) => sink.error(err).await,
                Ok(msg) => match self.on_inbound(msg) {
                    AckOutcome::Acknowledged(id) => return Ok(id),
                    AckOutcome::Failed(err) => return Err(err),
                    AckOutcome::Pending => {}
                },
            }
        }
    }

    /// Build `logsUnsubscribe` for the active subscription, if there is one.
    pub(crate) fn unsubscribe_request(&mut self) -> Option<Request> {
        let active = self.active?;
        let id = self.allocate_request_id();
        Some(Request::unsubscribe(id, active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcErrorObject;
    use crate::frame::Notification;
    use serde_json::json;

    const ADDRESS: &str = "B4FMCpibTGdZhxHHNgWWnwk5PhhKdST37uFRY6TVksaj";

    fn controller() -> SubscriptionController {
        SubscriptionController::new(
            LogsFilter::mentions(ADDRESS),
            Commitment::Finalized,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn ack_matching_request_id_activates() {
        let mut c = controller();
        let req = c.begin().unwrap();
        assert_eq!(req.id, 1);
        let outcome = c.on_inbound(Inbound::Response {
            id: req.id,
            result: json!(7),
        });
        assert!(matches!(outcome, AckOutcome::Acknowledged(SubscriptionId(7))));
        assert_eq!(c.active(), Some(SubscriptionId(7)));
    }

    #[test]
    fn response_for_other_request_is_ignored() {
        let mut c = controller();
        let req = c.begin().unwrap();
        let outcome = c.on_inbound(Inbound::Response {
            id: req.id + 10,
            result: json!(9),
        });
        assert!(matches!(outcome, AckOutcome::Pending));
        assert_eq!(c.active(), None);
    }

    #[test]
    fn notification_before_ack_is_discarded() {
        let mut c = controller();
        c.begin().unwrap();
        let outcome = c.on_inbound(Inbound::Notification(Notification {
            method: None,
            subscription: SubscriptionId(7),
            payload: json!({}),
        }));
        assert!(matches!(outcome, AckOutcome::Pending));
        assert_eq!(c.active(), None);
    }

    #[test]
    fn error_response_is_rejection() {
        let mut c = controller();
        let req = c.begin().unwrap();
        let outcome = c.on_inbound(Inbound::ErrorResponse {
            id: Some(req.id),
            error: RpcErrorObject {
                code: -32602,
                message: "Invalid Request: Only 1 address supported".into(),
                data: None,
            },
        });
        match outcome {
            AckOutcome::Failed(SubscribeError::Rejected { code, .. }) => assert_eq!(code, -32602),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn non_integer_ack_is_malformed() {
        let mut c = controller();
        let req = c.begin().unwrap();
        let outcome = c.on_inbound(Inbound::Response {
            id: req.id,
            result: json!("abc"),
        });
        assert!(matches!(
            outcome,
            AckOutcome::Failed(SubscribeError::MalformedAck(_))
        ));
    }

    #[test]
    fn reconnect_never_reuses_request_or_subscription_id() {
        let mut c = controller();
        let first = c.begin().unwrap();
        c.on_inbound(Inbound::Response {
            id: first.id,
            result: json!(7),
        });
        c.invalidate();
        assert_eq!(c.active(), None);

        let second = c.begin().unwrap();
        assert!(second.id > first.id);
        // a late ack for the first request must not activate anything
        let outcome = c.on_inbound(Inbound::Response {
            id: first.id,
            result: json!(7),
        });
        assert!(matches!(outcome, AckOutcome::Pending));
        assert_eq!(c.active(), None);
    }

    #[test]
    fn invalid_filter_fails_before_sending() {
        let mut c = SubscriptionController::new(
            LogsFilter::mentions("not-an-address"),
            Commitment::Confirmed,
            Duration::from_secs(1),
        );
        assert!(matches!(c.begin(), Err(SubscribeError::InvalidFilter(_))));
    }

    #[test]
    fn unsubscribe_requires_active_subscription() {
        let mut c = controller();
        assert!(c.unsubscribe_request().is_none());
        let req = c.begin().unwrap();
        c.on_inbound(Inbound::Response {
            id: req.id,
            result: json!(42),
        });
        let unsub = c.unsubscribe_request().unwrap();
        assert_eq!(unsub.method, "logsUnsubscribe");
        assert_eq!(unsub.params, vec![json!(42)]);
    }
}
