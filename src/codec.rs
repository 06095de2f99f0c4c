use serde_json::{Map, Value};

use crate::error::{DecodeError, RpcErrorObject};
use crate::frame::{Inbound, Notification, Request, SubscriptionId};

/// `RpcCodec` converts between WebSocket frame payloads and the JSON-RPC
/// message types in [`crate::frame`].
///
/// Responsibilities:
/// - Encode outbound `Request`s as compact JSON text.
/// - Decode inbound payloads into `Inbound::Response`,
///   `Inbound::ErrorResponse` or `Inbound::Notification`.
///
/// Decoding is shape-based rather than method-based: a message carrying
/// `params.subscription` is a notification whatever its `method`, and a
/// message carrying `id` is a response.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcCodec;

impl RpcCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, request: &Request) -> Result<String, serde_json::Error> {
        serde_json::to_string(request)
    }

    /// Decode a raw frame payload.
    ///
    /// Parameters
    /// - `raw`: payload bytes of a text or binary WebSocket frame.
    ///
    /// Returns the decoded message, or a `DecodeError` describing why the
    /// payload does not match any known shape. The error never depends on
    /// connection state, so callers can drop the frame and carry on.
    pub fn decode(&self, raw: &[u8]) -> Result<Inbound, DecodeError> {
        let value: Value = serde_json::from_slice(raw)?;
        let Value::Object(mut obj) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let params = obj
            .get_mut("params")
            .and_then(Value::as_object_mut)
            .filter(|params| params.contains_key("subscription"));
        if let Some(params) = params {
            let subscription = parse_subscription_id(&params["subscription"])?;
            let payload = params
                .remove("result")
                .ok_or(DecodeError::MissingField("params.result"))?;
            return Ok(Inbound::Notification(Notification {
                method,
                subscription,
                payload,
            }));
        }

        if !obj.contains_key("id") {
            return Err(DecodeError::UnrecognizedShape);
        }

        if let Some(error) = obj.remove("error") {
            let error: RpcErrorObject = serde_json::from_value(error)?;
            // `null` is how a server answers a request it could not read.
            let id = match obj.get("id") {
                Some(Value::Null) => None,
                _ => Some(response_id(&obj)?),
            };
            return Ok(Inbound::ErrorResponse { id, error });
        }

        let id = response_id(&obj)?;
        let result = obj
            .remove("result")
            .ok_or(DecodeError::MissingField("result"))?;
        Ok(Inbound::Response { id, result })
    }
}

fn response_id(obj: &Map<String, Value>) -> Result<u64, DecodeError> {
    let id = obj.get("id").ok_or(DecodeError::MissingField("id"))?;
    id.as_u64()
        .ok_or_else(|| DecodeError::InvalidRequestId(id.to_string()))
}

fn parse_subscription_id(value: &Value) -> Result<SubscriptionId, DecodeError> {
    value
        .as_u64()
        .map(SubscriptionId)
        .ok_or_else(|| DecodeError::InvalidSubscriptionId(value.to_string()))
}
