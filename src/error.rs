//! Error taxonomy for the subscription client.
//!
//! Only [`ShutdownRequested`] is terminal. Everything else is recovered
//! locally by reconnecting and is surfaced to the consumer through
//! [`Event::Error`](crate::Event::Error).

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::connection::DropReason;

/// Transport-level failure while establishing a connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The endpoint URI could not be used to build a handshake request.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    /// TCP connect, TLS or WebSocket upgrade failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
    /// The handshake did not finish within the configured connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

/// JSON-RPC error object returned by the server.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Protocol-level failure while acquiring a subscription.
#[derive(Error, Debug)]
pub enum SubscribeError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// The server answered the subscribe request with an error response.
    #[error("subscribe rejected ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("no subscribe acknowledgement within {0:?}")]
    Timeout(Duration),
    /// The acknowledgement `result` was not a subscription id.
    #[error("malformed acknowledgement: {0}")]
    MalformedAck(serde_json::Value),
    #[error("failed to send subscribe request: {0}")]
    Send(String),
    #[error("connection lost while subscribing: {0}")]
    ConnectionLost(DropReason),
}

impl From<RpcErrorObject> for SubscribeError {
    fn from(err: RpcErrorObject) -> Self {
        SubscribeError::Rejected {
            code: err.code,
            message: err.message,
        }
    }
}

/// A frame that could not be decoded into a known message shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("expected a json object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid subscription id: {0}")]
    InvalidSubscriptionId(String),
    #[error("invalid request id: {0}")]
    InvalidRequestId(String),
    #[error("unrecognized message shape")]
    UnrecognizedShape,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::InvalidJson(err.to_string())
    }
}

/// Cooperative cancellation. Not an error condition; it ends the client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("shutdown requested")]
pub struct ShutdownRequested;

/// Errors reported to the consumer's error sink.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),
    #[error("subscribe error: {0}")]
    Subscribe(#[from] SubscribeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// An error response that does not belong to a subscribe request, e.g.
    /// one received while streaming.
    #[error("server error response ({}): {}", .error.code, .error.message)]
    Server {
        request_id: Option<u64>,
        error: RpcErrorObject,
    },
}

/// Invalid configuration, detected before the client task is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid endpoint url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}
