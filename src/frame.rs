use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::RpcErrorObject;

/// Method used to open a logs subscription.
pub const SUBSCRIBE_METHOD: &str = "logsSubscribe";
/// Method used to cancel a logs subscription.
pub const UNSUBSCRIBE_METHOD: &str = "logsUnsubscribe";

/// Server-assigned subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commitment level attached to the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level '{}'", other)),
        }
    }
}

/// Which transactions' logs the server should stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogsFilter {
    /// All transactions except simple vote transactions.
    All,
    /// All transactions including simple vote transactions.
    AllWithVotes,
    /// Transactions that mention the given account address.
    Mentions(String),
}

impl LogsFilter {
    pub fn mentions(address: impl Into<String>) -> Self {
        LogsFilter::Mentions(address.into())
    }

    /// Check the filter before it goes on the wire.
    ///
    /// A `mentions` address must be a base58 string of 32 to 44 characters.
    pub fn validate(&self) -> Result<(), String> {
        let LogsFilter::Mentions(address) = self else {
            return Ok(());
        };
        if address.is_empty() {
            return Err("mentions address is empty".into());
        }
        if !(32..=44).contains(&address.len()) {
            return Err(format!(
                "mentions address '{}' has length {}, expected 32..=44",
                address,
                address.len()
            ));
        }
        if let Some(bad) = address.chars().find(|c| !is_base58(*c)) {
            return Err(format!(
                "mentions address '{}' contains non-base58 character '{}'",
                address, bad
            ));
        }
        Ok(())
    }

    /// The first positional parameter of `logsSubscribe`.
    pub fn to_param(&self) -> Value {
        match self {
            LogsFilter::All => json!("all"),
            LogsFilter::AllWithVotes => json!("allWithVotes"),
            LogsFilter::Mentions(address) => json!({ "mentions": [address] }),
        }
    }
}

impl fmt::Display for LogsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogsFilter::All => f.write_str("all"),
            LogsFilter::AllWithVotes => f.write_str("allWithVotes"),
            LogsFilter::Mentions(address) => write!(f, "mentions:{}", address),
        }
    }
}

fn is_base58(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
}

/// An outbound JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl Request {
    /// Build a `logsSubscribe` request.
    ///
    /// Parameters
    /// - `id`: JSON-RPC request id used to correlate the acknowledgement.
    /// - `filter`: which transactions to stream.
    /// - `commitment`: commitment level sent as the second parameter.
    pub fn subscribe(id: u64, filter: &LogsFilter, commitment: Commitment) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: SUBSCRIBE_METHOD,
            params: vec![filter.to_param(), json!({ "commitment": commitment })],
        }
    }

    /// Build a `logsUnsubscribe` request for an acknowledged subscription.
    pub fn unsubscribe(id: u64, subscription: SubscriptionId) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: UNSUBSCRIBE_METHOD,
            params: vec![json!(subscription.0)],
        }
    }
}

/// A notification for a subscription: the id it was tagged with and the
/// opaque `params.result` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// `method` field, when the server sent one (e.g. `logsNotification`).
    pub method: Option<String>,
    pub subscription: SubscriptionId,
    pub payload: Value,
}

impl Notification {
    /// Interpret the payload as a logs notification result.
    pub fn logs(&self) -> Result<LogsResult, serde_json::Error> {
        LogsResult::deserialize(&self.payload)
    }
}

/// Typed view of a `logsNotification` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsResult {
    pub context: LogsContext,
    pub value: LogsValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsContext {
    pub slot: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsValue {
    pub signature: String,
    /// Transaction error, `None` when the transaction succeeded.
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Successful response to a request.
    Response { id: u64, result: Value },
    /// Error response. `id` is `None` when the server could not parse the
    /// request it is answering.
    ErrorResponse {
        id: Option<u64>,
        error: RpcErrorObject,
    },
    /// Subscription notification.
    Notification(Notification),
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inbound::Response { id, result } => write!(f, "response id={} result={}", id, result),
            Inbound::ErrorResponse { id, error } => match id {
                Some(id) => write!(f, "error id={} ({}): {}", id, error.code, error.message),
                None => write!(f, "error id=null ({}): {}", error.code, error.message),
            },
            Inbound::Notification(n) => write!(f, "notification subscription={}", n.subscription),
        }
    }
}
