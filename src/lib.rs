//! Resilient `logsSubscribe` client.
//!
//! Connects to a Solana-style JSON-RPC WebSocket endpoint, subscribes to the
//! logs of transactions matching a filter, and streams the notifications to
//! the caller in arrival order. Dropped connections are re-established with
//! exponential backoff and the subscription is re-acquired on every new
//! connection; notifications tagged with an id from an earlier connection
//! are never delivered.
//!
//! # Example
//!
//! ```no_run
//! use logsub::{Client, ClientConfig, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::mentions(
//!         "ws://127.0.0.1:8900",
//!         "B4FMCpibTGdZhxHHNgWWnwk5PhhKdST37uFRY6TVksaj",
//!     );
//!     let client = Client::start(config)?;
//!
//!     while let Some(event) = client.next_event().await {
//!         match event {
//!             Event::Notification(n) => println!("{}", n.payload),
//!             Event::Error(e) => eprintln!("{}", e),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod frame;
pub mod subscription;

pub use backoff::{Backoff, BackoffConfig};
pub use client::Client;
pub use codec::RpcCodec;
pub use config::{ClientConfig, Endpoint};
pub use connection::{Connection, ConnectionState, DropReason};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{
    ClientError, ConfigError, ConnectError, DecodeError, RpcErrorObject, ShutdownRequested,
    SubscribeError,
};
pub use event::Event;
pub use frame::{
    Commitment, Inbound, LogsFilter, LogsResult, Notification, Request, SubscriptionId,
};
pub use subscription::SubscriptionController;
