//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::backoff::BackoffConfig;
use crate::error::ConfigError;
use crate::frame::{Commitment, LogsFilter};

/// Default RPC WebSocket endpoint (a local validator's pubsub port).
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8900";

/// Immutable connection target plus transport parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// WebSocket URI (`ws://` or `wss://`)
    pub url: String,

    /// Upper bound for TCP connect, TLS and WebSocket upgrade together
    pub connect_timeout: Duration,

    /// Drop the connection when nothing arrives for this long
    pub idle_timeout: Duration,

    /// Interval between keepalive pings, `None` to disable
    pub ping_interval: Option<Duration>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            ping_interval: Some(Duration::from_secs(30)),
        }
    }

    /// Parse the URI and check it uses a WebSocket scheme.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason,
        };
        let parsed = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host".into()));
        }
        Ok(parsed)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

/// Configuration for a subscription client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,

    /// Which transactions' logs to stream
    pub filter: LogsFilter,

    pub commitment: Commitment,

    /// Reconnect delay bounds
    pub backoff: BackoffConfig,

    /// How long to wait for the subscribe acknowledgement
    pub subscribe_timeout: Duration,

    /// Capacity of the consumer event queue
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Create a configuration for `url` with the given filter and defaults
    /// for everything else.
    pub fn new(url: impl Into<String>, filter: LogsFilter) -> Self {
        Self {
            endpoint: Endpoint::new(url),
            filter,
            commitment: Commitment::default(),
            backoff: BackoffConfig::default(),
            subscribe_timeout: Duration::from_secs(10),
            event_capacity: 1024,
        }
    }

    /// Stream logs of transactions mentioning `address`.
    pub fn mentions(url: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(url, LogsFilter::mentions(address))
    }

    pub fn commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    /// Set the reconnection delay range
    pub fn reconnect_delay(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff = BackoffConfig { base, cap };
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.connect_timeout = timeout;
        self
    }

    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.idle_timeout = timeout;
        self
    }

    /// Set the keepalive ping interval, `None` disables pings
    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.endpoint.ping_interval = interval;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Reject configurations the client could never run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint.validate()?;
        self.filter.validate().map_err(ConfigError::InvalidFilter)?;
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidSetting(
                "event capacity must be greater than zero".into(),
            ));
        }
        if self.backoff.base.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "reconnect base delay must be non-zero".into(),
            ));
        }
        if self.backoff.cap < self.backoff.base {
            return Err(ConfigError::InvalidSetting(format!(
                "reconnect cap {:?} is below base {:?}",
                self.backoff.cap, self.backoff.base
            )));
        }
        for (name, value) in [
            ("connect timeout", self.endpoint.connect_timeout),
            ("idle timeout", self.endpoint.idle_timeout),
            ("subscribe timeout", self.subscribe_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidSetting(format!("{} must be non-zero", name)));
            }
        }
        if self.endpoint.ping_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidSetting("ping interval must be non-zero".into()));
        }
        Ok(())
    }
}
