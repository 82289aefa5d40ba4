use std::time::Duration;

/// Fixed endpoint path the server registers for STOMP clients
pub const ENDPOINT_PATH: &str = "/ws";

/// Suffix of the raw WebSocket entry point a SockJS endpoint exposes
pub const SOCKJS_WEBSOCKET_SUFFIX: &str = "/websocket";

/// Configuration options for the feed client
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Scheme, host and port of the server, e.g. `ws://localhost:8080`
    pub origin: String,

    /// Connect through the SockJS raw WebSocket entry point (`/ws/websocket`)
    /// instead of `/ws` itself
    pub sockjs: bool,

    /// Value of the `host` header sent with CONNECT, if any
    pub host: Option<String>,

    /// Interval at which the client offers to send heart-beats.
    /// Zero disables outgoing heart-beats.
    pub heartbeat: Duration,

    /// How long to wait for CONNECTED. `None` waits forever.
    pub connect_timeout: Option<Duration>,

    /// How long `disconnect` waits for the server's RECEIPT
    pub disconnect_timeout: Duration,

    /// Maximum number of entries the message log keeps.
    /// `None` lets the log grow without bound.
    pub max_log_entries: Option<usize>,
}

impl Default for FeedClientConfig {
    fn default() -> Self {
        Self {
            origin: "ws://localhost:8080".to_string(),
            sockjs: true,
            host: None,
            heartbeat: Duration::ZERO,
            connect_timeout: None,
            disconnect_timeout: Duration::from_secs(2),
            max_log_entries: None,
        }
    }
}

impl FeedClientConfig {
    /// Creates a builder for FeedClientConfig
    pub fn builder() -> FeedClientConfigBuilder {
        FeedClientConfigBuilder::default()
    }

    /// Full URL of the STOMP endpoint
    pub fn endpoint_url(&self) -> String {
        let origin = self.origin.trim_end_matches('/');
        if self.sockjs {
            format!("{}{}{}", origin, ENDPOINT_PATH, SOCKJS_WEBSOCKET_SUFFIX)
        } else {
            format!("{}{}", origin, ENDPOINT_PATH)
        }
    }
}

/// Builder for FeedClientConfig
#[derive(Default)]
pub struct FeedClientConfigBuilder {
    origin: Option<String>,
    sockjs: Option<bool>,
    host: Option<String>,
    heartbeat: Option<Duration>,
    connect_timeout: Option<Duration>,
    disconnect_timeout: Option<Duration>,
    max_log_entries: Option<usize>,
}

impl FeedClientConfigBuilder {
    /// Sets the server origin
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Enables or disables the SockJS raw WebSocket suffix
    pub fn sockjs(mut self, enabled: bool) -> Self {
        self.sockjs = Some(enabled);
        self
    }

    /// Sets the CONNECT `host` header
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the outgoing heart-beat interval
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Sets the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the disconnect receipt timeout
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = Some(timeout);
        self
    }

    /// Caps the message log
    pub fn max_log_entries(mut self, max: usize) -> Self {
        self.max_log_entries = Some(max);
        self
    }

    /// Builds the configuration
    pub fn build(self) -> FeedClientConfig {
        let default = FeedClientConfig::default();
        FeedClientConfig {
            origin: self.origin.unwrap_or(default.origin),
            sockjs: self.sockjs.unwrap_or(default.sockjs),
            host: self.host.or(default.host),
            heartbeat: self.heartbeat.unwrap_or(default.heartbeat),
            connect_timeout: self.connect_timeout.or(default.connect_timeout),
            disconnect_timeout: self
                .disconnect_timeout
                .unwrap_or(default.disconnect_timeout),
            max_log_entries: self.max_log_entries.or(default.max_log_entries),
        }
    }
}
