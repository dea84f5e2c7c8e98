//! # Configuration Module
//!
//! This module provides configuration types and settings for the MCP client.
//! It includes client identification, request timeouts, outbound buffering
//! and the reconnection policy used by [`Reconnector`](crate::reconnect::Reconnector).
//!
//! ## Core Types
//!
//! - **Config**: Main configuration struct for client connections
//! - **ReconnectStrategy**: Trait for custom reconnection delays
//! - **BackoffReconnect**: Exponential backoff reconnection strategy

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

/// Environment variable holding the base URL of the PHR Analytics API.
pub const API_URL_ENV: &str = "PHR_API_URL";

/// API base URL used when [`API_URL_ENV`] is not set.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// MCP protocol revision announced in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Derives the MCP WebSocket endpoint from an HTTP(S) API base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, and `/mcp` is appended.
///
/// ## Example
///
/// ```rust
/// use phr_mcp::config::mcp_endpoint;
///
/// assert_eq!(mcp_endpoint("http://127.0.0.1:8000"), "ws://127.0.0.1:8000/mcp");
/// assert_eq!(mcp_endpoint("https://phr.example.com/"), "wss://phr.example.com/mcp");
/// ```
pub fn mcp_endpoint(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = match base.strip_prefix("http") {
        Some(rest) => format!("ws{rest}"),
        None => base.to_string(),
    };
    format!("{base}/mcp")
}

/// MCP endpoint taken from [`API_URL_ENV`], or from [`DEFAULT_API_URL`].
pub fn endpoint_from_env() -> String {
    let api_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    mcp_endpoint(&api_url)
}

/// Main configuration struct for client connections
///
/// ## Configuration Options
///
/// - **Identification**: Name, version and protocol revision sent in `initialize`
/// - **Runtime**: Custom tokio runtime handle
/// - **Timeouts**: Optional per-request timeout
/// - **Buffering**: Capacity of the outbound frame queue
/// - **Reconnection**: Strategy used by the opt-in reconnection supervisor
///
/// ## Example
///
/// ```rust
/// use phr_mcp::config::Config;
/// use std::time::Duration;
///
/// let config = Config::new()
///     .with_name("asset-report")
///     .with_version("2.0.0")
///     .with_call_timeout(Duration::from_secs(30));
/// assert_eq!(config.call_timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Client name sent as `clientInfo.name`
    pub name: String,

    /// Client version sent as `clientInfo.version`
    pub version: String,

    /// Protocol revision sent as `protocolVersion`
    pub protocol_version: String,

    /// Optional custom tokio runtime handle
    ///
    /// If not provided, the runtime of the thread calling
    /// [`Client::new`](crate::client::Client::new) is used.
    pub runtime: Option<Handle>,

    /// Timeout applied to every `call`
    ///
    /// `None` waits until the response arrives or the connection closes.
    pub call_timeout: Option<Duration>,

    /// Number of frames that may wait for the socket writer
    ///
    /// Once full, new calls wait for room before being queued.
    pub outbound_capacity: usize,

    /// Delay policy used when reconnecting after a dropped connection
    pub reconnect_strategy: Arc<dyn ReconnectStrategy>,

    /// Consecutive failed reconnection attempts before giving up
    ///
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for Config {
    /// Creates default configuration
    ///
    /// Defaults:
    /// - "PHR Web Frontend" 1.0.0, protocol revision 2024-11-05
    /// - No custom runtime
    /// - No call timeout
    /// - 32 queued outbound frames
    /// - Exponential backoff reconnection, at most 10 attempts
    fn default() -> Self {
        Config {
            name: String::from("PHR Web Frontend"),
            version: String::from("1.0.0"),
            protocol_version: String::from(PROTOCOL_VERSION),
            runtime: None,
            call_timeout: None,
            outbound_capacity: 32,
            reconnect_strategy: Arc::new(BackoffReconnect::default()),
            max_reconnect_attempts: Some(10),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_protocol_version(mut self, protocol_version: impl Into<String>) -> Self {
        self.protocol_version = protocol_version.into();
        self
    }

    /// Sets a custom tokio runtime handle
    ///
    /// ## Example
    ///
    /// ```rust
    /// use phr_mcp::config::Config;
    /// use tokio::runtime::Runtime;
    ///
    /// let runtime = Runtime::new().unwrap();
    /// let config = Config::new().with_runtime(runtime.handle().clone());
    /// ```
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Sets the outbound queue capacity. Zero is raised to one.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn with_reconnect_strategy(mut self, strategy: impl ReconnectStrategy) -> Self {
        self.reconnect_strategy = Arc::new(strategy);
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

/// Trait for implementing custom reconnection strategies
///
/// ## Example
///
/// ```rust
/// use phr_mcp::config::ReconnectStrategy;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct LinearReconnect {
///     base_delay: Duration,
/// }
///
/// impl ReconnectStrategy for LinearReconnect {
///     fn time_before_next_attempt(&self, attempt: u32) -> Duration {
///         self.base_delay * attempt
///     }
/// }
/// ```
pub trait ReconnectStrategy: std::fmt::Debug + Send + Sync + 'static {
    /// Delay before reconnection attempt number `attempt` (1-based)
    fn time_before_next_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff reconnection strategy
///
/// The delay is `min_delay * factor^attempt`, clamped between `min_delay`
/// and `max_delay`.
///
/// ## Example
///
/// ```rust
/// use phr_mcp::config::{BackoffReconnect, ReconnectStrategy};
/// use std::time::Duration;
///
/// let strategy = BackoffReconnect {
///     factor: 2.0,
///     min_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(1),
/// };
///
/// assert!(strategy.time_before_next_attempt(1) < strategy.time_before_next_attempt(2));
/// assert_eq!(strategy.time_before_next_attempt(20), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffReconnect {
    /// Exponential factor for backoff calculation
    pub factor: f64,

    /// Minimum delay between attempts
    pub min_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl ReconnectStrategy for BackoffReconnect {
    fn time_before_next_attempt(&self, attempt: u32) -> Duration {
        if self.min_delay > self.max_delay {
            return self.max_delay;
        }

        let time = self.min_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let time = time.clamp(self.min_delay.as_secs_f64(), self.max_delay.as_secs_f64());
        Duration::from_secs_f64(time)
    }
}

impl Default for BackoffReconnect {
    /// Doubles from 200ms up to 20 seconds
    fn default() -> Self {
        BackoffReconnect {
            factor: 2.0,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(20),
        }
    }
}
