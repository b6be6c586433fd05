//! Client configuration, with overrides from environment variables.

/// URL scheme of the chat server. The WebSocket scheme follows it
/// (`http` -> `ws`, `https` -> `wss`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn http(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn ws(self) -> &'static str {
        match self {
            Scheme::Http => "ws",
            Scheme::Https => "wss",
        }
    }
}

/// Location of the chat server. One endpoint serves both the REST API and
/// the persistent event connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            host: "localhost".to_string(),
            port: Some(8080),
        }
    }
}

impl Endpoint {
    fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Base URL for REST requests, without a trailing slash.
    pub fn http_base(&self) -> String {
        format!("{}://{}", self.scheme.http(), self.authority())
    }

    /// Full URL of a REST path, e.g. `construct_path("api/login")`.
    pub fn construct_path(&self, subdir: &str) -> String {
        format!("{}/{}", self.http_base(), subdir.trim_start_matches('/'))
    }

    /// URL of the persistent event connection.
    pub fn ws_url(&self) -> String {
        format!("{}://{}", self.scheme.ws(), self.authority())
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Top-level configuration of the sync client.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub endpoint: Endpoint,
    pub reconnect: ReconnectConfig,
    /// Re-acquire the connection with backoff when it closes.
    pub auto_reconnect: bool,
    /// Delay before a focus change is reported as a status update.
    pub status_delay_ms: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            reconnect: ReconnectConfig::default(),
            auto_reconnect: true,
            status_delay_ms: 1000,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BUBBLE_SERVER_SCHEME`: "http" | "https" (default: "http")
    /// - `BUBBLE_SERVER_HOST`: server host (default: "localhost")
    /// - `BUBBLE_SERVER_PORT`: server port, empty for none (default: 8080)
    /// - `BUBBLE_AUTO_RECONNECT`: "true" | "false" (default: "true")
    /// - `BUBBLE_RECONNECT_MAX_ATTEMPTS`: 0 for unlimited (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(scheme) = lookup("BUBBLE_SERVER_SCHEME") {
            config.endpoint.scheme = match scheme.to_lowercase().as_str() {
                "https" => Scheme::Https,
                _ => Scheme::Http,
            };
        }
        if let Some(host) = lookup("BUBBLE_SERVER_HOST").filter(|h| !h.trim().is_empty()) {
            config.endpoint.host = host.trim().to_string();
        }
        if let Some(port) = lookup("BUBBLE_SERVER_PORT") {
            let port = port.trim();
            if port.is_empty() {
                config.endpoint.port = None;
            } else if let Ok(port) = port.parse() {
                config.endpoint.port = Some(port);
            }
        }
        if let Some(flag) = lookup("BUBBLE_AUTO_RECONNECT") {
            if let Ok(flag) = flag.trim().parse() {
                config.auto_reconnect = flag;
            }
        }
        if let Some(max) = lookup("BUBBLE_RECONNECT_MAX_ATTEMPTS") {
            if let Ok(max) = max.trim().parse() {
                config.reconnect.max_attempts = max;
            }
        }

        config
    }
}
