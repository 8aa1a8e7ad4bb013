use std::time::Duration;

/// Client tuning. The defaults match what the server expects from a
/// well-behaved client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL of the gateway, e.g. `http://127.0.0.1:7070`.
    pub server_url: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub confirm_timeout: Duration,
    pub typing_idle: Duration,
    pub echo_match_window: Duration,
    pub notification_dedup_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:7070".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            confirm_timeout: Duration::from_secs(10),
            typing_idle: Duration::from_secs(2),
            echo_match_window: Duration::from_secs(5),
            notification_dedup_window: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    fn base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn websocket_url(&self) -> String {
        let base = self.base();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base(), path.trim_start_matches('/'))
    }
}

pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
