//! When and how soon to reconnect after a connection ends.

use std::time::Duration;

use rand::Rng;

use crate::config::ClientConfig;
use crate::error::ClientError;

const AUTH_FAILURE_MARKERS: [&str; 3] = ["Authentication error", "jwt expired", "invalid token"];

/// True when a rejection or close reason points at the credential.
pub fn is_auth_failure_reason(reason: &str) -> bool {
    AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| reason.contains(marker))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The socket ended without a close frame.
    TransportClosed,
    TransportError(String),
    /// The server sent a close frame.
    ServerClosed(Option<String>),
    ClientRequested,
    AuthRejected(String),
}

impl Disconnect {
    pub fn from_error(err: &ClientError) -> Self {
        match err {
            ClientError::AuthRejected(reason) => Disconnect::AuthRejected(reason.clone()),
            other => Disconnect::TransportError(other.to_string()),
        }
    }

    fn is_auth_failure(&self) -> bool {
        match self {
            Disconnect::AuthRejected(_) => true,
            Disconnect::TransportError(reason) => is_auth_failure_reason(reason),
            Disconnect::ServerClosed(Some(reason)) => is_auth_failure_reason(reason),
            _ => false,
        }
    }

    /// Only transport-level failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Disconnect::TransportClosed | Disconnect::TransportError(_)
        ) && !self.is_auth_failure()
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.reconnect_delay,
            config.max_reconnect_delay,
            config.max_reconnect_attempts,
        )
    }

    /// Delay before the next attempt, or `None` when reconnecting should
    /// stop.
    pub fn next_delay(&mut self, reason: &Disconnect) -> Option<Duration> {
        if !reason.is_retryable() || self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_for(self.attempts))
    }

    /// Called once a connection is established again.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);
        // Equal jitter: half fixed, half random.
        let half = backoff / 2;
        let jitter = rand::thread_rng().gen_range(0.0..=1.0);
        half + half.mul_f64(jitter)
    }
}
