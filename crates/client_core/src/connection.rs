//! Connection lifecycle and reconnect scheduling, free of any I/O.
//!
//! `Connecting -> Open -> Closed -> (timer) -> Connecting`. The control loop
//! feeds transport outcomes in and acts on what comes back.

use std::time::Duration;

use shared::domain::ConnectionState;
use tracing::{debug, info};
use url::Url;

use crate::error::TransportError;

pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1_000);
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_RECONNECT_BASE,
            cap: DEFAULT_RECONNECT_CAP,
        }
    }
}

impl Backoff {
    /// `min(base * 2^attempt, cap)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Builds `<ws-scheme>://<host>/ws?username=<name>` from an http(s) base URL.
pub fn session_url(server_url: &str, username: &str) -> Result<String, TransportError> {
    let ws_base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(TransportError::InvalidServerUrl(server_url.to_string()));
    };
    let mut url = Url::parse(&ws_base)
        .map_err(|_| TransportError::InvalidServerUrl(server_url.to_string()))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("username", username);
    Ok(url.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPlan {
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Debug)]
pub struct SessionConnection {
    state: ConnectionState,
    attempt: u32,
    username: Option<String>,
    reconnect_pending: bool,
    shut_down: bool,
    backoff: Backoff,
}

impl SessionConnection {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Closed,
            attempt: 0,
            username: None,
            reconnect_pending: false,
            shut_down: false,
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Starts a fresh connection for `username`, re-enabling auto-reconnect.
    pub fn open(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
        self.shut_down = false;
        self.reconnect_pending = false;
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self) {
        info!(attempt = self.attempt, "session connection open");
        self.state = ConnectionState::Open;
        self.attempt = 0;
    }

    /// Records a transport closure or failed connect.
    ///
    /// Returns the reconnect to schedule, if any. Repeated close events while
    /// already closed never schedule a second timer.
    pub fn on_closed(&mut self) -> Option<ReconnectPlan> {
        if self.state == ConnectionState::Closed {
            debug!("ignoring close event on closed connection");
            return None;
        }
        self.state = ConnectionState::Closed;
        if self.shut_down || self.reconnect_pending || self.username.is_none() {
            return None;
        }
        self.reconnect_pending = true;
        let plan = ReconnectPlan {
            attempt: self.attempt,
            delay: self.backoff.delay(self.attempt),
        };
        info!(
            attempt = plan.attempt,
            delay_ms = plan.delay.as_millis() as u64,
            "scheduling reconnect"
        );
        Some(plan)
    }

    /// Reconnect timer fired. Returns the username to reconnect as.
    pub fn on_reconnect_due(&mut self) -> Option<String> {
        if !self.reconnect_pending || self.shut_down || self.state != ConnectionState::Closed {
            return None;
        }
        self.reconnect_pending = false;
        self.attempt = self.attempt.saturating_add(1);
        self.state = ConnectionState::Connecting;
        self.username.clone()
    }

    /// Local teardown; suppresses auto-reconnect until the next `open`.
    pub fn close(&mut self) {
        self.shut_down = true;
        self.reconnect_pending = false;
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
