//! Optional reconnect policy layered above [`Connection`].
//!
//! A `Connection` never retries. [`Reconnector`] builds a fresh one per
//! attempt and waits an exponentially growing delay between failed
//! attempts. The observer sees each attempt's own
//! `CONNECTING → [CONNECTED →] CLOSED` sequence.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, SendError};
use crate::constants::{RETRY_INITIAL_DELAY, RETRY_MAX_DELAY};
use crate::observer::{ConnectionObserver, ConnectionState};

/// Retry settings. The default performs no retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Consecutive failed attempts tolerated before giving up. 0 disables
    /// reconnecting entirely, even after a session that connected.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: RETRY_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: RETRY_MAX_DELAY.as_millis() as u64,
        }
    }
}

impl RetryPolicy {
    pub fn enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Delay before retry number `attempt` (1-based): initial, 2x, 4x, ...
    /// capped at `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let ms = self.initial_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Runs successive connections to the same endpoint.
pub struct Reconnector {
    config: ConnectionConfig,
    policy: RetryPolicy,
    observer: Weak<dyn ConnectionObserver>,
    cancel: CancellationToken,
    current: Mutex<Option<Arc<Connection>>>,
}

impl Reconnector {
    pub fn new<O: ConnectionObserver + 'static>(
        config: ConnectionConfig,
        policy: RetryPolicy,
        observer: &Arc<O>,
    ) -> Self {
        let observer: Arc<dyn ConnectionObserver> = observer.clone();
        Self {
            config,
            policy,
            observer: Arc::downgrade(&observer),
            cancel: CancellationToken::new(),
            current: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Connect, and reconnect per the policy, until retries are exhausted
    /// or [`stop`](Reconnector::stop) is called. Returns the number of
    /// connections attempted.
    pub async fn run(&self) -> u32 {
        let mut attempts = 0u32;
        let mut failures = 0u32;

        while !self.cancel.is_cancelled() {
            let conn = Arc::new(Connection::with_parts(
                self.config.clone(),
                self.observer.clone(),
                self.cancel.child_token(),
            ));
            *self.current.lock() = Some(conn.clone());
            attempts += 1;

            conn.start().await;

            if conn.was_connected() {
                failures = 0;
            } else {
                failures += 1;
            }

            if self.cancel.is_cancelled() || !self.policy.enabled() {
                break;
            }
            if failures > self.policy.max_retries {
                log::warn!(
                    "Giving up on {} after {failures} failed attempt(s)",
                    self.config.endpoint
                );
                break;
            }

            let delay = self.policy.delay(failures.max(1));
            log::info!("Reconnecting to {} in {delay:?}", self.config.endpoint);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        attempts
    }

    /// Send through the current connection. Dropped and logged if there is
    /// no live connection.
    pub fn send(&self, command: impl AsRef<str>) {
        let command = command.as_ref();
        if let Err(e) = self.try_send(command) {
            log::warn!("Dropping command {command:?} to {}: {e}", self.config.endpoint);
        }
    }

    pub fn try_send(&self, command: impl AsRef<str>) -> Result<(), SendError> {
        match self.current.lock().as_ref() {
            Some(conn) => conn.try_send(command),
            None => Err(SendError::NotConnected("NOT_STARTED")),
        }
    }

    /// State of the current attempt.
    pub fn state(&self) -> Option<ConnectionState> {
        self.current.lock().as_ref().and_then(|c| c.state())
    }

    /// Stop the current connection and any further attempts. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
