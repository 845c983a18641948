//! Client configuration constants.
//!
//! Centralizes the defaults the robot ships with so they can be overridden
//! from a config file or the command line.

use std::time::Duration;

/// Default robot host on the lab network.
pub const DEFAULT_HOST: &str = "palmon";

/// Default robot control port.
pub const DEFAULT_PORT: u16 = 1050;

/// Number of sensor readings kept for display.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Inbound lines starting with this literal are telemetry reports.
pub const SENSOR_PREFIX: &str = "sensor";

/// Upper bound on the TCP connect. Keeps a SYN blackhole from pinning the
/// connection in CONNECTING forever.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// First reconnect delay when a retry policy is enabled.
pub const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delay cap.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Longest inbound line accepted, excluding the terminator. A peer that
/// streams more than this without a newline ends the session.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Bound on the half-close sent while tearing a session down.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
