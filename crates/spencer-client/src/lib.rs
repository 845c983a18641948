//! Spencer remote-control client library
//!
//! Talks to the robot over a plain-text, newline-delimited TCP protocol:
//! commands go out one per line, status and telemetry lines come back.
//!
//! ```no_run
//! use std::sync::Arc;
//! use spencer_client::{ChannelObserver, Connection, ConnectionConfig, Endpoint, RobotCommand};
//!
//! # async fn demo() -> Result<(), spencer_client::ConfigError> {
//! let (observer, mut events) = ChannelObserver::new();
//! let observer = Arc::new(observer);
//! let conn = Arc::new(Connection::new(
//!     ConnectionConfig::new(Endpoint::new("palmon", 1050)?),
//!     &observer,
//! ));
//!
//! let session = tokio::spawn({
//!     let conn = conn.clone();
//!     async move { conn.start().await }
//! });
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//!     conn.send(RobotCommand::Forward);
//! }
//! # let _ = session.await;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dashboard;
pub mod history;
pub mod message;
pub mod observer;
pub mod reconnect;

pub use command::{Command, CommandError, RobotCommand};
pub use config::{ClientConfig, ConfigError, ConnectionConfig, Endpoint, WriteFailurePolicy};
pub use connection::{Connection, SendError, SessionError};
pub use dashboard::{Dashboard, DashboardUpdate};
pub use history::TelemetryHistory;
pub use message::{InboundMessage, SensorReading, is_sensor_line};
pub use observer::{ChannelObserver, ConnectionEvent, ConnectionObserver, ConnectionState};
pub use reconnect::{Reconnector, RetryPolicy};
