//! Observer contract between a [`Connection`](crate::Connection) and its caller.
//!
//! Both callbacks are invoked from the connection's own execution context.
//! A consumer that owns UI state must marshal onto its own context; the
//! [`ChannelObserver`] does exactly that by forwarding every callback into an
//! mpsc channel the consumer drains at its leisure.
//!
//! ```text
//!   Connection (session task)      mpsc       consumer (UI loop)
//!   ┌─────────────────────────┐  ────────▶  ┌──────────────────────┐
//!   │ connection_state_changed│             │ rx.recv() → render   │
//!   │ message_received        │             │                      │
//!   └─────────────────────────┘             └──────────────────────┘
//! ```

use strum::{Display, IntoStaticStr};
use tokio::sync::mpsc;

/// Connection lifecycle state.
///
/// Progresses strictly forward: `Connecting → Connected → Closed`, or
/// `Connecting → Closed` when the connect fails. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

/// Callbacks a connection emits to its caller.
///
/// Implementations must not block for long: inbound lines queue behind
/// `message_received`.
pub trait ConnectionObserver: Send + Sync {
    fn connection_state_changed(&self, state: ConnectionState);
    fn message_received(&self, line: &str);
}

/// Observer events in owned form, for consumers that drain a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    Message(String),
}

/// Forwards observer callbacks into an unbounded mpsc channel.
///
/// Sends are dropped silently once the receiver is gone.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConnectionObserver for ChannelObserver {
    fn connection_state_changed(&self, state: ConnectionState) {
        let _ = self.tx.send(ConnectionEvent::StateChanged(state));
    }

    fn message_received(&self, line: &str) {
        let _ = self.tx.send(ConnectionEvent::Message(line.to_string()));
    }
}
