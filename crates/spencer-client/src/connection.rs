//! One TCP session with the robot.
//!
//! A [`Connection`] is single-use: it connects once, delivers inbound lines
//! to its observer until the session ends, and reports `Closed` exactly once.
//! Reconnecting means building a new `Connection` (see [`Reconnector`]).
//!
//! ```text
//!   send() (any thread)        mpsc        session loop (start())
//!   ┌──────────────────┐   ──────────▶   ┌──────────────────────────────┐
//!   │ validate + queue │                 │ outbound: line + flush       │
//!   └──────────────────┘                 │ inbound: lines → observer    │
//!   stop() ─── cancel token ───────────▶ │ cleanup → CLOSED (once)      │
//!                                        └──────────────────────────────┘
//! ```
//!
//! Commands are written in the order they were accepted by `send`; the
//! outbound half is the only thing that touches the write half, so lines
//! never interleave. Inbound and outbound run concurrently: a peer that
//! stops reading blocks the writer but not line delivery or `stop()`.
//!
//! [`Reconnector`]: crate::Reconnector

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandError};
use crate::config::{ConnectionConfig, Endpoint, WriteFailurePolicy};
use crate::constants::{CLOSE_TIMEOUT, MAX_LINE_LENGTH};
use crate::observer::{ConnectionObserver, ConnectionState};

// ============================================================================
// Error Types
// ============================================================================

/// Why a command was not queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),
    #[error("not connected (state: {0})")]
    NotConnected(&'static str),
    #[error("session already ended")]
    QueueClosed,
}

/// Why a session ended abnormally. Only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("inbound line longer than {0} bytes")]
    LineTooLong(usize),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// How a session that reached `Connected` came to an end.
#[derive(Debug)]
enum SessionEnd {
    PeerClosed,
    Stopped,
    Failed(SessionError),
}

// ============================================================================
// State encoding
// ============================================================================

const IDLE: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;
const CLOSED: u8 = 3;

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Connecting => CONNECTING,
        ConnectionState::Connected => CONNECTED,
        ConnectionState::Closed => CLOSED,
    }
}

fn decode(raw: u8) -> Option<ConnectionState> {
    match raw {
        CONNECTING => Some(ConnectionState::Connecting),
        CONNECTED => Some(ConnectionState::Connected),
        CLOSED => Some(ConnectionState::Closed),
        _ => None,
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A single-use line-oriented TCP session.
pub struct Connection {
    config: ConnectionConfig,
    observer: Weak<dyn ConnectionObserver>,
    state: AtomicU8,
    started: AtomicBool,
    running: AtomicBool,
    was_connected: AtomicBool,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<String>,
    queue: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Connection {
    /// Create a connection. Nothing happens on the network until [`start`].
    ///
    /// The observer is held weakly; the caller keeps it alive. Events emitted
    /// after the observer is dropped are discarded.
    ///
    /// [`start`]: Connection::start
    pub fn new<O: ConnectionObserver + 'static>(config: ConnectionConfig, observer: &Arc<O>) -> Self {
        let observer: Arc<dyn ConnectionObserver> = observer.clone();
        Self::with_parts(config, Arc::downgrade(&observer), CancellationToken::new())
    }

    pub(crate) fn with_parts(
        config: ConnectionConfig,
        observer: Weak<dyn ConnectionObserver>,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, queue) = mpsc::unbounded_channel();
        Self {
            config,
            observer,
            state: AtomicU8::new(IDLE),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            was_connected: AtomicBool::new(false),
            cancel,
            commands,
            queue: Mutex::new(Some(queue)),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Current state, or `None` before [`start`](Connection::start).
    pub fn state(&self) -> Option<ConnectionState> {
        decode(self.state.load(Ordering::Acquire))
    }

    /// True from the moment `start` begins until `Closed` has been emitted.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True if this connection ever reached `Connected`.
    pub fn was_connected(&self) -> bool {
        self.was_connected.load(Ordering::Acquire)
    }

    /// Run the whole session: connect, read until the session ends, clean up.
    ///
    /// Resolves after `Closed` has been emitted. Calling it a second time
    /// logs a warning and returns immediately. Never fails; every error ends
    /// in `Closed`.
    pub async fn start(&self) {
        let Some(queue) = self.begin() else {
            return;
        };
        self.run_session(queue).await;
        self.finish();
    }

    /// Run a session over an already-open byte stream instead of a socket.
    #[cfg(test)]
    async fn start_with_io<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(queue) = self.begin() else {
            return;
        };
        self.advance(ConnectionState::Connected);
        self.drive(reader, writer, queue).await;
        self.finish();
    }

    /// Run [`start`](Connection::start) on a dedicated thread with its own
    /// single-threaded runtime.
    pub fn spawn(self: Arc<Self>) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("spencer-conn-{}", self.config.endpoint))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("Failed to create runtime for connection: {e}");
                        self.fail_before_start();
                        return;
                    }
                };
                rt.block_on(self.start());
            })
    }

    /// Queue a command, logging and dropping it if it cannot be sent.
    pub fn send(&self, command: impl AsRef<str>) {
        let command = command.as_ref();
        if let Err(e) = self.try_send(command) {
            log::warn!("Dropping command {command:?} to {}: {e}", self.config.endpoint);
        }
    }

    /// Queue a command for the session writer.
    ///
    /// Succeeds only while `Connected`. Success means the command is queued,
    /// not that it has reached the robot.
    pub fn try_send(&self, command: impl AsRef<str>) -> Result<(), SendError> {
        let command = Command::new(command.as_ref())?;
        match self.state() {
            Some(ConnectionState::Connected) => {}
            other => {
                let name = other.map(<&'static str>::from).unwrap_or("NOT_STARTED");
                return Err(SendError::NotConnected(name));
            }
        }
        self.commands
            .send(command.into_string())
            .map_err(|_| SendError::QueueClosed)
    }

    /// Ask the session to end. Idempotent.
    ///
    /// The session notices at its next checkpoint (including while waiting
    /// for a line) and closes the socket itself.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            log::debug!("Stop requested for {}", self.config.endpoint);
        }
        self.cancel.cancel();
    }

    // ------------------------------------------------------------------------

    /// Move the state machine forward. Backward or repeated transitions are
    /// ignored, so each state is emitted at most once.
    fn advance(&self, to: ConnectionState) -> bool {
        let target = encode(to);
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= target {
                return false;
            }
            match self
                .state
                .compare_exchange(current, target, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        log::info!("Connection to {}: {}", self.config.endpoint, to);
        if to == ConnectionState::Connected {
            self.was_connected.store(true, Ordering::Release);
        }
        if let Some(observer) = self.observer.upgrade() {
            observer.connection_state_changed(to);
        }
        true
    }

    /// Claim the single start, emit `Connecting` and hand out the queue.
    fn begin(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        if self.started.swap(true, Ordering::AcqRel) {
            log::warn!("Connection to {} already started, ignoring", self.config.endpoint);
            return None;
        }
        self.running.store(true, Ordering::Release);
        self.advance(ConnectionState::Connecting);

        let queue = self.queue.lock().take();
        if queue.is_none() {
            log::error!("Command queue missing for {}", self.config.endpoint);
            self.finish();
        }
        queue
    }

    fn finish(&self) {
        self.advance(ConnectionState::Closed);
        self.running.store(false, Ordering::Release);
    }

    fn fail_before_start(&self) {
        self.started.store(true, Ordering::Release);
        self.advance(ConnectionState::Connecting);
        self.finish();
    }

    async fn connect(&self) -> Result<TcpStream, SessionError> {
        let endpoint = &self.config.endpoint;
        let timeout = self.config.connect_timeout;
        log::debug!("Connecting to {endpoint} (timeout {timeout:?})");

        let stream = tokio::time::timeout(timeout, TcpStream::connect((endpoint.host(), endpoint.port())))
            .await
            .map_err(|_| SessionError::ConnectTimeout(timeout))?
            .map_err(SessionError::Connect)?;

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Could not disable Nagle on {endpoint}: {e}");
        }
        Ok(stream)
    }

    async fn run_session(&self, queue: mpsc::UnboundedReceiver<String>) {
        let endpoint = &self.config.endpoint;

        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                log::info!("Connection to {endpoint} stopped before connecting");
                return;
            }
            result = self.connect() => match result {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("Connection to {endpoint}: {e}");
                    return;
                }
            },
        };

        self.advance(ConnectionState::Connected);

        let (read_half, write_half) = stream.into_split();
        self.drive(read_half, write_half, queue).await;
    }

    /// Pump both directions until the peer closes, an error ends the
    /// session, or `stop()` is called. Then close the write side.
    async fn drive<R, W>(&self, reader: R, mut writer: W, mut queue: mpsc::UnboundedReceiver<String>)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let endpoint = &self.config.endpoint;
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        let end = {
            let inbound = async {
                loop {
                    match lines.next().await {
                        Some(Ok(line)) => self.deliver(&line),
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            return SessionEnd::Failed(SessionError::LineTooLong(MAX_LINE_LENGTH));
                        }
                        Some(Err(LinesCodecError::Io(e))) => {
                            return SessionEnd::Failed(SessionError::Read(e));
                        }
                        None => return SessionEnd::PeerClosed,
                    }
                }
            };

            let outbound = async {
                while let Some(command) = queue.recv().await {
                    match write_line(&mut writer, &command).await {
                        Ok(()) => log::debug!("Sent {command:?}"),
                        Err(e) => {
                            log::warn!("Failed to send {command:?} to {endpoint}: {e}");
                            if self.config.on_write_failure == WriteFailurePolicy::Close {
                                return SessionEnd::Failed(SessionError::Write(e));
                            }
                        }
                    }
                }
                // The sender lives as long as `self`; only the other arms end the session.
                std::future::pending::<SessionEnd>().await
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => SessionEnd::Stopped,
                end = inbound => end,
                end = outbound => end,
            }
        };

        match &end {
            SessionEnd::PeerClosed => log::info!("{endpoint} closed the connection"),
            SessionEnd::Stopped => log::info!("Connection to {endpoint} stopped"),
            SessionEnd::Failed(e) => log::warn!("Connection to {endpoint} failed: {e}"),
        }

        // Refuse new commands before draining so the count is final.
        queue.close();
        let mut dropped = 0usize;
        while queue.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            log::warn!("Dropped {dropped} unsent command(s) for {endpoint}");
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::debug!("Shutdown on close failed for {endpoint}: {e}"),
            Err(_) => log::debug!("Shutdown on close timed out for {endpoint}"),
        }
        drop(lines);
        drop(writer);
    }

    fn deliver(&self, line: &str) {
        log::trace!("Received {line:?}");
        match self.observer.upgrade() {
            Some(observer) => observer.message_received(line),
            None => log::debug!("Observer gone, discarding {line:?}"),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Write one command and its terminator as a single buffer, then flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}
