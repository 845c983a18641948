//! `spencer mock-robot`: a stand-in robot for exercising the console.
//!
//! Greets each client with `Doing nothing`, acknowledges every command with
//! `Received <n> messages`, and can stream canned sensor lines.

use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::MockArgs;

/// Readings cycled through when telemetry streaming is on.
const SAMPLE_TELEMETRY: &[&str] = &[
    "sensor Front distance = 13cm",
    "sensor Front touch = 1",
    "sensor Front touch = 0",
    "sensor Front distance = 10cm",
    "sensor Front distance = 12.5cm",
    "sensor Back touch = 1",
    "sensor Back touch = 0",
    "sensor Front lifting = 1",
    "sensor Front lifting = 0",
];

const GREETING: &str = "Doing nothing";

fn ack(count: u64) -> String {
    format!("Received {count} messages")
}

pub async fn run(args: MockArgs) -> anyhow::Result<()> {
    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!("Mock robot listening on {}", listener.local_addr()?);

    let telemetry = (args.telemetry_interval_ms > 0)
        .then(|| Duration::from_millis(args.telemetry_interval_ms));
    serve(listener, telemetry).await
}

/// Accept clients forever, one task each.
pub async fn serve(listener: TcpListener, telemetry: Option<Duration>) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("Connection from {peer}");
        tokio::spawn(async move {
            match handle_client(stream, telemetry).await {
                Ok(count) => tracing::info!("Lost connection from {peer} after {count} messages"),
                Err(e) => tracing::warn!("Lost connection from {peer}: {e}"),
            }
        });
    }
}

async fn handle_client(stream: TcpStream, telemetry: Option<Duration>) -> std::io::Result<u64> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut count = 0u64;

    write_half.write_all(format!("{GREETING}\n").as_bytes()).await?;

    // A disabled ticker still needs a value; it just never gets polled.
    let mut ticker = tokio::time::interval(telemetry.unwrap_or(Duration::from_secs(3600)));
    ticker.tick().await;
    let mut samples = SAMPLE_TELEMETRY.iter().cycle();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(message) => {
                    count += 1;
                    tracing::info!("Message received: {message}");
                    write_half.write_all(format!("{}\n", ack(count)).as_bytes()).await?;
                }
                None => return Ok(count),
            },
            _ = ticker.tick(), if telemetry.is_some() => {
                if let Some(sample) = samples.next() {
                    write_half.write_all(format!("{sample}\n").as_bytes()).await?;
                }
            }
        }
    }
}
