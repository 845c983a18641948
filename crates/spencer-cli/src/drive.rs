//! `spencer drive`: interactive operator console.
//!
//! Stdin is read on its own thread and bridged into the async loop through
//! a channel, so a pending read never holds up shutdown.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use spencer_client::{
    ChannelObserver, ClientConfig, Dashboard, DashboardUpdate, Endpoint, Reconnector,
    RobotCommand, SensorReading,
};
use strum::IntoEnumIterator;
use tokio::sync::mpsc;

use crate::DriveArgs;

/// Operator input after parsing.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Help,
    Skip,
    Send(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Skip,
        "quit" | "exit" => Input::Quit,
        "help" | "?" => Input::Help,
        cmd => Input::Send(cmd),
    }
}

/// Resolve the config file plus command-line overrides.
fn resolve_config(args: &DriveArgs) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::load_or_default(args.config.as_deref())
        .context("loading client config")?;

    if args.host.is_some() || args.port.is_some() {
        let host = args.host.clone().unwrap_or_else(|| config.endpoint.host().to_string());
        let port = args.port.unwrap_or(config.endpoint.port());
        config.endpoint = Endpoint::new(host, port).context("invalid endpoint")?;
    }
    if let Some(history) = args.history {
        config.history_capacity = history;
    }
    if let Some(retries) = args.retries {
        config.retry.max_retries = retries;
    }
    config.validate()?;
    Ok(config)
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn render(update: &DashboardUpdate, dash: &Dashboard) {
    match update {
        DashboardUpdate::State(state) => println!("[{state}]"),
        DashboardUpdate::Status(line) => println!("robot: {line}"),
        DashboardUpdate::Telemetry => {
            let history = dash.telemetry();
            if let Some(latest) = history.latest() {
                match SensorReading::parse(latest) {
                    Some(r) => println!("{:>20} = {}", r.subject, r.value),
                    None => println!("{latest}"),
                }
            }
            log::debug!("telemetry history: {}/{}", history.len(), history.capacity());
        }
    }
}

fn print_help() {
    println!("Commands are sent to the robot verbatim. Known commands:");
    for cmd in RobotCommand::iter() {
        println!("  {cmd}");
    }
    println!("Type `quit` to disconnect.");
}

pub async fn run(args: DriveArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    log::info!(
        "Driving {} (history {}, retries {})",
        config.endpoint,
        config.history_capacity,
        config.retry.max_retries
    );

    let (observer, mut events) = ChannelObserver::new();
    let observer = Arc::new(observer);
    let link = Arc::new(Reconnector::new(
        config.connection_config(),
        config.retry.clone(),
        &observer,
    ));

    let mut session = tokio::spawn({
        let link = link.clone();
        async move { link.run().await }
    });

    let mut dash = Dashboard::new(config.history_capacity);
    let mut input = spawn_stdin_reader();
    let mut input_open = true;

    let attempts = loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let update = dash.apply(event);
                render(&update, &dash);
            }
            line = input.recv(), if input_open => match line {
                Some(line) => match parse_input(&line) {
                    Input::Quit => link.stop(),
                    Input::Help => print_help(),
                    Input::Skip => {}
                    Input::Send(cmd) => {
                        if cmd.parse::<RobotCommand>().is_err() {
                            log::debug!("{cmd:?} is not a known robot command, sending anyway");
                        }
                        link.send(cmd);
                    }
                },
                None => {
                    input_open = false;
                    link.stop();
                }
            },
            result = &mut session => break result.context("connection task panicked")?,
        }
    };

    while let Ok(event) = events.try_recv() {
        let update = dash.apply(event);
        render(&update, &dash);
    }
    log::info!("Session over after {attempts} connection attempt(s)");
    Ok(())
}
