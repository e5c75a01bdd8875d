mod analytic;
mod cli;
mod color;
mod display;
mod error;
mod ipc;
mod model;
mod polynomial;
mod ramp;
mod wayland;
mod whitepoint;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::Level;

use cli::Opts;
use display::{Invocation, Request};
use ipc::{
    IpcCommand, IpcRequest, IpcResponse, bind_socket, forward_to_holder, start_socket_server,
};
use wayland::WaylandDisplay;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    init_tracing(opts.verbose);

    let invocation = opts.invocation();
    let socket = opts.socket_path();

    if let Some(path) = &socket {
        let command = IpcCommand::from(invocation);
        if let Some(response) = forward_to_holder(path, &command).await {
            tracing::debug!(path = %path.display(), "forwarded to running instance");
            print_response(&invocation, &response);
            return Ok(());
        }
    }

    let mut display = WaylandDisplay::connect().context("connect wayland display")?;
    let response = ipc::respond(&mut display, &invocation);
    display.flush().context("flush wayland connection")?;
    print_response(&invocation, &response);

    if opts.no_hold || !response.holds_gamma(invocation.request) {
        return Ok(());
    }
    hold(display, socket).await
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_response(invocation: &Invocation, response: &IpcResponse) {
    match response {
        IpcResponse::Status { screens } => {
            if invocation.request != Request::Estimate {
                return;
            }
            for report in screens {
                match report.temperature {
                    Some(temp) => println!("Screen {}: temperature ~ {}", report.screen, temp),
                    None => println!("Screen {}: no gamma controllers", report.screen),
                }
            }
        }
        IpcResponse::Error { message } => eprintln!("ERROR! {message}"),
    }
}

/// The compositor restores gamma once our controls go away, so keep the
/// connection open and serve the control socket until interrupted.
async fn hold(mut display: WaylandDisplay, socket: Option<PathBuf>) -> Result<()> {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<IpcRequest>();

    let _socket_guard = match socket.as_deref().map(bind_socket) {
        Some(Ok((listener, guard))) => {
            let request_tx = request_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = start_socket_server(listener, request_tx).await {
                    tracing::error!("Socket server error: {e:#}");
                }
            });
            Some(guard)
        }
        Some(Err(e)) => {
            tracing::warn!("control socket disabled: {e:#}");
            None
        }
        None => None,
    };

    let mut sigint = signal(SignalKind::interrupt()).context("setup SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("setup SIGTERM handler")?;
    let mut tick = tokio::time::interval(tokio::time::Duration::from_secs(1));

    eprintln!("Holding color temperature, interrupt to restore");
    loop {
        tokio::select! {
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            Some((invocation, reply)) = request_rx.recv() => {
                let response = ipc::respond(&mut display, &invocation);
                display.flush().context("flush wayland connection")?;
                let _ = reply.send(response);
            }
            _ = tick.tick() => {}
        }

        display.read_events().context("read wayland events")?;
        display.refresh().context("refresh gamma controls")?;
        display.flush().context("flush wayland connection")?;
    }
    Ok(())
}
