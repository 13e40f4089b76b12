//! Example service driver for the Agentlink SDK.
//!
//! Bootstraps a client from environment variables and CLI flags, registers a
//! couple of demonstration functions, connects to the local Agent, and runs
//! until signaled. SIGINT/SIGTERM start a graceful stop; a second signal or
//! a stalled shutdown forces an immediate exit.
//!
//! Exit codes: 0 on clean stop; 1 on registration failure, bind failure, or
//! forced exit.

use agentlink::{logging, AgentClient, Args, ClientConfig, FunctionDescriptor, VERSION};
use clap::Parser;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Watchdog for a stalled graceful stop
const FORCED_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program; dropping it
    // stops the non-blocking file writer.
    let _log_guard = logging::init(args.verbose, args.quiet, args.log_file.as_deref());

    let config = ClientConfig::from_args(&args);
    info!(
        "starting agentlink {VERSION} for service {:?} (game {:?}, env {:?})",
        config.service_id, config.game_id, config.env
    );

    let client = AgentClient::new(config);
    register_demo_functions(&client);

    if let Err(e) = client.connect().await {
        error!("registration with agent failed: {e}");
        return 1;
    }
    info!(
        "registered with agent; serving on {}",
        client.local_address().unwrap_or_default()
    );

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGINT handler: {e}");
            return 1;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            return 1;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    // Graceful stop guarded by a watchdog; a second signal forces exit.
    let stopper = client.clone();
    let mut stop = tokio::spawn(async move { stopper.stop().await });

    tokio::select! {
        result = &mut stop => match result {
            Ok(Ok(())) => {
                info!("clean shutdown");
                0
            }
            _ => {
                error!("shutdown did not complete cleanly");
                1
            }
        },
        _ = sigint.recv() => {
            error!("second signal received, forcing exit");
            1
        }
        _ = sigterm.recv() => {
            error!("second signal received, forcing exit");
            1
        }
        _ = tokio::time::sleep(FORCED_EXIT_TIMEOUT) => {
            error!("graceful stop stalled, forcing exit");
            1
        }
    }
}

/// Register the demonstration functions this driver exposes to the Agent
fn register_demo_functions(client: &AgentClient) {
    client.register(FunctionDescriptor::new("echo"), |_context, payload| {
        Ok(payload.to_vec())
    });

    let mut ban = FunctionDescriptor::new("player.ban");
    ban.category = "moderation".to_string();
    ban.risk = "high".to_string();
    client.register(ban, |_context, payload| {
        let player = String::from_utf8_lossy(payload);
        info!("demo handler: ban requested for player {player:?}");
        Ok(b"banned".to_vec())
    });
}
