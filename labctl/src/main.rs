//! labctl - Entry Point
//!
//! Bootstraps homelab clusters and fans container deployments out to hosts
//! over SSH.

use std::env;

use labctl::app::cli::{parse_args, CliCommand};
use labctl::app::options::AppOptions;
use labctl::app::run::{exit_code_for, print_usage, print_version, run};
use labctl::logs::init_logging;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = parse_args(env::args().skip(1));

    let command = match cli.command() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n", e);
            print_usage();
            std::process::exit(2);
        }
    };

    // Print version or usage and exit
    match command {
        CliCommand::Version => {
            let code = match print_version() {
                Ok(()) => 0,
                Err(e) => exit_code_for(&e),
            };
            std::process::exit(code);
        }
        CliCommand::Help => {
            print_usage();
            return;
        }
        _ => {}
    }

    let options = match cli.global() {
        Ok(flags) => AppOptions::load(&flags).await,
        Err(e) => Err(e),
    };
    let options = match options {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(exit_code_for(&e));
        }
    };

    // Initialize logging; the guard flushes file logs on drop
    let log_guard = match init_logging(options.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!("labctl {}", env!("CARGO_PKG_VERSION"));
    let code = match run(command, options, await_shutdown_signal()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            exit_code_for(&e)
        }
    };

    drop(log_guard);
    std::process::exit(code);
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
